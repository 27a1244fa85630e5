//! MediaInfo integration for metadata extraction
//!
//! This module runs `mediainfo --Output=JSON` and maps its track-array schema
//! (`@type` discriminators "General" / "Video" / "Audio" / "Image") onto the
//! canonical metadata record. It is the preferred backend when installed.

use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::backend::{BackendKind, MetadataBackend};
use super::command::CommandRunner;
use crate::error::{CoreError, CoreResult, command_failed_error};
use crate::media::{
    Degradable, DetailedMetadata, MediaKind, MediaMetadata, MetadataTier, Rotation, UNKNOWN_CODEC,
    normalize_rotation_value,
};
use crate::utils::{deserialize_lenient_string, parse_leading_f64, parse_leading_u32};

/// One `track` entry. MediaInfo emits nearly every value as a string.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct MediaInfoTrack {
    #[serde(rename = "@type")]
    pub track_type: String,
    #[serde(rename = "Format", default, deserialize_with = "deserialize_lenient_string")]
    pub format: Option<String>,
    #[serde(rename = "Width", default, deserialize_with = "deserialize_lenient_string")]
    pub width: Option<String>,
    #[serde(rename = "Height", default, deserialize_with = "deserialize_lenient_string")]
    pub height: Option<String>,
    #[serde(rename = "Rotation", default)]
    pub rotation: Option<Value>,
    #[serde(rename = "Duration", default, deserialize_with = "deserialize_lenient_string")]
    pub duration: Option<String>,
    #[serde(rename = "FrameRate", default, deserialize_with = "deserialize_lenient_string")]
    pub frame_rate: Option<String>,
    #[serde(rename = "BitDepth", default, deserialize_with = "deserialize_lenient_string")]
    pub bit_depth: Option<String>,
    #[serde(rename = "ColorSpace", default, deserialize_with = "deserialize_lenient_string")]
    pub color_space: Option<String>,
    #[serde(rename = "ChromaSubsampling", default, deserialize_with = "deserialize_lenient_string")]
    pub chroma_subsampling: Option<String>,
    #[serde(rename = "Channels", default, deserialize_with = "deserialize_lenient_string")]
    pub channels: Option<String>,
    #[serde(rename = "SamplingRate", default, deserialize_with = "deserialize_lenient_string")]
    pub sampling_rate: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaInfoMedia {
    #[serde(default)]
    pub track: Vec<MediaInfoTrack>,
}

/// Root MediaInfo response structure
#[derive(Debug, Clone, Deserialize)]
pub struct MediaInfoResponse {
    pub media: Option<MediaInfoMedia>,
}

impl MediaInfoResponse {
    fn tracks(&self) -> &[MediaInfoTrack] {
        self.media
            .as_ref()
            .map(|m| m.track.as_slice())
            .unwrap_or_default()
    }

    fn first(&self, track_type: &str) -> Option<&MediaInfoTrack> {
        self.tracks().iter().find(|t| t.track_type == track_type)
    }
}

/// Maps a MediaInfo video/image `Format` to the ffmpeg-style codec name.
fn video_codec_name(format: Option<&str>) -> String {
    let Some(format) = format else {
        return UNKNOWN_CODEC.to_string();
    };
    match format.trim() {
        "AVC" => "h264".to_string(),
        "HEVC" => "hevc".to_string(),
        "MPEG-4 Visual" => "mpeg4".to_string(),
        "MPEG Video" => "mpeg2video".to_string(),
        "ProRes" => "prores".to_string(),
        "JPEG" => "mjpeg".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

fn audio_codec_name(format: &str) -> String {
    match format.trim() {
        "AC-3" => "ac3".to_string(),
        "E-AC-3" => "eac3".to_string(),
        "MPEG Audio" => "mp3".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

/// Best-effort ffmpeg pixel format from colour space, subsampling and depth.
fn pixel_format(track: &MediaInfoTrack) -> Option<String> {
    let space = track.color_space.as_deref()?;
    if space != "YUV" {
        return None;
    }
    let base = match track.chroma_subsampling.as_deref().map(str::trim) {
        Some("4:2:0") => "yuv420p",
        Some("4:2:2") => "yuv422p",
        Some("4:4:4") => "yuv444p",
        _ => return None,
    };
    match track.bit_depth.as_deref().and_then(parse_leading_u32) {
        Some(10) => Some(format!("{base}10le")),
        Some(12) => Some(format!("{base}12le")),
        _ => Some(base.to_string()),
    }
}

/// Parses `mediainfo --Output=JSON` into a metadata record.
pub fn parse_mediainfo_output(
    json: &str,
    path: &Path,
    tier: MetadataTier,
) -> CoreResult<Degradable<MediaMetadata>> {
    let response: MediaInfoResponse = serde_json::from_str(json).map_err(|e| {
        CoreError::JsonParse(format!(
            "Failed to parse mediainfo JSON output for {}: {}",
            path.display(),
            e
        ))
    })?;

    let (visual, kind) = match (response.first("Video"), response.first("Image")) {
        (Some(video), _) => (video, MediaKind::Video),
        (None, Some(image)) => (image, MediaKind::Image),
        (None, None) => {
            return Err(CoreError::MetadataUnavailable {
                path: path.to_path_buf(),
                reason: "mediainfo reported no video or image track".to_string(),
            });
        }
    };

    let rotation = match visual.rotation.as_ref() {
        Some(raw) => normalize_rotation_value(Some(raw)),
        None => Degradable::Ok(Rotation::None),
    };

    let general = response.first("General");
    let duration = general
        .and_then(|g| g.duration.as_deref())
        .or(visual.duration.as_deref())
        .and_then(parse_leading_f64)
        .unwrap_or(0.0);

    let detail = match tier {
        MetadataTier::Basic => None,
        MetadataTier::Detailed => {
            let audio = response.first("Audio");
            Some(DetailedMetadata {
                frame_rate: visual
                    .frame_rate
                    .as_deref()
                    .and_then(parse_leading_f64)
                    .unwrap_or(0.0),
                bit_depth: visual.bit_depth.as_deref().and_then(parse_leading_u32),
                color_space: visual.color_space.clone(),
                pixel_format: pixel_format(visual),
                audio_codec: audio.and_then(|a| a.format.as_deref()).map(audio_codec_name),
                audio_channels: audio
                    .and_then(|a| a.channels.as_deref())
                    .and_then(parse_leading_u32)
                    .unwrap_or(0),
                audio_sample_rate: audio
                    .and_then(|a| a.sampling_rate.as_deref())
                    .and_then(parse_leading_u32)
                    .unwrap_or(0),
                audio_duration: audio
                    .and_then(|a| a.duration.as_deref())
                    .and_then(parse_leading_f64)
                    .unwrap_or(0.0),
            })
        }
    };

    let width = visual.width.as_deref().and_then(parse_leading_u32).unwrap_or(0);
    let height = visual.height.as_deref().and_then(parse_leading_u32).unwrap_or(0);
    let codec = video_codec_name(visual.format.as_deref());
    Ok(rotation.map(|rotation| MediaMetadata {
        width,
        height,
        rotation,
        codec,
        duration,
        kind,
        detail,
    }))
}

/// Media-inspection backend running the `mediainfo` binary.
pub struct MediaInfoBackend {
    runner: Arc<dyn CommandRunner>,
    program: PathBuf,
    probe_timeout: Duration,
    availability_timeout: Duration,
}

impl MediaInfoBackend {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        program: PathBuf,
        probe_timeout: Duration,
        availability_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            program,
            probe_timeout,
            availability_timeout,
        }
    }
}

impl MetadataBackend for MediaInfoBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Inspection
    }

    fn is_available(&self) -> bool {
        match self.runner.run(
            self.program.as_os_str(),
            &["--Version".to_string()],
            self.availability_timeout,
        ) {
            Ok(output) => output.success(),
            Err(e) => {
                log::debug!("mediainfo unavailable: {}", e);
                false
            }
        }
    }

    fn probe(&self, path: &Path, tier: MetadataTier) -> CoreResult<Degradable<MediaMetadata>> {
        log::debug!("Running mediainfo ({}) on: {}", tier, path.display());
        let args = vec![
            "--Output=JSON".to_string(),
            path.to_string_lossy().into_owned(),
        ];
        let output = self
            .runner
            .run(self.program.as_os_str(), &args, self.probe_timeout)?;
        if !output.success() {
            return Err(command_failed_error(
                "mediainfo",
                output.status,
                output.stderr_tail(5).join("\n"),
            ));
        }
        parse_mediainfo_output(&output.stdout, path, tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHONE_CLIP: &str = r#"{
      "creatingLibrary": {"name": "MediaInfoLib", "version": "23.04"},
      "media": {
        "@ref": "IMG_0042.MOV",
        "track": [
          {"@type": "General", "Format": "MPEG-4", "Duration": "12.345"},
          {"@type": "Video", "Format": "HEVC", "Width": "1920", "Height": "1080",
           "Rotation": "90.000", "FrameRate": "29.970", "BitDepth": "10",
           "ColorSpace": "YUV", "ChromaSubsampling": "4:2:0", "Duration": "12.312"},
          {"@type": "Audio", "Format": "AAC", "Channels": "2",
           "SamplingRate": "44100", "Duration": "12.345"}
        ]
      }
    }"#;

    #[test]
    fn test_parse_basic_phone_clip() {
        let meta =
            parse_mediainfo_output(PHONE_CLIP, Path::new("IMG_0042.MOV"), MetadataTier::Basic)
                .unwrap()
                .into_value();
        assert_eq!((meta.width, meta.height), (1920, 1080));
        assert_eq!(meta.rotation, Rotation::Cw90);
        assert_eq!(meta.codec, "hevc");
        assert!((meta.duration - 12.345).abs() < 1e-9);
        assert_eq!(meta.kind, MediaKind::Video);
        assert!(meta.detail.is_none());
    }

    #[test]
    fn test_parse_detailed_fields() {
        let meta =
            parse_mediainfo_output(PHONE_CLIP, Path::new("IMG_0042.MOV"), MetadataTier::Detailed)
                .unwrap()
                .into_value();
        let detail = meta.detail.unwrap();
        assert!((detail.frame_rate - 29.97).abs() < 1e-9);
        assert_eq!(detail.bit_depth, Some(10));
        assert_eq!(detail.pixel_format.as_deref(), Some("yuv420p10le"));
        assert_eq!(detail.audio_codec.as_deref(), Some("aac"));
        assert_eq!(detail.audio_channels, 2);
        assert_eq!(detail.audio_sample_rate, 44100);
    }

    #[test]
    fn test_parse_still_image() {
        let json = r#"{"media": {"track": [
            {"@type": "General", "Format": "JPEG"},
            {"@type": "Image", "Format": "JPEG", "Width": "4032", "Height": "3024"}
        ]}}"#;
        let meta = parse_mediainfo_output(json, Path::new("photo.jpg"), MetadataTier::Basic)
            .unwrap()
            .into_value();
        assert_eq!(meta.kind, MediaKind::Image);
        assert_eq!(meta.codec, "mjpeg");
        assert_eq!((meta.width, meta.height), (4032, 3024));
        assert_eq!(meta.duration, 0.0);
    }

    #[test]
    fn test_missing_rotation_is_zero_and_bad_rotation_degrades_to_zero() {
        let json = r#"{"media": {"track": [
            {"@type": "Video", "Format": "AVC", "Width": "640", "Height": "360"}
        ]}}"#;
        let meta = parse_mediainfo_output(json, Path::new("a.mp4"), MetadataTier::Basic).unwrap();
        assert!(!meta.is_degraded());
        assert_eq!(meta.value().rotation, Rotation::None);
        assert_eq!(meta.value().codec, "h264");

        let json = r#"{"media": {"track": [
            {"@type": "Video", "Format": "AVC", "Width": "640", "Height": "360", "Rotation": "n/a"}
        ]}}"#;
        let meta = parse_mediainfo_output(json, Path::new("a.mp4"), MetadataTier::Basic).unwrap();
        assert!(meta.is_degraded());
        assert_eq!(meta.value().rotation, Rotation::None);
        assert_eq!((meta.value().width, meta.value().height), (640, 360));
    }

    #[test]
    fn test_audio_only_is_unavailable() {
        let json = r#"{"media": {"track": [
            {"@type": "General", "Duration": "3.0"},
            {"@type": "Audio", "Format": "AAC"}
        ]}}"#;
        let err = parse_mediainfo_output(json, Path::new("voice.m4a"), MetadataTier::Basic);
        assert!(matches!(err, Err(CoreError::MetadataUnavailable { .. })));
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_mediainfo_output("{not json", Path::new("a.mp4"), MetadataTier::Basic);
        assert!(matches!(err, Err(CoreError::JsonParse(_))));
    }
}
