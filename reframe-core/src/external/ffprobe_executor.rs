//! FFprobe integration for metadata extraction
//!
//! This module runs ffprobe with JSON output and maps its stream/format
//! schema onto the canonical metadata record. Rotation is read from the
//! legacy `rotate` stream tag first and from the display-matrix side data
//! second. It also provides the narrow side-data query used to widen the
//! rotation lookup for containers that only carry a display matrix.

use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::backend::{BackendKind, MetadataBackend};
use super::command::CommandRunner;
use crate::error::{CoreError, CoreResult, command_failed_error};
use crate::media::{
    DetailedMetadata, Degradable, MediaKind, MediaMetadata, MetadataTier, Rotation,
    UNKNOWN_CODEC, normalize_rotation_value,
};
use crate::utils::{deserialize_lenient_string, parse_leading_f64, parse_leading_u32, parse_rational};

/// Codecs ffprobe reports for single-frame image inputs.
const IMAGE_CODECS: &[&str] = &["mjpeg", "png", "bmp", "webp", "tiff"];

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FfprobeSideData {
    #[serde(default)]
    pub side_data_type: Option<String>,
    #[serde(default)]
    pub rotation: Option<Value>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FfprobeStream {
    #[serde(default)]
    pub codec_type: Option<String>,
    #[serde(default)]
    pub codec_name: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub r_frame_rate: Option<String>,
    #[serde(default)]
    pub avg_frame_rate: Option<String>,
    #[serde(default)]
    pub pix_fmt: Option<String>,
    #[serde(default)]
    pub color_space: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub bits_per_raw_sample: Option<String>,
    #[serde(default)]
    pub channels: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub sample_rate: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub duration: Option<String>,
    #[serde(default)]
    pub tags: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    pub side_data_list: Vec<FfprobeSideData>,
}

impl FfprobeStream {
    fn is_video(&self) -> bool {
        self.codec_type.as_deref() == Some("video")
    }

    fn is_audio(&self) -> bool {
        self.codec_type.as_deref() == Some("audio")
    }

    /// Raw rotation as reported: the `rotate` tag, or the display-matrix
    /// angle with its sign flipped (the matrix is counter-clockwise).
    fn raw_rotation(&self) -> Option<Value> {
        if let Some(tag) = self.tags.as_ref().and_then(|t| t.get("rotate")) {
            return Some(tag.clone());
        }
        self.side_data_list
            .iter()
            .find_map(|sd| sd.rotation.as_ref())
            .map(|angle| match angle.as_f64() {
                Some(ccw) => Value::from(-ccw),
                None => angle.clone(),
            })
    }

    fn rotation(&self) -> Degradable<Rotation> {
        match self.raw_rotation() {
            Some(raw) => normalize_rotation_value(Some(&raw)),
            None => Degradable::Ok(Rotation::None),
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FfprobeFormat {
    #[serde(default)]
    pub format_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub duration: Option<String>,
}

/// Root ffprobe `-print_format json` structure.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    #[serde(default)]
    pub format: Option<FfprobeFormat>,
}

fn parse_json(json: &str, path: &Path, context: &str) -> CoreResult<FfprobeOutput> {
    serde_json::from_str(json).map_err(|e| {
        CoreError::JsonParse(format!(
            "ffprobe {context} output for {}: {}",
            path.display(),
            e
        ))
    })
}

/// Parses `ffprobe -show_format -show_streams` JSON into a metadata record.
pub fn parse_ffprobe_output(
    json: &str,
    path: &Path,
    tier: MetadataTier,
) -> CoreResult<Degradable<MediaMetadata>> {
    let output = parse_json(json, path, "metadata")?;

    let video = output.streams.iter().find(|s| s.is_video()).ok_or_else(|| {
        CoreError::MetadataUnavailable {
            path: path.to_path_buf(),
            reason: "ffprobe reported no video stream".to_string(),
        }
    })?;

    let codec = video
        .codec_name
        .as_deref()
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| UNKNOWN_CODEC.to_string());

    let format_duration = output
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_leading_f64);
    let duration = format_duration
        .or_else(|| video.duration.as_deref().and_then(parse_leading_f64))
        .unwrap_or(0.0)
        .max(0.0);

    let kind = match MediaKind::from_path(path) {
        Some(kind) => kind,
        None if IMAGE_CODECS.contains(&codec.as_str()) && duration <= 0.0 => MediaKind::Image,
        None => MediaKind::Video,
    };

    let detail = match tier {
        MetadataTier::Basic => None,
        MetadataTier::Detailed => {
            let audio = output.streams.iter().find(|s| s.is_audio());
            Some(DetailedMetadata {
                frame_rate: video
                    .avg_frame_rate
                    .as_deref()
                    .and_then(parse_rational)
                    .or_else(|| video.r_frame_rate.as_deref().and_then(parse_rational))
                    .unwrap_or(0.0),
                bit_depth: video
                    .bits_per_raw_sample
                    .as_deref()
                    .and_then(parse_leading_u32),
                color_space: video.color_space.clone(),
                pixel_format: video.pix_fmt.clone(),
                audio_codec: audio.and_then(|a| a.codec_name.clone()),
                audio_channels: audio.and_then(|a| a.channels).unwrap_or(0),
                audio_sample_rate: audio
                    .and_then(|a| a.sample_rate.as_deref())
                    .and_then(parse_leading_u32)
                    .unwrap_or(0),
                audio_duration: audio
                    .and_then(|a| a.duration.as_deref())
                    .and_then(parse_leading_f64)
                    .unwrap_or(0.0),
            })
        }
    };

    let (width, height) = (video.width.unwrap_or(0), video.height.unwrap_or(0));
    Ok(video.rotation().map(|rotation| MediaMetadata {
        width,
        height,
        rotation,
        codec,
        duration,
        kind,
        detail,
    }))
}

/// Parses the side-data-only query. `None` when no usable rotation is present.
pub fn parse_side_data_rotation(json: &str, path: &Path) -> CoreResult<Option<Rotation>> {
    let output = parse_json(json, path, "side data")?;
    Ok(output
        .streams
        .first()
        .filter(|s| s.raw_rotation().is_some())
        .and_then(|s| match s.rotation() {
            Degradable::Ok(rotation) => Some(rotation),
            Degradable::Degraded { .. } => None,
        }))
}

/// Probe backend running the `ffprobe` binary.
pub struct FfprobeBackend {
    runner: Arc<dyn CommandRunner>,
    program: PathBuf,
    probe_timeout: Duration,
    availability_timeout: Duration,
}

impl FfprobeBackend {
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

    fn run_json(&self, args: Vec<String>, context: &str) -> CoreResult<String> {
        let output = self
            .runner
            .run(self.program.as_os_str(), &args, self.probe_timeout)?;
        if !output.success() {
            return Err(command_failed_error(
                format!("ffprobe ({context})"),
                output.status,
                output.stderr_tail(5).join("\n"),
            ));
        }
        Ok(output.stdout)
    }
}

fn args(list: &[&str], path: &Path) -> Vec<String> {
    list.iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(path.to_string_lossy().into_owned()))
        .collect()
}

impl MetadataBackend for FfprobeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Probe
    }

    fn is_available(&self) -> bool {
        match self.runner.run(
            self.program.as_os_str(),
            &["-version".to_string()],
            self.availability_timeout,
        ) {
            Ok(output) => output.success(),
            Err(e) => {
                log::debug!("ffprobe unavailable: {}", e);
                false
            }
        }
    }

    fn probe(&self, path: &Path, tier: MetadataTier) -> CoreResult<Degradable<MediaMetadata>> {
        log::debug!("Running ffprobe ({}) on: {}", tier, path.display());
        let stdout = self.run_json(
            args(
                &["-v", "error", "-print_format", "json", "-show_format", "-show_streams"],
                path,
            ),
            "metadata",
        )?;
        parse_ffprobe_output(&stdout, path, tier)
    }

    fn side_channel_rotation(&self, path: &Path) -> CoreResult<Option<Rotation>> {
        log::debug!("Querying display-matrix rotation for: {}", path.display());
        let stdout = self.run_json(
            args(
                &[
                    "-v",
                    "error",
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "stream_side_data=rotation:stream_tags=rotate",
                    "-of",
                    "json",
                ],
                path,
            ),
            "side data",
        )?;
        parse_side_data_rotation(&stdout, path)
    }
}
