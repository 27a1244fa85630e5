use reframe_core::config::CoreConfigBuilder;
use reframe_core::external::mocks::{MockCommandResponse, MockCommandRunner};
use reframe_core::*;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::tempdir;

const MEDIAINFO_CLIP: &str = r#"{
  "media": {
    "track": [
      {"@type": "General", "Format": "MPEG-4", "Duration": "5.000"},
      {"@type": "Video", "Format": "AVC", "Width": "1920", "Height": "1080",
       "FrameRate": "30.000", "BitDepth": "8"},
      {"@type": "Audio", "Format": "AAC", "Channels": "2", "SamplingRate": "48000"}
    ]
  }
}"#;

const FFPROBE_CLIP: &str = r#"{
  "streams": [
    {"codec_type": "video", "codec_name": "hevc", "width": 3840, "height": 2160,
     "r_frame_rate": "30/1", "tags": {"rotate": "270"}}
  ],
  "format": {"format_name": "matroska,webm", "duration": "2.500000"}
}"#;

const SIDE_DATA_ROTATED: &str =
    r#"{"streams": [{"side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]}]}"#;

fn extractor_with(runner: &MockCommandRunner) -> MetadataExtractor {
    let config = CoreConfigBuilder::new()
        .ffprobe_path(PathBuf::from("ffprobe"))
        .mediainfo_path(PathBuf::from("mediainfo"))
        .build();
    MetadataExtractor::new(
        Arc::new(MetadataCache::new()),
        Arc::new(runner.clone()),
        &config,
    )
}

#[test]
fn test_mediainfo_preferred_with_side_channel_rotation() -> Result<(), Box<dyn std::error::Error>>
{
    let dir = tempdir()?;
    let clip = dir.path().join("phone.mp4");
    fs::write(&clip, b"fake mp4")?;

    let runner = MockCommandRunner::new();
    runner.respond("mediainfo", "--Version", MockCommandResponse::success("MediaInfoLib"));
    runner.respond("mediainfo", "--Output=JSON", MockCommandResponse::success(MEDIAINFO_CLIP));
    runner.respond("ffprobe", "-version", MockCommandResponse::success("ffprobe version 6"));
    runner.respond("ffprobe", "stream_side_data", MockCommandResponse::success(SIDE_DATA_ROTATED));

    let extractor = extractor_with(&runner);
    let meta = extractor.get_basic_metadata(&clip)?;

    assert!(!meta.is_degraded());
    let meta = meta.into_value();
    assert_eq!((meta.width, meta.height), (1920, 1080));
    assert_eq!(meta.codec, "h264");
    assert_eq!(meta.rotation, Rotation::Cw90);
    assert_eq!((meta.effective_width(), meta.effective_height()), (1080, 1920));
    assert_eq!(runner.count_calls_matching("-show_streams"), 0);
    Ok(())
}

#[test]
fn test_ffprobe_used_when_mediainfo_missing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let clip = dir.path().join("drone.mkv");
    fs::write(&clip, b"fake mkv")?;

    let runner = MockCommandRunner::new();
    runner.respond("ffprobe", "-version", MockCommandResponse::success("ffprobe version 6"));
    runner.respond("ffprobe", "-show_streams", MockCommandResponse::success(FFPROBE_CLIP));

    let extractor = extractor_with(&runner);
    let meta = extractor.get_basic_metadata(&clip)?.into_value();

    assert_eq!(meta.codec, "hevc");
    assert_eq!(meta.rotation, Rotation::Cw270);
    assert!((meta.duration - 2.5).abs() < 1e-9);
    assert!(meta.is_4k());

    // Served from the cache on the second call.
    extractor.get_basic_metadata(&clip)?;
    assert_eq!(runner.count_calls_matching("-show_streams"), 1);
    assert_eq!(extractor.cache().stats().hits, 1);
    Ok(())
}

#[test]
fn test_malformed_output_degrades_to_zero_record() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let clip = dir.path().join("broken.mov");
    fs::write(&clip, b"truncated")?;

    let runner = MockCommandRunner::new();
    runner.respond("mediainfo", "--Version", MockCommandResponse::success("MediaInfoLib"));
    runner.respond("mediainfo", "--Output=JSON", MockCommandResponse::success("{not json"));
    runner.respond("ffprobe", "-version", MockCommandResponse::success("ffprobe version 6"));
    runner.respond(
        "ffprobe",
        "-show_streams",
        MockCommandResponse::failure(1, "moov atom not found"),
    );

    let extractor = extractor_with(&runner);
    let meta = extractor.get_basic_metadata(&clip)?;

    assert!(meta.is_degraded());
    assert!(meta.value().has_unknown_dimensions());
    assert_eq!(meta.value().rotation, Rotation::None);
    assert!(extractor.cache().is_empty());
    Ok(())
}

#[test]
fn test_unparsable_rotation_degrades_and_skips_cache() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let clip = dir.path().join("clip.mkv");
    fs::write(&clip, b"fake mkv")?;

    let json = r#"{"media": {"track": [
        {"@type": "General", "Duration": "3.0"},
        {"@type": "Video", "Format": "AVC", "Width": "1920", "Height": "1080",
         "Rotation": "garbage"}
    ]}}"#;
    let runner = MockCommandRunner::new();
    runner.respond("mediainfo", "--Version", MockCommandResponse::success("MediaInfoLib"));
    runner.respond("mediainfo", "--Output=JSON", MockCommandResponse::success(json));

    let extractor = extractor_with(&runner);
    let meta = extractor.get_basic_metadata(&clip)?;

    assert!(meta.is_degraded());
    assert_eq!((meta.value().width, meta.value().height), (1920, 1080));
    assert_eq!(meta.value().rotation, Rotation::None);
    assert_eq!(extractor.cache().len(), 0);
    Ok(())
}

#[test]
fn test_missing_source_is_not_found() {
    let runner = MockCommandRunner::new();
    let extractor = extractor_with(&runner);
    let result = extractor.get_basic_metadata(std::path::Path::new("/definitely/not/here.mp4"));
    assert!(matches!(result, Err(CoreError::NotFound(_))));
    assert!(runner.calls().is_empty());
}
