//! `probe`: prints the canonical metadata record of one file.
//!
//! Degraded records are still printed (with the reason) so the output shows
//! what downstream planning would have seen, but the command then fails.

use reframe_core::external::SystemCommandRunner;
use reframe_core::{CoreConfig, Degradable, MediaMetadata, MetadataCache, MetadataExtractor};
use serde_json::json;
use std::error::Error;
use std::sync::Arc;

use crate::cli::ProbeArgs;

/// JSON document printed by `probe`.
pub fn probe_report(path: &str, record: &Degradable<MediaMetadata>) -> serde_json::Value {
    let metadata = record.value();
    json!({
        "path": path,
        "metadata": metadata,
        "effective_width": metadata.effective_width(),
        "effective_height": metadata.effective_height(),
        "degraded": record.reason(),
    })
}

pub fn run_probe(args: ProbeArgs) -> Result<(), Box<dyn Error>> {
    if !args.file.exists() {
        return Err(format!("File not found: {}", args.file.display()).into());
    }

    let config = CoreConfig::from_env();
    config.validate()?;
    let extractor = MetadataExtractor::new(
        Arc::new(MetadataCache::with_ttl(config.cache_ttl)),
        Arc::new(SystemCommandRunner),
        &config,
    );

    let record = if args.detailed {
        extractor.get_detailed_metadata(&args.file)?
    } else {
        extractor.get_basic_metadata(&args.file)?
    };

    let report = probe_report(&args.file.display().to_string(), &record);
    println!("{}", serde_json::to_string_pretty(&report)?);

    match record.reason() {
        Some(reason) => Err(format!("Metadata unavailable for {}: {}", args.file.display(), reason).into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reframe_core::{MediaKind, Rotation};

    #[test]
    fn test_report_includes_effective_dimensions() {
        let record = Degradable::Ok(MediaMetadata {
            width: 1920,
            height: 1080,
            rotation: Rotation::Cw270,
            codec: "h264".to_string(),
            duration: 2.0,
            kind: MediaKind::Video,
            detail: None,
        });
        let report = probe_report("clip.mp4", &record);
        assert_eq!(report["effective_width"], 1080);
        assert_eq!(report["effective_height"], 1920);
        assert_eq!(report["metadata"]["codec"], "h264");
        assert!(report["degraded"].is_null());
    }

    #[test]
    fn test_report_marks_degraded_records() {
        let record = Degradable::Degraded {
            value: MediaMetadata::unknown(MediaKind::Image),
            reason: "mediainfo: exit 1".to_string(),
        };
        let report = probe_report("photo.jpg", &record);
        assert_eq!(report["degraded"], "mediainfo: exit 1");
        assert_eq!(report["metadata"]["width"], 0);
    }
}
