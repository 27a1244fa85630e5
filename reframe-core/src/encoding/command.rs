//! ffmpeg argument assembly for each tier.
//!
//! Encode tiers disable input autorotation, apply the filter chain, strip
//! container metadata and explicitly zero the output rotation, whether or
//! not a physical rotation was applied. Rotation is zeroed twice: the input
//! display matrix is overridden to 0 (ffmpeg 7+ carries it onto the encoded
//! stream otherwise) and the legacy `rotate` tag is set to 0 for muxers that
//! still read it. The copy tier passes both streams
//! through untouched and keeps the source's rotation tag, since no frames
//! were rotated.

use ffmpeg_sidecar::command::FfmpegCommand;
use std::path::Path;

use super::params::{EncoderCandidate, EncoderTier, EncodingSettings};
use crate::media::MediaKind;
use crate::transform::FilterChain;

/// Inputs for one tier's command line.
#[derive(Debug, Clone, Copy)]
pub struct TranscodeSpec<'a> {
    pub source: &'a Path,
    pub output: &'a Path,
    pub kind: MediaKind,
    pub filters: &'a FilterChain,
    pub candidate: &'a EncoderCandidate,
    pub settings: &'a EncodingSettings,
}

fn push(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

/// Full argument list, output path last.
pub fn transcode_args(spec: &TranscodeSpec<'_>) -> Vec<String> {
    let mut args = Vec::with_capacity(32);
    push(&mut args, &["-hide_banner", "-y"]);

    let copy = spec.candidate.tier == EncoderTier::Copy;
    if !copy {
        push(&mut args, &["-noautorotate", "-display_rotation:v:0", "0"]);
    }
    args.push("-i".to_string());
    args.push(spec.source.to_string_lossy().into_owned());

    match (spec.kind, copy) {
        (MediaKind::Video, false) => {
            if let Some(chain) = spec.filters.to_arg() {
                push(&mut args, &["-vf", &chain]);
            }
            push(&mut args, &["-map", "0:v:0", "-map", "0:a?"]);
            push(&mut args, &["-c:v", &spec.candidate.encoder]);
            args.extend(spec.candidate.params.to_args());
            push(&mut args, &["-c:a", &spec.settings.audio_codec]);
            args.push("-b:a".to_string());
            args.push(format!("{}k", spec.settings.audio_bitrate_kbps));
            push(
                &mut args,
                &[
                    "-map_metadata",
                    "-1",
                    "-metadata:s:v:0",
                    "rotate=0",
                    "-movflags",
                    "+faststart",
                ],
            );
        }
        (MediaKind::Video, true) => {
            push(
                &mut args,
                &[
                    "-map", "0:v:0", "-map", "0:a?", "-c:v", "copy", "-c:a", "copy", "-movflags",
                    "+faststart",
                ],
            );
        }
        (MediaKind::Image, false) => {
            if let Some(chain) = spec.filters.to_arg() {
                push(&mut args, &["-vf", &chain]);
            }
            push(&mut args, &["-frames:v", "1", "-c:v", &spec.candidate.encoder]);
            args.extend(spec.candidate.params.to_args());
            push(&mut args, &["-map_metadata", "-1"]);
        }
        (MediaKind::Image, true) => {
            push(&mut args, &["-frames:v", "1", "-c:v", "copy"]);
        }
    }

    args.push(spec.output.to_string_lossy().into_owned());
    args
}

/// Builds the sidecar command for one tier.
pub fn build_transcode_command(ffmpeg_path: &Path, spec: &TranscodeSpec<'_>) -> FfmpegCommand {
    let args = transcode_args(spec);
    log::debug!(
        "{} tier command: {} {}",
        spec.candidate.tier,
        ffmpeg_path.display(),
        args.join(" ")
    );
    let mut command = FfmpegCommand::new_with_path(ffmpeg_path);
    command.args(&args);
    command
}
