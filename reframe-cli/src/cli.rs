// reframe-cli/src/cli.rs
//
// Defines the command-line argument structures using clap.

use clap::{Parser, Subcommand};
use reframe_core::encoding::HardwareVendor;
use reframe_core::transform::TargetAspect;
use std::path::PathBuf;

// --- CLI Argument Definition ---

#[derive(Parser, Debug)]
#[command(
    author,
    version, // Reads from Cargo.toml via "cargo" feature in clap
    about = "Reframe: media normalization planner",
    long_about = "Normalizes video clips and still images to a target aspect profile, \
                  correcting rotation, scaling, padding and codec with ffmpeg."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging on the console.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Optional: Directory for a timestamped log file
    #[arg(long, global = true, value_name = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Normalizes a media file or every media file in a directory
    Normalize(NormalizeArgs),
    /// Prints the metadata record of a media file as JSON
    Probe(ProbeArgs),
    /// Lists detected hardware encoders and the encoder that would be used
    Encoders(EncodersArgs),
}

impl Commands {
    /// Subcommand name, used in log file names.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Normalize(_) => "normalize",
            Commands::Probe(_) => "probe",
            Commands::Encoders(_) => "encoders",
        }
    }
}

fn parse_aspect(s: &str) -> Result<TargetAspect, String> {
    s.parse()
}

fn parse_vendor(s: &str) -> Result<HardwareVendor, String> {
    s.parse()
}

#[derive(Parser, Debug)]
pub struct NormalizeArgs {
    /// Input media file or directory
    #[arg(required = true, value_name = "INPUT")]
    pub input_path: PathBuf,

    /// Directory where normalized files will be written
    #[arg(short = 'o', long = "output", required = true, value_name = "OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Target aspect profile: portrait (1080x1920), landscape (1920x1080) or square (1080x1080)
    #[arg(short, long, default_value = "portrait", value_parser = parse_aspect)]
    pub aspect: TargetAspect,

    /// Optional: Number of files processed in parallel
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Optional: Preferred hardware vendor (nvidia, intel or apple)
    #[arg(long, value_name = "VENDOR", value_parser = parse_vendor)]
    pub vendor: Option<HardwareVendor>,

    /// Disable hardware encoders; use the software encoder only
    #[arg(long, default_value_t = false)]
    pub no_hardware: bool,
}

#[derive(Parser, Debug)]
pub struct ProbeArgs {
    /// Media file to probe
    #[arg(required = true, value_name = "FILE")]
    pub file: PathBuf,

    /// Include frame rate, pixel format and audio details
    #[arg(long, default_value_t = false)]
    pub detailed: bool,
}

#[derive(Parser, Debug)]
pub struct EncodersArgs {
    /// Optional: Preferred hardware vendor (nvidia, intel or apple)
    #[arg(long, value_name = "VENDOR", value_parser = parse_vendor)]
    pub vendor: Option<HardwareVendor>,

    /// Print the diagnostic report for every advertised vendor
    #[arg(long, default_value_t = false)]
    pub diagnose: bool,
}
