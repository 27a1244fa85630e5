// ============================================================================
// reframe-cli/src/commands/encoders.rs
// ============================================================================
//
// ENCODERS COMMAND: Detection, Selection and Diagnostics
//
// Lists which hardware encoders the local ffmpeg advertises, runs the same
// selection the normalize command would, and prints a diagnostic report for
// advertised vendors that were not selected (or for all of them with
// --diagnose).

use reframe_core::encoding::{EncoderSelector, HardwareVendor, OptimalEncoder};
use reframe_core::external::SystemCommandRunner;
use reframe_core::CoreConfig;
use std::error::Error;
use std::sync::Arc;

use crate::cli::EncodersArgs;

/// Vendors worth diagnosing: advertised, and either not selected or
/// explicitly requested.
pub fn vendors_to_diagnose(
    support: &[(HardwareVendor, bool)],
    optimal: OptimalEncoder,
    diagnose_all: bool,
) -> Vec<HardwareVendor> {
    let selected = optimal.hardware().map(|s| s.vendor);
    support
        .iter()
        .filter(|(_, supported)| *supported)
        .map(|(vendor, _)| *vendor)
        .filter(|vendor| diagnose_all || selected != Some(*vendor))
        .collect()
}

pub fn run_encoders(args: EncodersArgs) -> Result<(), Box<dyn Error>> {
    let config = CoreConfig::from_env();
    config.validate()?;
    let selector = EncoderSelector::new(
        Arc::new(SystemCommandRunner),
        config.ffmpeg_path.clone(),
        config.availability_timeout,
        config.probe_timeout,
    )
    .with_hardware(config.enable_hardware);

    let available = selector.detect_available();
    let support = available.vendor_support();
    println!("Hardware encoders advertised by {}:", selector.ffmpeg_path().display());
    for (vendor, supported) in &support {
        println!(
            "  {:<8} {:<18} {}",
            vendor.to_string(),
            vendor.encoder(),
            if *supported { "yes" } else { "no" }
        );
    }

    let optimal = selector.get_optimal(args.vendor.or(config.preferred_vendor));
    match optimal {
        OptimalEncoder::Hardware(selection) if selection.simplified => println!(
            "Selected encoder: {} (simplified parameters)",
            optimal.encoder_id()
        ),
        _ => println!("Selected encoder: {}", optimal.encoder_id()),
    }

    for vendor in vendors_to_diagnose(&support, optimal, args.diagnose) {
        let report = selector.diagnose(vendor);
        println!();
        println!("Diagnostic report for {}:", vendor);
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
