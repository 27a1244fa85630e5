// reframe-cli/src/main.rs
//
// Entry point for the `reframe` binary: parses arguments, installs logging
// and dispatches to the command implementations in `commands`. Any command
// error is printed to stderr and mapped to exit code 1.

use clap::Parser;
use reframe_cli::logging::setup_logging;
use reframe_cli::{Cli, Commands, run_encoders, run_normalize, run_probe};
use std::process;

fn main() {
    let cli = Cli::parse();

    match setup_logging(cli.verbose, cli.log_dir.as_deref(), cli.command.name()) {
        Ok(Some(path)) => log::debug!("Logging to {}", path.display()),
        Ok(None) => {}
        Err(e) => eprintln!("Warning: failed to initialize logging: {e}"),
    }

    let result = match cli.command {
        Commands::Normalize(args) => run_normalize(args),
        Commands::Probe(args) => run_probe(args),
        Commands::Encoders(args) => run_encoders(args),
    };

    if let Err(e) = result {
        log::debug!("Command failed: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
