// reframe-cli/src/lib.rs
//
// Library portion of the Reframe CLI application.
// Contains argument definitions, logging setup and command logic.

pub mod cli;
pub mod commands;
pub mod logging;

// Re-export items needed by the binary or integration tests
pub use cli::{Cli, Commands, EncodersArgs, NormalizeArgs, ProbeArgs};
pub use commands::{run_encoders, run_normalize, run_probe};
