//! Command implementations for the CLI.
//!
//! Each submodule contains the implementation of a specific command.

/// `normalize`: runs the batch pipeline over a file or directory.
pub mod normalize;
pub mod probe;
/// `encoders`: encoder detection and hardware diagnostics.
pub mod encoders;

pub use encoders::run_encoders;
pub use normalize::run_normalize;
pub use probe::run_probe;
