//! CLI module
//!
//! Command-line interface for running connectors.
//!
//! # Commands
//!
//! - `spec` - Print the configuration schema
//! - `check` - Validate configuration and source access
//! - `discover` - List available streams
//! - `read` - Sync streams, writing protocol messages to stdout
//! - `validate` - Validate a connector definition

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
