//! YAML Loader module
//!
//! Parse connector definitions from YAML files.
//!
//! # Overview
//!
//! The loader module provides:
//! - `ConnectorDefinition` - Declarative connector specification
//! - `FileStreamDefinition` - Stream backed by JSON Lines files
//! - YAML parsing with validation

mod parser;
mod types;

pub use parser::{load_connector, load_connector_from_str};
pub use types::{ConnectorDefinition, FileStreamDefinition};
