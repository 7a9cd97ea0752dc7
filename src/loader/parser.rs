//! YAML parser for connector definitions
//!
//! Parses and validates connector YAML files.

use crate::error::{Error, Result};
use crate::loader::types::{ConnectorDefinition, FileStreamDefinition};
use crate::template;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Load a connector definition from a file path
///
/// Relative stream paths resolve against the file's directory unless the
/// definition sets `base_dir`.
pub fn load_connector(path: impl AsRef<Path>) -> Result<ConnectorDefinition> {
    let path = path.as_ref();

    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::config(format!(
                "Failed to read connector file '{}': {}",
                path.display(),
                e
            ))
        }
    })?;

    let mut def = load_connector_from_str(&content)?;
    let file_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    def.base_dir = Some(match def.base_dir.take() {
        Some(dir) if dir.is_relative() => file_dir.join(dir),
        Some(dir) => dir,
        None => file_dir,
    });
    Ok(def)
}

/// Load a connector definition from a YAML string
pub fn load_connector_from_str(yaml: &str) -> Result<ConnectorDefinition> {
    let def: ConnectorDefinition = serde_yaml::from_str(yaml)
        .map_err(|e| Error::config(format!("Failed to parse connector YAML: {e}")))?;

    validate_connector(&def)?;
    Ok(def)
}

/// Validate a connector definition
fn validate_connector(def: &ConnectorDefinition) -> Result<()> {
    if def.name.is_empty() {
        return Err(Error::config("Connector name cannot be empty"));
    }

    if def.streams.is_empty() {
        return Err(Error::config("Connector must have at least one stream"));
    }

    let stream_names: HashSet<_> = def.streams.iter().map(|s| &s.name).collect();
    if stream_names.len() != def.streams.len() {
        return Err(Error::config("Duplicate stream names found"));
    }

    for stream in &def.streams {
        validate_stream(stream)?;
    }

    Ok(())
}

/// Validate a stream definition
fn validate_stream(stream: &FileStreamDefinition) -> Result<()> {
    if stream.name.is_empty() {
        return Err(Error::config("Stream name cannot be empty"));
    }

    if stream.path.is_empty() {
        return Err(Error::config(format!(
            "Stream '{}' path cannot be empty",
            stream.name
        )));
    }

    for var in template::extract_variables(&stream.path) {
        let root = var.split('.').next().unwrap_or_default();
        if root == "slice" && stream.partition.is_none() {
            return Err(Error::config(format!(
                "Stream '{}' path uses '{var}' but the stream is not partitioned",
                stream.name
            )));
        }
    }

    if stream.dependencies.contains(&stream.name) {
        return Err(Error::config(format!(
            "Stream '{}' depends on itself",
            stream.name
        )));
    }

    Ok(())
}
