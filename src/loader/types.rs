//! Loader types
//!
//! Declarative connector definition types for YAML parsing.

use crate::config::SpecConfig;
use crate::partition::PartitionConfig;
use crate::stream::{FieldPath, PrimaryKey, StreamDefinition};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Connector Definition
// ============================================================================

/// Top-level connector definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConnectorDefinition {
    /// Connector name
    pub name: String,
    /// Connector version
    #[serde(default = "default_version")]
    pub version: String,
    /// Human-readable title
    #[serde(default)]
    pub title: Option<String>,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Documentation URL
    #[serde(default)]
    pub documentation_url: Option<String>,
    /// Configuration properties the connector accepts
    #[serde(default)]
    pub spec: SpecConfig,
    /// Directory relative stream paths are resolved against
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    /// Stream definitions
    pub streams: Vec<FileStreamDefinition>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

// ============================================================================
// Stream Definition
// ============================================================================

/// A stream read from JSON Lines files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FileStreamDefinition {
    /// Stream name
    pub name: String,
    /// File path template, e.g. `{{ config.data_dir }}/commits/{{ slice.repository }}.jsonl`
    pub path: String,
    /// Primary key
    #[serde(default)]
    pub primary_key: Option<PrimaryKey>,
    /// Cursor field for incremental reads
    #[serde(default)]
    pub cursor_field: Option<FieldPath>,
    /// Streams to sync first when they are synced too
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Records between checkpoints
    #[serde(default)]
    pub checkpoint_interval: Option<u64>,
    /// Slice routing
    #[serde(default)]
    pub partition: PartitionConfig,
}

impl FileStreamDefinition {
    /// The engine-facing stream descriptor
    pub fn to_definition(&self) -> StreamDefinition {
        StreamDefinition {
            name: self.name.clone(),
            primary_key: self.primary_key.clone(),
            cursor_field: self.cursor_field.clone(),
            dependencies: self.dependencies.clone(),
            checkpoint_interval: self.checkpoint_interval,
        }
    }
}
