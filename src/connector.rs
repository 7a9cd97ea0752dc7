//! Connector trait
//!
//! Defines the core Connector trait that all connectors implement. A
//! connector declares its configuration schema, validates a configuration,
//! and builds the stream objects the sync engine reads from.

use crate::config::{Catalog, CatalogStream, SpecConfig};
use crate::error::Result;
use crate::protocol::{Message, SpecMessage};
use crate::stream::SourceStream;
use crate::types::{JsonValue, SyncMode};
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::pin::Pin;

// ============================================================================
// Connector Spec (for UI)
// ============================================================================

/// Connector specification returned by spec()
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorSpec {
    /// Connector name
    pub name: String,

    /// Human-readable title
    pub title: String,

    /// Description
    pub description: Option<String>,

    /// Configuration specification
    pub spec: SpecConfig,

    /// Documentation URL
    pub documentation_url: Option<String>,
}

impl ConnectorSpec {
    /// JSON schema of the configuration, including the orchestration options
    pub fn connection_specification(&self) -> JsonValue {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for (name, property) in SpecConfig::sync_properties()
            .into_iter()
            .chain(self.spec.properties.clone())
        {
            if property.required {
                required.push(name.clone());
            }
            properties.insert(name, serde_json::to_value(property).unwrap_or_default());
        }
        required.sort();

        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "title": self.title,
            "type": "object",
            "required": required,
            "properties": properties,
        })
    }

    /// The SPEC protocol message
    pub fn to_message(&self) -> Message {
        Message::Spec {
            spec: SpecMessage {
                documentation_url: self.documentation_url.clone(),
                connection_specification: self.connection_specification(),
            },
        }
    }
}

// ============================================================================
// Check Result
// ============================================================================

/// Result of a connection check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Whether the check succeeded
    pub success: bool,

    /// Error message if failed
    pub message: Option<String>,
}

impl CheckResult {
    /// Create a successful check result
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// Create a failed check result
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

// ============================================================================
// Connector Trait
// ============================================================================

/// Type alias for the message stream returned by a sync
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<Message>> + Send>>;

/// Core trait that all connectors implement
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the connector specification (for UI/validation)
    fn spec(&self) -> ConnectorSpec;

    /// Tests if configuration is valid and the source is reachable
    async fn check(&self, config: &JsonValue) -> Result<CheckResult>;

    /// Builds the streams of this source, in declaration order
    fn streams(&self, config: &JsonValue) -> Result<Vec<Box<dyn SourceStream>>>;

    /// Lists available streams from the source
    async fn discover(&self, config: &JsonValue) -> Result<Catalog> {
        let streams = self
            .streams(config)?
            .iter()
            .map(|source| {
                let definition = source.definition();
                let mut entry = CatalogStream::new(&definition.name);
                if source.supports_incremental() {
                    entry.supported_sync_modes.push(SyncMode::Incremental);
                    entry.source_defined_cursor = true;
                }
                entry.default_cursor_field = definition
                    .cursor_field
                    .clone()
                    .map(Vec::<String>::from);
                entry.source_defined_primary_key =
                    definition.primary_key.as_ref().map(|pk| pk.paths());
                entry
            })
            .collect();

        Ok(Catalog { streams })
    }
}
