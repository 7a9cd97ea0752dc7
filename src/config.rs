//! Configuration types
//!
//! This module contains the catalog structures exchanged with the invoker,
//! the connector configuration schema, and the orchestration options read
//! from the connector configuration.

use crate::error::{Error, Result};
use crate::types::{DestinationSyncMode, JsonValue, SyncMode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Spec Config (for UI)
// ============================================================================

/// Configuration specification for connector setup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecConfig {
    /// Configuration properties
    #[serde(default)]
    pub properties: HashMap<String, PropertyConfig>,
}

/// Configuration property definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyConfig {
    /// Property type
    #[serde(rename = "type", default)]
    pub property_type: PropertyType,

    /// Human-readable title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Property description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether this is a secret (should be masked)
    #[serde(default)]
    pub secret: bool,

    /// Whether this property is required
    #[serde(default)]
    pub required: bool,

    /// Default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
}

/// Property type for configuration schema
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl SpecConfig {
    /// The orchestration options every connector accepts
    pub fn sync_properties() -> HashMap<String, PropertyConfig> {
        let prop = |property_type: PropertyType, description: &str| PropertyConfig {
            property_type,
            description: Some(description.to_string()),
            ..PropertyConfig::default()
        };

        HashMap::from([
            (
                "max_stream_failures".to_string(),
                prop(
                    PropertyType::Integer,
                    "Failed streams tolerated before the sync aborts (-1 = unlimited)",
                ),
            ),
            (
                "max_slice_failures".to_string(),
                prop(
                    PropertyType::Integer,
                    "Failed slices tolerated per stream before it aborts (-1 = unlimited)",
                ),
            ),
            (
                "max_slice_failure_ratio".to_string(),
                prop(
                    PropertyType::Number,
                    "Fraction of failed slices above which a stream is marked failed",
                ),
            ),
            (
                "backfill".to_string(),
                prop(
                    PropertyType::Boolean,
                    "Read everything without touching stored state",
                ),
            ),
            (
                "compress_state".to_string(),
                prop(PropertyType::Boolean, "Emit state as base64/gzip"),
            ),
            (
                "cutoff_lag_days".to_string(),
                prop(
                    PropertyType::Integer,
                    "Days subtracted from cutoffs to re-read late arriving records",
                ),
            ),
        ])
    }

    /// Copy of `config` with secret properties replaced by `"REDACTED"`
    pub fn redact(&self, config: &JsonValue) -> JsonValue {
        let mut redacted = config.clone();
        if let Some(map) = redacted.as_object_mut() {
            for (name, property) in &self.properties {
                if property.secret {
                    if let Some(value) = map.get_mut(name) {
                        *value = JsonValue::String("REDACTED".to_string());
                    }
                }
            }
        }
        redacted
    }
}

// ============================================================================
// Sync Options
// ============================================================================

/// Number of failures tolerated before aborting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum FailureBudget {
    /// At most this many failures
    Limited(u32),
    /// Never abort on count
    Unlimited,
}

impl FailureBudget {
    /// Configuration value meaning "unlimited"
    pub const UNLIMITED_SENTINEL: i64 = -1;

    /// Whether `failures` is over budget
    pub fn is_exceeded(self, failures: usize) -> bool {
        match self {
            Self::Limited(max) => failures > max as usize,
            Self::Unlimited => false,
        }
    }
}

impl TryFrom<i64> for FailureBudget {
    type Error = String;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        if value == Self::UNLIMITED_SENTINEL {
            return Ok(Self::Unlimited);
        }
        u32::try_from(value)
            .map(Self::Limited)
            .map_err(|_| format!("invalid failure budget {value}: expected -1 or a count"))
    }
}

impl From<FailureBudget> for i64 {
    fn from(budget: FailureBudget) -> Self {
        match budget {
            FailureBudget::Limited(max) => i64::from(max),
            FailureBudget::Unlimited => FailureBudget::UNLIMITED_SENTINEL,
        }
    }
}

/// Orchestration options read from the connector configuration
///
/// Unrelated configuration keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Failed streams tolerated; absent = the first failure aborts the sync
    #[serde(default)]
    pub max_stream_failures: Option<FailureBudget>,

    /// Failed slices tolerated per stream; absent = the first failure aborts the stream
    #[serde(default, alias = "max_slices_failures")]
    pub max_slice_failures: Option<FailureBudget>,

    /// Fraction of failed slices above which a stream is marked failed
    #[serde(default)]
    pub max_slice_failure_ratio: Option<f64>,

    /// Read everything without touching stored state
    #[serde(default)]
    pub backfill: bool,

    /// Emit state as base64/gzip
    #[serde(default)]
    pub compress_state: bool,

    /// Days subtracted from cutoffs when comparing and reading
    #[serde(default)]
    pub cutoff_lag_days: u32,
}

impl SyncOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Read options from a connector configuration object
    pub fn from_config(config: &JsonValue) -> Result<Self> {
        if config.is_null() {
            return Ok(Self::default());
        }

        let options: Self = serde_json::from_value(config.clone())
            .map_err(|e| Error::config(format!("Invalid sync options: {e}")))?;

        if let Some(ratio) = options.max_slice_failure_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(Error::config(format!(
                    "max_slice_failure_ratio must be between 0 and 1, got {ratio}"
                )));
            }
        }

        Ok(options)
    }

    /// Set the stream failure budget
    #[must_use]
    pub fn with_max_stream_failures(mut self, budget: FailureBudget) -> Self {
        self.max_stream_failures = Some(budget);
        self
    }

    /// Set the slice failure budget
    #[must_use]
    pub fn with_max_slice_failures(mut self, budget: FailureBudget) -> Self {
        self.max_slice_failures = Some(budget);
        self
    }

    /// Set the slice failure ratio
    #[must_use]
    pub fn with_max_slice_failure_ratio(mut self, ratio: f64) -> Self {
        self.max_slice_failure_ratio = Some(ratio);
        self
    }

    /// Force full refresh without touching state
    #[must_use]
    pub fn with_backfill(mut self, backfill: bool) -> Self {
        self.backfill = backfill;
        self
    }

    /// Compress emitted state
    #[must_use]
    pub fn with_compress_state(mut self, compress: bool) -> Self {
        self.compress_state = compress;
        self
    }

    /// Set the cutoff lag
    #[must_use]
    pub fn with_cutoff_lag_days(mut self, days: u32) -> Self {
        self.cutoff_lag_days = days;
        self
    }
}

// ============================================================================
// Catalog Types
// ============================================================================

/// Discovered catalog (available streams)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Available streams
    pub streams: Vec<CatalogStream>,
}

/// Stream in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogStream {
    /// Stream name
    pub name: String,

    /// JSON schema for the stream
    #[serde(default)]
    pub json_schema: JsonValue,

    /// Supported sync modes
    #[serde(default)]
    pub supported_sync_modes: Vec<SyncMode>,

    /// Whether the source defines the cursor
    #[serde(default)]
    pub source_defined_cursor: bool,

    /// Default cursor field
    #[serde(default)]
    pub default_cursor_field: Option<Vec<String>>,

    /// Source-defined primary key
    #[serde(default)]
    pub source_defined_primary_key: Option<Vec<Vec<String>>>,
}

impl CatalogStream {
    /// Create a catalog entry supporting only full refresh
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            json_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "additionalProperties": true
            }),
            supported_sync_modes: vec![SyncMode::FullRefresh],
            source_defined_cursor: false,
            default_cursor_field: None,
            source_defined_primary_key: None,
        }
    }

    /// Whether incremental sync is supported
    pub fn supports_incremental(&self) -> bool {
        self.supported_sync_modes.contains(&SyncMode::Incremental)
    }
}

impl Catalog {
    /// Select every stream, incrementally where supported
    pub fn configure_all(&self) -> ConfiguredCatalog {
        ConfiguredCatalog {
            streams: self
                .streams
                .iter()
                .map(|stream| {
                    let sync_mode = if stream.supports_incremental() {
                        SyncMode::Incremental
                    } else {
                        SyncMode::FullRefresh
                    };
                    ConfiguredStream::new(stream.clone(), sync_mode)
                })
                .collect(),
        }
    }
}

/// Configured catalog (selected streams for sync)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfiguredCatalog {
    /// Selected streams
    pub streams: Vec<ConfiguredStream>,
}

impl ConfiguredCatalog {
    /// Requested stream names, in catalog order
    pub fn stream_names(&self) -> Vec<&str> {
        self.streams.iter().map(|s| s.stream.name.as_str()).collect()
    }

    /// Find a configured stream by name
    pub fn get(&self, name: &str) -> Option<&ConfiguredStream> {
        self.streams.iter().find(|s| s.stream.name == name)
    }
}

/// Configured stream for sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfiguredStream {
    /// Stream reference
    pub stream: CatalogStream,

    /// Selected sync mode
    #[serde(default)]
    pub sync_mode: SyncMode,

    /// Destination sync mode
    #[serde(default)]
    pub destination_sync_mode: DestinationSyncMode,

    /// Cursor field to use
    #[serde(default)]
    pub cursor_field: Option<Vec<String>>,

    /// Primary key to use
    #[serde(default)]
    pub primary_key: Option<Vec<Vec<String>>>,
}

impl ConfiguredStream {
    /// Configure a catalog stream with a sync mode
    pub fn new(stream: CatalogStream, sync_mode: SyncMode) -> Self {
        Self {
            cursor_field: stream.default_cursor_field.clone(),
            primary_key: stream.source_defined_primary_key.clone(),
            stream,
            sync_mode,
            destination_sync_mode: DestinationSyncMode::Append,
        }
    }
}
