//! Stream types and traits
//!
//! Defines the core stream abstractions.

use crate::error::Result;
use crate::state::StreamState;
use crate::types::{JsonObject, JsonValue, SyncMode};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

/// A single record read from a source
pub type Record = JsonValue;

/// Lazily produced slices of a stream
pub type SliceStream<'a> = BoxStream<'a, Result<Slice>>;

/// Lazily produced records of one slice
pub type RecordStream<'a> = BoxStream<'a, Result<Record>>;

// ============================================================================
// Field Path
// ============================================================================

/// Path into a (possibly nested) record
///
/// Deserializes from either a dotted string (`"author.date"`) or a list of
/// segments (`["author", "date"]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "FieldPathRepr", into = "Vec<String>")]
pub struct FieldPath(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum FieldPathRepr {
    Dotted(String),
    Segments(Vec<String>),
}

impl From<FieldPathRepr> for FieldPath {
    fn from(repr: FieldPathRepr) -> Self {
        match repr {
            FieldPathRepr::Dotted(path) => Self::parse(&path),
            FieldPathRepr::Segments(segments) => Self(segments),
        }
    }
}

impl From<FieldPath> for Vec<String> {
    fn from(path: FieldPath) -> Self {
        path.0
    }
}

impl FieldPath {
    /// Create a path from segments
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse a dotted path like `"data.updated_at"`
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('.')
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect(),
        )
    }

    /// Path segments
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Follow the path into a record; `None` when any segment is missing
    pub fn resolve<'a>(&self, record: &'a JsonValue) -> Option<&'a JsonValue> {
        if self.0.is_empty() {
            return None;
        }
        let mut current = record;
        for part in &self.0 {
            current = match current {
                JsonValue::Object(map) => map.get(part)?,
                JsonValue::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        (!current.is_null()).then_some(current)
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

// ============================================================================
// Primary Key
// ============================================================================

/// Primary key of a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    /// A single top-level field
    Field(String),
    /// Several top-level fields
    Composite(Vec<String>),
    /// Several nested field paths
    Nested(Vec<Vec<String>>),
}

impl PrimaryKey {
    /// Key as a list of field paths (catalog representation)
    pub fn paths(&self) -> Vec<Vec<String>> {
        match self {
            Self::Field(field) => vec![vec![field.clone()]],
            Self::Composite(fields) => fields.iter().map(|f| vec![f.clone()]).collect(),
            Self::Nested(paths) => paths.clone(),
        }
    }
}

// ============================================================================
// Stream Definition
// ============================================================================

/// Immutable descriptor of a stream, created once per sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDefinition {
    /// Stream name, unique within a sync
    pub name: String,

    /// Primary key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKey>,

    /// Field holding the incremental cutoff
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_field: Option<FieldPath>,

    /// Streams whose output this stream may use when they are synced too
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Records per slice between checkpoints (absent = slice boundaries only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_interval: Option<u64>,
}

impl StreamDefinition {
    /// Create a definition with only a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: None,
            cursor_field: None,
            dependencies: Vec::new(),
            checkpoint_interval: None,
        }
    }

    /// Set the primary key
    #[must_use]
    pub fn with_primary_key(mut self, key: PrimaryKey) -> Self {
        self.primary_key = Some(key);
        self
    }

    /// Set the cursor field from a dotted path
    #[must_use]
    pub fn with_cursor_field(mut self, path: &str) -> Self {
        self.cursor_field = Some(FieldPath::parse(path));
        self
    }

    /// Add a dependency
    #[must_use]
    pub fn depends_on(mut self, stream: impl Into<String>) -> Self {
        self.dependencies.push(stream.into());
        self
    }

    /// Set the checkpoint interval
    #[must_use]
    pub fn with_checkpoint_interval(mut self, records: u64) -> Self {
        self.checkpoint_interval = Some(records);
        self
    }

    /// Effective checkpoint interval, ignoring a zero value
    pub fn checkpoint_every(&self) -> Option<u64> {
        self.checkpoint_interval.filter(|n| *n > 0)
    }
}

// ============================================================================
// Slice
// ============================================================================

/// One partition of a stream's data
///
/// The key scopes the stored cursor; unsliced streams yield a single slice
/// with no key, whose cursor is stored under the stream name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    /// Partition key
    #[serde(default)]
    pub key: Option<String>,
    /// Values the source uses to scope its query
    #[serde(default)]
    pub values: JsonObject,
}

impl Slice {
    /// The single slice of an unpartitioned stream
    pub fn unkeyed() -> Self {
        Self::default()
    }

    /// Create a keyed slice
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            values: JsonObject::new(),
        }
    }

    /// Add a value
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.values.get(key)
    }

    /// Get a string value by key
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(JsonValue::as_str)
    }

    /// Key under which this slice's cutoff is stored
    pub fn state_key<'a>(&'a self, stream: &'a str) -> &'a str {
        self.key.as_deref().unwrap_or(stream)
    }

    /// Human readable label used in logs and errors
    pub fn label(&self) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None if self.values.is_empty() => "<unsliced>".to_string(),
            None => JsonValue::Object(self.values.clone()).to_string(),
        }
    }
}

// ============================================================================
// Source Stream
// ============================================================================

/// Parameters for reading one slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    /// Effective sync mode
    pub mode: SyncMode,
    /// Stored cutoff for the slice minus the configured lag; `None` in full refresh
    pub cutoff: Option<DateTime<Utc>>,
}

impl ReadRequest {
    /// A full refresh read
    pub fn full_refresh() -> Self {
        Self {
            mode: SyncMode::FullRefresh,
            cutoff: None,
        }
    }

    /// An incremental read starting after `cutoff`
    pub fn incremental(cutoff: Option<DateTime<Utc>>) -> Self {
        Self {
            mode: SyncMode::Incremental,
            cutoff,
        }
    }
}

/// A readable stream
///
/// Implementations produce slices and records lazily; the sync engine pulls
/// one item at a time and never polls two sequences concurrently.
pub trait SourceStream: Send + Sync {
    /// Stream descriptor
    fn definition(&self) -> &StreamDefinition;

    /// Stream name
    fn name(&self) -> &str {
        &self.definition().name
    }

    /// Whether incremental reads are supported
    fn supports_incremental(&self) -> bool {
        self.definition().cursor_field.is_some()
    }

    /// Enumerate slices; defaults to a single unkeyed slice
    fn stream_slices(&self, _mode: SyncMode, _state: Option<StreamState>) -> SliceStream<'_> {
        stream::iter(vec![Ok(Slice::unkeyed())]).boxed()
    }

    /// Read the records of one slice
    fn read_records<'a>(&'a self, slice: &'a Slice, request: ReadRequest) -> RecordStream<'a>;
}
