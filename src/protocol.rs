//! Wire protocol
//!
//! Line-delimited JSON messages written to standard output. Every line is one
//! self-describing message carrying a `type` tag:
//!
//! ```text
//! {"type":"RECORD","record":{"stream":"users","data":{...},"emitted_at":1704067200000}}
//! {"type":"STATE","state":{"data":{"users":{"users":{"cutoff":1704067200000}}}}}
//! {"type":"TRACE","trace":{"type":"SYNC_STATUS","emitted_at":...,"sync_status":{...}}}
//! ```
//!
//! Readers accept messages with unknown `type` tags as [`Message::Unknown`].

use crate::config::Catalog;
use crate::error::Result;
use crate::types::{JsonValue, LogLevel};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// One synced record
    Record { record: RecordMessage },
    /// Sync-wide state checkpoint
    State { state: StateMessage },
    /// Diagnostic log line
    Log { log: LogMessage },
    /// Status and progress signals
    Trace { trace: TraceMessage },
    /// Declared streams
    Catalog { catalog: Catalog },
    /// Result of a pre-flight check
    ConnectionStatus {
        #[serde(rename = "connectionStatus")]
        connection_status: ConnectionStatus,
    },
    /// Declared configuration schema
    Spec { spec: SpecMessage },
    /// A well-formed message of a type this reader does not know
    #[serde(other)]
    Unknown,
}

/// Record payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMessage {
    pub stream: String,
    pub data: JsonValue,
    /// Epoch milliseconds
    pub emitted_at: i64,
}

/// State payload: the full sync-wide state, raw or compressed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    pub data: JsonValue,
}

/// Log payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub level: LogLevel,
    pub message: String,
}

/// Trace payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMessage {
    #[serde(rename = "type")]
    pub trace_type: TraceType,
    pub emitted_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_status: Option<StreamStatusTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_config: Option<SourceConfigTrace>,
}

/// Kind of trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceType {
    StreamStatus,
    SyncStatus,
    SourceConfig,
}

/// Lifecycle of one stream within a sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStatusTrace {
    pub stream: String,
    pub status: StreamStatus,
}

/// Stream lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamStatus {
    Started,
    Complete,
    Incomplete,
}

/// Sync-level status signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub status: SyncStatusKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StatusError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Sync status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatusKind {
    /// Still running; with an error attached, a tolerated failure
    Running,
    /// Completed without failed streams
    Success,
    /// A stream failed
    Errored,
}

/// Failure described by a status signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusError {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice: Option<String>,
    pub recoverable: bool,
}

/// Configuration and prior state a sync started with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfigTrace {
    pub config: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<JsonValue>,
}

/// Connection check payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Connection check outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Succeeded,
    Failed,
}

/// Spec payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecMessage {
    #[serde(rename = "documentationUrl", default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    #[serde(rename = "connectionSpecification")]
    pub connection_specification: JsonValue,
}

impl SyncStatus {
    /// A running status carrying a failure
    pub fn running_with_error(error: StatusError, state: Option<JsonValue>) -> Self {
        Self {
            status: SyncStatusKind::Running,
            error: Some(error),
            state,
            warnings: Vec::new(),
        }
    }

    /// A final success status
    pub fn success(state: Option<JsonValue>, warnings: Vec<String>) -> Self {
        Self {
            status: SyncStatusKind::Success,
            error: None,
            state,
            warnings,
        }
    }

    /// A stream failure status
    pub fn errored(error: StatusError, state: Option<JsonValue>) -> Self {
        Self {
            status: SyncStatusKind::Errored,
            error: Some(error),
            state,
            warnings: Vec::new(),
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl Message {
    /// Create a record message
    pub fn record(stream: impl Into<String>, data: JsonValue) -> Self {
        Self::Record {
            record: RecordMessage {
                stream: stream.into(),
                data,
                emitted_at: now_millis(),
            },
        }
    }

    /// Create a state message
    pub fn state(data: JsonValue) -> Self {
        Self::State {
            state: StateMessage { data },
        }
    }

    /// Create a log message
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            log: LogMessage {
                level,
                message: message.into(),
            },
        }
    }

    /// Create an info log
    pub fn info(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Info, message)
    }

    /// Create a debug log
    pub fn debug(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Debug, message)
    }

    /// Create a warning log
    pub fn warn(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Warn, message)
    }

    /// Create an error log
    pub fn error(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Error, message)
    }

    fn trace(trace_type: TraceType) -> TraceMessage {
        TraceMessage {
            trace_type,
            emitted_at: now_millis(),
            stream_status: None,
            sync_status: None,
            source_config: None,
        }
    }

    /// Create a stream status trace
    pub fn stream_status(stream: impl Into<String>, status: StreamStatus) -> Self {
        let mut trace = Self::trace(TraceType::StreamStatus);
        trace.stream_status = Some(StreamStatusTrace {
            stream: stream.into(),
            status,
        });
        Self::Trace { trace }
    }

    /// Create a sync status trace
    pub fn sync_status(status: SyncStatus) -> Self {
        let mut trace = Self::trace(TraceType::SyncStatus);
        trace.sync_status = Some(status);
        Self::Trace { trace }
    }

    /// Create a source config trace
    pub fn source_config(config: JsonValue, state: Option<JsonValue>) -> Self {
        let mut trace = Self::trace(TraceType::SourceConfig);
        trace.source_config = Some(SourceConfigTrace { config, state });
        Self::Trace { trace }
    }

    /// Create a catalog message
    pub fn catalog(catalog: Catalog) -> Self {
        Self::Catalog { catalog }
    }

    /// Create a connection status message
    pub fn connection_status(status: CheckStatus, message: Option<String>) -> Self {
        Self::ConnectionStatus {
            connection_status: ConnectionStatus { status, message },
        }
    }

    /// Check if this is a record message
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record { .. })
    }

    /// Check if this is a state message
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State { .. })
    }

    /// Check if this is a log message
    pub fn is_log(&self) -> bool {
        matches!(self, Self::Log { .. })
    }

    /// Record payload, if any
    pub fn as_record(&self) -> Option<&RecordMessage> {
        match self {
            Self::Record { record } => Some(record),
            _ => None,
        }
    }

    /// State payload, if any
    pub fn as_state(&self) -> Option<&JsonValue> {
        match self {
            Self::State { state } => Some(&state.data),
            _ => None,
        }
    }

    /// Sync status payload, if any
    pub fn as_sync_status(&self) -> Option<&SyncStatus> {
        match self {
            Self::Trace { trace } => trace.sync_status.as_ref(),
            _ => None,
        }
    }

    /// Stream status payload, if any
    pub fn as_stream_status(&self) -> Option<&StreamStatusTrace> {
        match self {
            Self::Trace { trace } => trace.stream_status.as_ref(),
            _ => None,
        }
    }

    /// Serialize as one protocol line (without newline)
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse one protocol line
    pub fn parse_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }
}
