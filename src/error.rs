//! Error types for slicesync
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Errors fall into four groups that the sync engine treats differently:
//! configuration errors abort before any I/O, recoverable errors are reported
//! and skipped, source errors consume a slice failure budget, and stream-level
//! errors consume a stream failure budget.

use thiserror::Error;

/// The main error type for slicesync
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unknown stream(s) requested: {}. Known streams: {}", .unknown.join(", "), .known.join(", "))]
    UnknownStreams {
        unknown: Vec<String>,
        known: Vec<String>,
    },

    #[error("Stream dependencies contain a cycle between: {}", .streams.join(", "))]
    DependencyCycle { streams: Vec<String> },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Source Errors
    // ============================================================================
    /// Explicitly marked by the data-fetching layer as safe to skip
    #[error("Recoverable error: {message}")]
    Recoverable { message: String },

    #[error("Source error: {message}")]
    Source { message: String },

    #[error("Failed to enumerate slices for stream '{stream}': {message}")]
    SliceEnumeration { stream: String, message: String },

    // ============================================================================
    // Aggregate Errors
    // ============================================================================
    #[error("Encountered errors while reading {} of {total} slice(s) of stream '{stream}': {}", .slices.len(), .slices.join(", "))]
    SliceFailures {
        stream: String,
        slices: Vec<String>,
        total: usize,
    },

    #[error("Encountered an error while reading stream(s): {}", .streams.join(", "))]
    StreamFailures { streams: Vec<String> },

    #[error("Sync cancelled: output is no longer consumed")]
    Cancelled,

    // ============================================================================
    // State Errors
    // ============================================================================
    #[error("State error: {message}")]
    State { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a recoverable error
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::Recoverable {
            message: message.into(),
        }
    }

    /// Create an unmarked source error
    pub fn source(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    /// Create a slice enumeration error
    pub fn slice_enumeration(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SliceEnumeration {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Create a state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Check if the data source marked this error as recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Recoverable { .. })
    }

    /// Check if this is a pre-flight configuration error
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::Config { .. }
                | Error::UnknownStreams { .. }
                | Error::DependencyCycle { .. }
                | Error::YamlParse(_)
        )
    }
}

/// Result type alias for slicesync
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
