//! State types for tracking sync progress
//!
//! These types are serialized to JSON and persisted between runs:
//!
//! ```json
//! { "commits": { "acme/api": { "cutoff": 1704067200000 } } }
//! ```

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Highest cursor value seen for a slice, in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cutoff {
    /// Epoch milliseconds
    pub cutoff: i64,
}

impl Cutoff {
    /// Create from epoch milliseconds
    pub fn from_millis(millis: i64) -> Self {
        Self { cutoff: millis }
    }

    /// Create from a UTC datetime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self::from_millis(dt.timestamp_millis())
    }

    /// Epoch milliseconds
    pub fn millis(self) -> i64 {
        self.cutoff
    }

    /// Convert to a UTC datetime
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.cutoff).single()
    }

    /// This cutoff moved back by `days`
    #[must_use]
    pub fn minus_days(self, days: u32) -> Self {
        Self::from_millis(
            self.cutoff
                .saturating_sub(Duration::days(i64::from(days)).num_milliseconds()),
        )
    }
}

/// State for a single stream: slice key (or stream name) to cutoff
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamState(BTreeMap<String, Cutoff>);

impl StreamState {
    /// Create a new empty stream state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cutoff stored under a key
    pub fn get(&self, key: &str) -> Option<Cutoff> {
        self.0.get(key).copied()
    }

    /// Store a cutoff under a key
    pub fn set(&mut self, key: impl Into<String>, cutoff: Cutoff) {
        self.0.insert(key.into(), cutoff);
    }

    /// Builder-style [`StreamState::set`]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, cutoff: Cutoff) -> Self {
        self.set(key, cutoff);
        self
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no key is stored
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over stored keys and cutoffs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Cutoff)> {
        self.0.iter()
    }
}

/// Sync-wide state: stream name to stream state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncState(BTreeMap<String, StreamState>);

impl SyncState {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get state for a stream
    pub fn get_stream(&self, stream: &str) -> Option<&StreamState> {
        self.0.get(stream)
    }

    /// Get mutable state for a stream, creating if needed
    pub fn get_stream_mut(&mut self, stream: &str) -> &mut StreamState {
        self.0.entry(stream.to_string()).or_default()
    }

    /// Replace the state of a stream
    pub fn set_stream(&mut self, stream: impl Into<String>, state: StreamState) {
        self.0.insert(stream.into(), state);
    }

    /// Get the cutoff of one slice of a stream
    pub fn get_cutoff(&self, stream: &str, key: &str) -> Option<Cutoff> {
        self.0.get(stream)?.get(key)
    }

    /// Names of streams with stored state
    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Whether no stream has state
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
