//! Engine types
//!
//! The message emitter shared by the orchestrator and the slice driver, and
//! the statistics collected during a sync.

use crate::error::{Error, Result};
use crate::protocol::Message;
use crate::state::{codec, SyncState};
use crate::types::JsonValue;
use serde::Serialize;
use tokio::sync::mpsc;

/// Sends messages to the consumer of a sync
///
/// The channel is bounded, so a slow consumer suspends the sync. A closed
/// channel means the consumer stopped reading; every send then fails with
/// [`Error::Cancelled`] and the sync unwinds.
#[derive(Debug, Clone)]
pub struct Emitter {
    tx: mpsc::Sender<Result<Message>>,
    compress_state: bool,
}

impl Emitter {
    /// Wrap a channel sender
    pub fn new(tx: mpsc::Sender<Result<Message>>, compress_state: bool) -> Self {
        Self { tx, compress_state }
    }

    /// Emit one message, waiting until the consumer has room for it
    pub async fn emit(&self, message: Message) -> Result<()> {
        self.tx.send(Ok(message)).await.map_err(|_| Error::Cancelled)
    }

    /// Deliver the terminal error of a sync
    pub async fn fail(&self, error: Error) {
        // Nobody is listening any more when this fails
        let _ = self.tx.send(Err(error)).await;
    }

    /// Encode state the way checkpoints carry it
    pub fn encode(&self, state: &SyncState) -> Result<JsonValue> {
        codec::encode(state, self.compress_state)
    }

    /// Emit a STATE checkpoint carrying the full sync-wide state
    pub async fn checkpoint(&self, state: &SyncState) -> Result<()> {
        let blob = self.encode(state)?;
        self.emit(Message::state(blob)).await
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Statistics for one stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Stream name
    pub stream: String,
    /// Records emitted
    pub records: usize,
    /// Slices attempted
    pub slices: usize,
    /// Slices that failed with an unmarked error
    pub failed_slices: usize,
    /// Slices skipped after a recoverable error
    pub skipped_slices: usize,
    /// STATE checkpoints emitted
    pub checkpoints: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl StreamStats {
    /// Create stats for a stream
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            ..Self::default()
        }
    }
}

/// Statistics for a whole sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Per-stream statistics, in run order
    pub streams: Vec<StreamStats>,
    /// Streams that failed
    pub failed_streams: Vec<String>,
    /// Warnings about tolerated failures
    pub warnings: Vec<String>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records across streams
    pub fn records(&self) -> usize {
        self.streams.iter().map(|s| s.records).sum()
    }

    /// Total slices across streams
    pub fn slices(&self) -> usize {
        self.streams.iter().map(|s| s.slices).sum()
    }
}
