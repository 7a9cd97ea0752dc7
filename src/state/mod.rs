//! State management module
//!
//! Handles cursor tracking, state encoding, and resumability.
//! State is persisted between sync runs to enable incremental syncs.
//!
//! # Overview
//!
//! The state module provides:
//! - `SyncState` / `StreamState` / `Cutoff` - Sync-wide progress, keyed by stream then slice
//! - `CursorTracker` - Decides whether a record advances a slice's cutoff
//! - `codec` - Optional gzip+base64 wrapping of the persisted blob
//! - `StateManager` - File-based state persistence

pub mod codec;
mod cursor;
mod manager;
mod types;

pub use cursor::{parse_cutoff, updated_state, CursorTracker};
pub use manager::StateManager;
pub use types::{Cutoff, StreamState, SyncState};
