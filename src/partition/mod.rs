//! Slice routing module
//!
//! Supports: static lists, datetime windows
//!
//! # Overview
//!
//! A router splits a stream into keyed slices that are read sequentially.
//! Each slice key scopes its own stored cursor, so one slowly updating
//! partition never holds back another. Useful for:
//! - Static list of values (e.g., regions, accounts, repositories)
//! - Date range slicing for large datasets

mod routers;
mod types;

pub use routers::{DatetimeRouter, ListRouter};
pub use types::{slice_stream, PartitionConfig, SliceRouter};
