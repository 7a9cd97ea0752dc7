//! Stream definitions and the source stream trait
//!
//! A stream is an immutable descriptor plus a lazily pulled source of slices
//! and records.
//!
//! # Overview
//!
//! The stream module provides:
//! - `StreamDefinition` - Name, primary key, cursor field, dependencies, checkpoint interval
//! - `Slice` - Opaque partition key scoping both record reads and stored cursors
//! - `SourceStream` - Trait implemented by every readable stream
//!
//! Slice and record sequences are `futures` streams consumed one item at a
//! time. Any resource held by a sequence (an open paginated cursor, a file
//! handle) is released when the sequence is dropped, which covers normal
//! completion, errors and early abandonment alike.

mod types;

pub use types::{
    FieldPath, PrimaryKey, ReadRequest, Record, RecordStream, Slice, SliceStream, SourceStream,
    StreamDefinition,
};
