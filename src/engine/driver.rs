//! Slice driver
//!
//! Runs one stream: enumerates its slices, reads each slice's records,
//! advances cursors and emits checkpoints, and applies the slice failure
//! policy.

use super::types::{Emitter, StreamStats};
use crate::config::SyncOptions;
use crate::error::{Error, Result};
use crate::protocol::{Message, StatusError, SyncStatus};
use crate::state::{CursorTracker, SyncState};
use crate::stream::{ReadRequest, Slice, SourceStream};
use crate::types::SyncMode;
use futures::StreamExt;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Mode a stream actually runs in
///
/// Incremental only when requested, supported by the stream, and not a
/// backfill.
pub fn effective_mode(requested: SyncMode, supports_incremental: bool, backfill: bool) -> SyncMode {
    if requested == SyncMode::Incremental && supports_incremental && !backfill {
        SyncMode::Incremental
    } else {
        SyncMode::FullRefresh
    }
}

/// Drives the slices of one stream at a time
#[derive(Debug, Clone, Copy)]
pub struct SliceDriver<'a> {
    options: &'a SyncOptions,
    emitter: &'a Emitter,
}

impl<'a> SliceDriver<'a> {
    /// Create a driver
    pub fn new(options: &'a SyncOptions, emitter: &'a Emitter) -> Self {
        Self { options, emitter }
    }

    /// Run every slice of `source`
    ///
    /// Only the state slots of this stream are touched. Returns
    /// [`Error::SliceFailures`] when slices failed, whether the slice budget
    /// was exceeded or the stream simply finished with failures.
    pub async fn run(
        &self,
        source: &dyn SourceStream,
        requested: SyncMode,
        state: &mut SyncState,
        stats: &mut StreamStats,
    ) -> Result<()> {
        let started = Instant::now();
        let result = self.run_slices(source, requested, state, stats).await;
        stats.duration_ms = started.elapsed().as_millis() as u64;
        result
    }

    async fn run_slices(
        &self,
        source: &dyn SourceStream,
        requested: SyncMode,
        state: &mut SyncState,
        stats: &mut StreamStats,
    ) -> Result<()> {
        let name = source.name();
        let mode = effective_mode(requested, source.supports_incremental(), self.options.backfill);
        debug!(stream = name, ?mode, backfill = self.options.backfill, "Reading stream");

        let prior = match mode {
            SyncMode::Incremental => state.get_stream(name).cloned(),
            SyncMode::FullRefresh => None,
        };

        let mut slices = source.stream_slices(mode, prior);
        let mut failed: Vec<String> = Vec::new();
        let mut total = 0;

        while let Some(next) = slices.next().await {
            let slice = next.map_err(|e| Error::slice_enumeration(name, e.to_string()))?;
            total += 1;
            stats.slices += 1;

            let error = match self.read_slice(source, &slice, mode, state, stats).await {
                Ok(()) => continue,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => e,
            };

            let label = slice.label();
            if error.is_recoverable() {
                warn!(stream = name, slice = %label, error = %error, "Skipping slice after recoverable error");
                stats.skipped_slices += 1;
                self.report(name, &label, &error, true, state).await?;
                continue;
            }

            error!(stream = name, slice = %label, error = %error, "Slice failed");
            stats.failed_slices += 1;
            failed.push(label.clone());

            let Some(budget) = self.options.max_slice_failures else {
                return Err(Error::SliceFailures {
                    stream: name.to_string(),
                    slices: failed,
                    total,
                });
            };

            self.report(name, &label, &error, false, state).await?;
            if budget.is_exceeded(failed.len()) {
                warn!(stream = name, failed = failed.len(), "Slice failure budget exceeded");
                return Err(Error::SliceFailures {
                    stream: name.to_string(),
                    slices: failed,
                    total,
                });
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::SliceFailures {
                stream: name.to_string(),
                slices: failed,
                total,
            })
        }
    }

    async fn read_slice(
        &self,
        source: &dyn SourceStream,
        slice: &Slice,
        mode: SyncMode,
        state: &mut SyncState,
        stats: &mut StreamStats,
    ) -> Result<()> {
        let name = source.name();
        let key = slice.state_key(name);
        let backfill = self.options.backfill;
        let lag = self.options.cutoff_lag_days;

        let request = match mode {
            SyncMode::Incremental => ReadRequest::incremental(
                state
                    .get_cutoff(name, key)
                    .and_then(|cutoff| cutoff.minus_days(lag).to_datetime()),
            ),
            SyncMode::FullRefresh => ReadRequest::full_refresh(),
        };
        let tracker = CursorTracker::new(source.definition().cursor_field.as_ref(), lag);
        let interval = source.definition().checkpoint_every();

        let mut records = source.read_records(slice, request);
        let mut count: u64 = 0;

        while let Some(record) = records.next().await {
            let record = record?;
            let latest = match mode {
                SyncMode::Incremental => tracker.extract(&record),
                SyncMode::FullRefresh => None,
            };

            self.emitter.emit(Message::record(name, record)).await?;
            count += 1;
            stats.records += 1;

            if let Some(latest) = latest {
                tracker.apply(state.get_stream_mut(name), latest, key);
            }

            if !backfill && interval.is_some_and(|every| count % every == 0) {
                self.emitter.checkpoint(state).await?;
                stats.checkpoints += 1;
            }
        }

        if !backfill {
            self.emitter.checkpoint(state).await?;
            stats.checkpoints += 1;
        }

        debug!(stream = name, slice = %slice.label(), records = count, "Slice complete");
        Ok(())
    }

    /// Emit a running status describing a slice failure
    async fn report(
        &self,
        stream: &str,
        slice: &str,
        error: &Error,
        recoverable: bool,
        state: &SyncState,
    ) -> Result<()> {
        let status = SyncStatus::running_with_error(
            StatusError {
                summary: error.to_string(),
                stream: Some(stream.to_string()),
                slice: Some(slice.to_string()),
                recoverable,
            },
            Some(self.emitter.encode(state)?),
        );
        self.emitter.emit(Message::sync_status(status)).await
    }
}
