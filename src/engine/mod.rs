//! Execution engine module
//!
//! Main read loop and stream orchestration.
//!
//! # Overview
//!
//! The engine module provides:
//! - `SyncEngine` - Runs a whole sync and exposes it as a lazy message stream
//! - `DependencyGraph` - Orders requested streams after their dependencies
//! - `SliceDriver` - Runs the slices of one stream and applies the slice failure policy
//! - `Emitter` - Bounded message channel; a closed channel cancels the sync
//!
//! A sync is strictly sequential: one stream at a time, one slice at a time,
//! one record at a time. The consumer's pace drives the producer.

mod driver;
mod resolver;
mod types;

pub use driver::{effective_mode, SliceDriver};
pub use resolver::DependencyGraph;
pub use types::{Emitter, StreamStats, SyncStats};

use crate::config::{ConfiguredCatalog, SyncOptions};
use crate::connector::{Connector, MessageStream};
use crate::error::{Error, Result};
use crate::protocol::{Message, StatusError, StreamStatus, SyncStatus};
use crate::state::codec;
use crate::stream::{SourceStream, StreamDefinition};
use crate::types::JsonValue;
use futures::{future, stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Messages buffered between the sync task and its consumer
const CHANNEL_CAPACITY: usize = 1;

/// Sync engine for orchestrating a read
pub struct SyncEngine {
    connector: Arc<dyn Connector>,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Start a sync and return its messages
    ///
    /// The sync runs on a spawned task that suspends whenever the consumer
    /// is not pulling. A failed sync ends the stream with one `Err` item,
    /// including a task that panicked. Dropping the stream cancels the sync
    /// at its next emission.
    pub fn read(
        &self,
        config: JsonValue,
        catalog: ConfiguredCatalog,
        state: Option<JsonValue>,
    ) -> MessageStream {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let connector = Arc::clone(&self.connector);

        let task = tokio::spawn(async move {
            let engine = SyncEngine { connector };
            if let Err(e) = engine.run(&config, &catalog, state, tx.clone()).await {
                match e {
                    Error::Cancelled => info!("Sync cancelled by consumer"),
                    e => Emitter::new(tx, false).fail(e).await,
                }
            }
        });

        let messages = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        // A task that died without reporting still ends the stream with an error
        let outcome = stream::once(async move {
            match task.await {
                Ok(()) => None,
                Err(e) => {
                    error!(error = %e, "Sync task aborted");
                    Some(Err(Error::Other(format!("Sync task aborted: {e}"))))
                }
            }
        })
        .filter_map(future::ready);

        Box::pin(messages.chain(outcome))
    }

    /// Run a sync to completion, sending messages through `tx`
    pub async fn run(
        &self,
        config: &JsonValue,
        catalog: &ConfiguredCatalog,
        state: Option<JsonValue>,
        tx: mpsc::Sender<Result<Message>>,
    ) -> Result<SyncStats> {
        let started = Instant::now();
        let options = SyncOptions::from_config(config)?;
        let emitter = Emitter::new(tx, options.compress_state);
        let mut state = codec::decode(state)?;

        let spec = self.connector.spec();
        emitter
            .emit(Message::source_config(
                spec.spec.redact(config),
                Some(emitter.encode(&state)?),
            ))
            .await?;

        let sources = self.connector.streams(config)?;
        let definitions: Vec<StreamDefinition> =
            sources.iter().map(|s| s.definition().clone()).collect();
        let order = DependencyGraph::new(&definitions)?.resolve(&catalog.stream_names())?;
        let by_name: HashMap<&str, &dyn SourceStream> =
            sources.iter().map(|s| (s.name(), s.as_ref())).collect();

        info!(connector = %spec.name, streams = ?order, "Starting sync");

        let driver = SliceDriver::new(&options, &emitter);
        let mut stats = SyncStats::new();

        for name in &order {
            let (Some(source), Some(configured)) = (by_name.get(name.as_str()), catalog.get(name))
            else {
                continue;
            };

            emitter
                .emit(Message::stream_status(name, StreamStatus::Started))
                .await?;
            emitter
                .emit(Message::info(format!("Starting sync for stream: {name}")))
                .await?;

            let mut stream_stats = StreamStats::new(name);
            let result = driver
                .run(*source, configured.sync_mode, &mut state, &mut stream_stats)
                .await;

            let result = match result {
                Err(Error::SliceFailures {
                    stream,
                    slices,
                    total,
                }) if slice_failures_tolerated(&options, slices.len(), total) => {
                    let warning = format!(
                        "Stream '{stream}' completed with {} failed slice(s) of {total}: {}",
                        slices.len(),
                        slices.join(", ")
                    );
                    warn!(stream = %stream, failed = slices.len(), total, "Tolerating failed slices");
                    emitter.emit(Message::warn(warning.clone())).await?;
                    stats.warnings.push(warning);
                    Ok(())
                }
                other => other,
            };

            match result {
                Ok(()) => {
                    info!(
                        stream = %name,
                        records = stream_stats.records,
                        slices = stream_stats.slices,
                        duration_ms = stream_stats.duration_ms,
                        "Stream complete"
                    );
                    emitter
                        .emit(Message::stream_status(name, StreamStatus::Complete))
                        .await?;
                    emitter
                        .emit(Message::info(format!(
                            "Finished syncing {name}: {} record(s) from {} slice(s)",
                            stream_stats.records, stream_stats.slices
                        )))
                        .await?;
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    error!(stream = %name, error = %e, "Stream failed");
                    emitter
                        .emit(Message::stream_status(name, StreamStatus::Incomplete))
                        .await?;
                    emitter
                        .emit(Message::sync_status(SyncStatus::errored(
                            StatusError {
                                summary: e.to_string(),
                                stream: Some(name.clone()),
                                slice: None,
                                recoverable: false,
                            },
                            Some(emitter.encode(&state)?),
                        )))
                        .await?;

                    let Some(budget) = options.max_stream_failures else {
                        return Err(e);
                    };
                    stats.failed_streams.push(name.clone());
                    if budget.is_exceeded(stats.failed_streams.len()) {
                        return Err(Error::StreamFailures {
                            streams: stats.failed_streams,
                        });
                    }
                }
            }

            stats.streams.push(stream_stats);
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;

        if !stats.failed_streams.is_empty() {
            return Err(Error::StreamFailures {
                streams: stats.failed_streams,
            });
        }

        info!(
            records = stats.records(),
            slices = stats.slices(),
            duration_ms = stats.duration_ms,
            "Sync complete"
        );
        emitter
            .emit(Message::sync_status(SyncStatus::success(
                Some(emitter.encode(&state)?),
                stats.warnings.clone(),
            )))
            .await?;

        Ok(stats)
    }
}

/// Whether a stream that finished with failed slices still counts as synced
///
/// Requires a slice budget that was not exceeded and, when a ratio is set, a
/// failed share no larger than the ratio.
fn slice_failures_tolerated(options: &SyncOptions, failed: usize, total: usize) -> bool {
    match options.max_slice_failures {
        None => false,
        Some(budget) if budget.is_exceeded(failed) => false,
        Some(_) => options
            .max_slice_failure_ratio
            .map_or(true, |ratio| total > 0 && failed as f64 / total as f64 <= ratio),
    }
}

#[cfg(test)]
mod tests;
