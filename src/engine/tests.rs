//! Tests for the engine module

use super::*;
use crate::config::{CatalogStream, ConfiguredStream, PropertyConfig, SpecConfig};
use crate::connector::{CheckResult, ConnectorSpec};
use crate::protocol::{RecordMessage, SyncStatusKind};
use crate::state::{Cutoff, StreamState, SyncState};
use crate::stream::{ReadRequest, Record, RecordStream, Slice, SliceStream};
use crate::types::SyncMode;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const BASE_MS: i64 = 1_704_067_200_000;
const DAY_MS: i64 = 86_400_000;

// ============================================================================
// Test Sources
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Failure {
    Recoverable,
    Source,
    Panic,
}

#[derive(Debug, Clone, Default)]
struct Outcome {
    records: Vec<JsonValue>,
    failure: Option<Failure>,
}

#[derive(Clone)]
struct MockStream {
    definition: StreamDefinition,
    slices: std::result::Result<Vec<Slice>, String>,
    outcomes: HashMap<String, Outcome>,
    requests: Arc<Mutex<Vec<(String, ReadRequest)>>>,
}

impl MockStream {
    /// `slices` keyed slices `s1..`, each with `per_slice` records
    fn sliced(name: &str, slices: usize, per_slice: usize) -> Self {
        let mut outcomes = HashMap::new();
        let keys: Vec<Slice> = (1..=slices)
            .map(|n| {
                let key = format!("s{n}");
                outcomes.insert(
                    key.clone(),
                    Outcome {
                        records: (0..per_slice)
                            .map(|i| json!({"id": format!("{key}-{i}"), "updated_at": BASE_MS + i as i64 * 1000}))
                            .collect(),
                        failure: None,
                    },
                );
                Slice::new(key)
            })
            .collect();

        Self {
            definition: StreamDefinition::new(name).with_cursor_field("updated_at"),
            slices: Ok(keys),
            outcomes,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A single unkeyed slice with `records` records
    fn unsliced(name: &str, records: usize) -> Self {
        let mut stream = Self::sliced(name, 0, 0);
        stream.slices = Ok(vec![Slice::unkeyed()]);
        stream.outcomes.insert(
            Slice::unkeyed().label(),
            Outcome {
                records: (0..records)
                    .map(|i| json!({"id": i, "updated_at": BASE_MS + i as i64 * 1000}))
                    .collect(),
                failure: None,
            },
        );
        stream
    }

    fn failing(mut self, slice: &str, failure: Failure) -> Self {
        self.outcomes.entry(slice.to_string()).or_default().failure = Some(failure);
        self
    }

    fn without_cursor(mut self) -> Self {
        self.definition.cursor_field = None;
        self
    }

    fn with_definition(mut self, f: impl FnOnce(StreamDefinition) -> StreamDefinition) -> Self {
        self.definition = f(self.definition);
        self
    }

    fn requests(&self) -> Vec<(String, ReadRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

impl SourceStream for MockStream {
    fn definition(&self) -> &StreamDefinition {
        &self.definition
    }

    fn stream_slices(&self, _mode: SyncMode, _state: Option<StreamState>) -> SliceStream<'_> {
        match &self.slices {
            Ok(slices) => stream::iter(slices.clone().into_iter().map(Ok)).boxed(),
            Err(message) => stream::iter(vec![Err(Error::source(message.clone()))]).boxed(),
        }
    }

    fn read_records<'a>(&'a self, slice: &'a Slice, request: ReadRequest) -> RecordStream<'a> {
        self.requests
            .lock()
            .unwrap()
            .push((slice.label(), request));

        let outcome = self.outcomes.get(&slice.label()).cloned().unwrap_or_default();
        let mut items: Vec<Result<Record>> = outcome.records.into_iter().map(Ok).collect();
        match outcome.failure {
            Some(Failure::Recoverable) => items.push(Err(Error::recoverable("rate limited"))),
            Some(Failure::Source) => items.push(Err(Error::source("connection reset"))),
            Some(Failure::Panic) => panic!("source crashed"),
            None => {}
        }
        stream::iter(items).boxed()
    }
}

struct MockConnector {
    streams: Vec<MockStream>,
}

impl MockConnector {
    fn new(streams: Vec<MockStream>) -> Arc<Self> {
        Arc::new(Self { streams })
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn spec(&self) -> ConnectorSpec {
        let mut spec = SpecConfig::default();
        spec.properties.insert(
            "token".to_string(),
            PropertyConfig {
                secret: true,
                ..PropertyConfig::default()
            },
        );
        ConnectorSpec {
            name: "mock".to_string(),
            title: "Mock".to_string(),
            description: None,
            spec,
            documentation_url: None,
        }
    }

    async fn check(&self, _config: &JsonValue) -> Result<CheckResult> {
        Ok(CheckResult::success())
    }

    fn streams(&self, _config: &JsonValue) -> Result<Vec<Box<dyn SourceStream>>> {
        Ok(self
            .streams
            .iter()
            .cloned()
            .map(|s| Box::new(s) as Box<dyn SourceStream>)
            .collect())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn catalog(streams: &[(&str, SyncMode)]) -> ConfiguredCatalog {
    ConfiguredCatalog {
        streams: streams
            .iter()
            .map(|(name, mode)| ConfiguredStream::new(CatalogStream::new(*name), *mode))
            .collect(),
    }
}

async fn run_sync(
    connector: Arc<MockConnector>,
    config: JsonValue,
    catalog: ConfiguredCatalog,
    state: Option<JsonValue>,
) -> (Vec<Message>, Option<Error>) {
    let engine = SyncEngine::new(connector);
    let mut stream = engine.read(config, catalog, state);

    let mut messages = Vec::new();
    let mut error = None;
    while let Some(item) = stream.next().await {
        match item {
            Ok(message) => messages.push(message),
            Err(e) => {
                assert!(error.is_none(), "only one terminal error");
                error = Some(e);
            }
        }
    }
    (messages, error)
}

fn records(messages: &[Message]) -> Vec<&RecordMessage> {
    messages.iter().filter_map(Message::as_record).collect()
}

fn states(messages: &[Message]) -> Vec<&JsonValue> {
    messages.iter().filter_map(Message::as_state).collect()
}

fn sync_statuses(messages: &[Message]) -> Vec<&SyncStatus> {
    messages.iter().filter_map(Message::as_sync_status).collect()
}

fn stream_statuses(messages: &[Message]) -> Vec<(String, StreamStatus)> {
    messages
        .iter()
        .filter_map(Message::as_stream_status)
        .map(|s| (s.stream.clone(), s.status))
        .collect()
}

fn final_status(messages: &[Message]) -> Option<&SyncStatus> {
    sync_statuses(messages)
        .into_iter()
        .rev()
        .find(|s| s.status == SyncStatusKind::Success)
}

fn last_state(messages: &[Message]) -> SyncState {
    codec::decode(states(messages).last().map(|s| (*s).clone())).unwrap()
}

// ============================================================================
// Happy Path
// ============================================================================

#[tokio::test]
async fn test_all_slices_succeed() {
    let connector = MockConnector::new(vec![MockStream::sliced("commits", 5, 10)]);

    let (messages, error) = run_sync(
        connector,
        json!({}),
        catalog(&[("commits", SyncMode::Incremental)]),
        None,
    )
    .await;

    assert!(error.is_none());
    assert_eq!(records(&messages).len(), 50);
    assert!(states(&messages).len() >= 5);

    let state = last_state(&messages);
    let commits = state.get_stream("commits").unwrap();
    assert_eq!(commits.len(), 5);
    assert_eq!(commits.get("s3"), Some(Cutoff::from_millis(BASE_MS + 9000)));

    let status = final_status(&messages).unwrap();
    assert!(status.warnings.is_empty());
    assert_eq!(codec::decode(status.state.clone()).unwrap(), state);

    assert_eq!(
        stream_statuses(&messages),
        vec![
            ("commits".to_string(), StreamStatus::Started),
            ("commits".to_string(), StreamStatus::Complete),
        ]
    );
}

#[tokio::test]
async fn test_source_config_signal_comes_first_and_is_redacted() {
    let connector = MockConnector::new(vec![MockStream::unsliced("users", 1)]);
    let prior = json!({"users": {"users": {"cutoff": 5}}});

    let (messages, _) = run_sync(
        connector,
        json!({"token": "s3cr3t", "max_slice_failures": 2}),
        catalog(&[("users", SyncMode::Incremental)]),
        Some(prior.clone()),
    )
    .await;

    let Message::Trace { trace } = &messages[0] else {
        panic!("expected a trace first, got {:?}", messages[0]);
    };
    let source_config = trace.source_config.as_ref().unwrap();
    assert_eq!(source_config.config["token"], "REDACTED");
    assert_eq!(source_config.config["max_slice_failures"], 2);
    assert_eq!(source_config.state, Some(prior));
}

#[tokio::test]
async fn test_zero_slices_completes() {
    let connector = MockConnector::new(vec![MockStream::sliced("commits", 0, 0)]);

    let (messages, error) = run_sync(
        connector,
        json!({}),
        catalog(&[("commits", SyncMode::Incremental)]),
        None,
    )
    .await;

    assert!(error.is_none());
    assert!(records(&messages).is_empty());
    assert!(states(&messages).is_empty());
    assert!(final_status(&messages).is_some());
}

// ============================================================================
// Slice Failure Policy
// ============================================================================

// Without a budget the first unmarked failure rethrows at once, so the
// aggregate names only that slice. Naming every failed slice needs a budget
// (see test_unlimited_budget_with_zero_ratio_names_every_failed_slice).
#[tokio::test]
async fn test_no_budget_aborts_on_first_failure() {
    let stream = MockStream::sliced("commits", 5, 10)
        .failing("s2", Failure::Source)
        .failing("s4", Failure::Source);
    let requests = Arc::clone(&stream.requests);
    let connector = MockConnector::new(vec![stream]);

    let (messages, error) = run_sync(
        connector,
        json!({}),
        catalog(&[("commits", SyncMode::Incremental)]),
        None,
    )
    .await;

    match error {
        Some(Error::SliceFailures { stream, slices, .. }) => {
            assert_eq!(stream, "commits");
            assert_eq!(slices, vec!["s2"]);
        }
        other => panic!("expected SliceFailures, got {other:?}"),
    }

    // s1 fully and s2 up to its failure; nothing after
    assert_eq!(records(&messages).len(), 20);
    assert_eq!(requests.lock().unwrap().len(), 2);
    assert!(final_status(&messages).is_none());

    let errored: Vec<_> = sync_statuses(&messages)
        .into_iter()
        .filter(|s| s.status == SyncStatusKind::Errored)
        .collect();
    assert_eq!(errored.len(), 1);
    assert_eq!(
        errored[0].error.as_ref().unwrap().stream.as_deref(),
        Some("commits")
    );
    assert_eq!(
        stream_statuses(&messages).last(),
        Some(&("commits".to_string(), StreamStatus::Incomplete))
    );
}

#[tokio::test]
async fn test_budget_tolerates_failures() {
    let connector = MockConnector::new(vec![MockStream::sliced("commits", 5, 10)
        .failing("s2", Failure::Source)
        .failing("s4", Failure::Source)]);

    let (messages, error) = run_sync(
        connector,
        json!({"max_slice_failures": 3}),
        catalog(&[("commits", SyncMode::Incremental)]),
        None,
    )
    .await;

    assert!(error.is_none(), "unexpected error: {error:?}");
    assert_eq!(records(&messages).len(), 50);

    let failures: Vec<_> = sync_statuses(&messages)
        .into_iter()
        .filter(|s| s.status == SyncStatusKind::Running)
        .filter_map(|s| s.error.as_ref())
        .collect();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].slice.as_deref(), Some("s2"));
    assert_eq!(failures[1].slice.as_deref(), Some("s4"));
    assert!(failures.iter().all(|f| !f.recoverable));

    let status = final_status(&messages).unwrap();
    assert_eq!(status.warnings.len(), 1);
    assert!(status.warnings[0].contains("s2, s4"));
    assert_eq!(
        stream_statuses(&messages).last(),
        Some(&("commits".to_string(), StreamStatus::Complete))
    );
}

#[tokio::test]
async fn test_unlimited_budget_with_zero_ratio_names_every_failed_slice() {
    let connector = MockConnector::new(vec![MockStream::sliced("commits", 5, 10)
        .failing("s2", Failure::Source)
        .failing("s4", Failure::Source)]);

    let (messages, error) = run_sync(
        connector,
        json!({"max_slice_failures": -1, "max_slice_failure_ratio": 0.0}),
        catalog(&[("commits", SyncMode::Incremental)]),
        None,
    )
    .await;

    match error {
        Some(Error::SliceFailures { slices, total, .. }) => {
            assert_eq!(slices, vec!["s2", "s4"]);
            assert_eq!(total, 5);
        }
        other => panic!("expected SliceFailures, got {other:?}"),
    }
    assert_eq!(records(&messages).len(), 50);
}

#[tokio::test]
async fn test_ratio_threshold_is_inclusive_of_equal_share() {
    // 2 of 5 = 0.4 failed
    for (ratio, should_fail) in [(0.4, false), (0.5, false), (0.3, true)] {
        let connector = MockConnector::new(vec![MockStream::sliced("commits", 5, 1)
            .failing("s1", Failure::Source)
            .failing("s5", Failure::Source)]);

        let (_, error) = run_sync(
            connector,
            json!({"max_slice_failures": -1, "max_slice_failure_ratio": ratio}),
            catalog(&[("commits", SyncMode::Incremental)]),
            None,
        )
        .await;

        assert_eq!(error.is_some(), should_fail, "ratio {ratio}");
    }
}

#[tokio::test]
async fn test_exceeding_slice_budget_aborts_stream() {
    let stream = MockStream::sliced("commits", 5, 10)
        .failing("s2", Failure::Source)
        .failing("s3", Failure::Source);
    let requests = Arc::clone(&stream.requests);
    let connector = MockConnector::new(vec![stream]);

    let (messages, error) = run_sync(
        connector,
        json!({"max_slice_failures": 1}),
        catalog(&[("commits", SyncMode::Incremental)]),
        None,
    )
    .await;

    match error {
        Some(Error::SliceFailures { slices, .. }) => assert_eq!(slices, vec!["s2", "s3"]),
        other => panic!("expected SliceFailures, got {other:?}"),
    }
    assert_eq!(requests.lock().unwrap().len(), 3);
    assert_eq!(records(&messages).len(), 30);
}

#[tokio::test]
async fn test_recoverable_error_skips_slice() {
    let connector = MockConnector::new(vec![
        MockStream::sliced("commits", 3, 4).failing("s2", Failure::Recoverable)
    ]);

    let (messages, error) = run_sync(
        connector,
        json!({}),
        catalog(&[("commits", SyncMode::Incremental)]),
        None,
    )
    .await;

    assert!(error.is_none());
    assert_eq!(records(&messages).len(), 12);

    let skipped: Vec<_> = sync_statuses(&messages)
        .into_iter()
        .filter_map(|s| s.error.as_ref())
        .collect();
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0].recoverable);
    assert_eq!(skipped[0].slice.as_deref(), Some("s2"));
    assert!(final_status(&messages).unwrap().warnings.is_empty());
}

#[tokio::test]
async fn test_slice_enumeration_failure_is_fatal() {
    let mut stream = MockStream::sliced("commits", 0, 0);
    stream.slices = Err("cannot list repositories".to_string());
    let connector = MockConnector::new(vec![stream]);

    let (messages, error) = run_sync(
        connector,
        json!({"max_slice_failures": 10}),
        catalog(&[("commits", SyncMode::Incremental)]),
        None,
    )
    .await;

    match error {
        Some(Error::SliceEnumeration { stream, message }) => {
            assert_eq!(stream, "commits");
            assert!(message.contains("cannot list repositories"));
        }
        other => panic!("expected SliceEnumeration, got {other:?}"),
    }
    assert!(records(&messages).is_empty());
    assert_eq!(
        sync_statuses(&messages)
            .iter()
            .filter(|s| s.status == SyncStatusKind::Errored)
            .count(),
        1
    );
}

// ============================================================================
// Checkpoints and State
// ============================================================================

#[tokio::test]
async fn test_checkpoint_interval() {
    let connector = MockConnector::new(vec![
        MockStream::unsliced("users", 5).with_definition(|d| d.with_checkpoint_interval(2))
    ]);

    let (messages, error) = run_sync(
        connector,
        json!({}),
        catalog(&[("users", SyncMode::Incremental)]),
        None,
    )
    .await;

    assert!(error.is_none());
    // After records 2 and 4, then at the end of the slice
    assert_eq!(states(&messages).len(), 3);

    let kinds: Vec<&str> = messages
        .iter()
        .filter_map(|m| match m {
            Message::Record { .. } => Some("R"),
            Message::State { .. } => Some("S"),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, vec!["R", "R", "S", "R", "R", "S", "R", "S"]);
}

#[tokio::test]
async fn test_checkpoint_carries_full_state() {
    let prior = json!({"other": {"other": {"cutoff": 42}}});
    let connector = MockConnector::new(vec![MockStream::unsliced("users", 2)]);

    let (messages, _) = run_sync(
        connector,
        json!({}),
        catalog(&[("users", SyncMode::Incremental)]),
        Some(prior),
    )
    .await;

    let state = last_state(&messages);
    assert_eq!(state.get_cutoff("other", "other"), Some(Cutoff::from_millis(42)));
    assert_eq!(
        state.get_cutoff("users", "users"),
        Some(Cutoff::from_millis(BASE_MS + 1000))
    );
}

#[tokio::test]
async fn test_incremental_request_uses_lagged_cutoff() {
    let stream = MockStream::sliced("commits", 2, 1);
    let requests = Arc::clone(&stream.requests);
    let connector = MockConnector::new(vec![stream]);

    let mut prior = SyncState::new();
    prior
        .get_stream_mut("commits")
        .set("s1", Cutoff::from_millis(BASE_MS + 10 * DAY_MS));

    let (messages, error) = run_sync(
        connector,
        json!({"cutoff_lag_days": 2}),
        catalog(&[("commits", SyncMode::Incremental)]),
        Some(codec::encode(&prior, false).unwrap()),
    )
    .await;

    assert!(error.is_none());
    let requests = requests.lock().unwrap().clone();
    assert_eq!(requests[0].1.mode, SyncMode::Incremental);
    assert_eq!(
        requests[0].1.cutoff,
        Cutoff::from_millis(BASE_MS + 8 * DAY_MS).to_datetime()
    );
    assert_eq!(requests[1].1.cutoff, None);

    // The older record does not move s1 back; s2 gets its first cutoff
    let state = last_state(&messages);
    assert_eq!(
        state.get_cutoff("commits", "s1"),
        Some(Cutoff::from_millis(BASE_MS + 10 * DAY_MS))
    );
    assert_eq!(state.get_cutoff("commits", "s2"), Some(Cutoff::from_millis(BASE_MS)));
}

#[tokio::test]
async fn test_full_refresh_leaves_state_untouched() {
    let stream = MockStream::unsliced("users", 3);
    let requests = Arc::clone(&stream.requests);
    let connector = MockConnector::new(vec![stream]);
    let prior = json!({"users": {"users": {"cutoff": 7}}});

    let (messages, error) = run_sync(
        connector,
        json!({}),
        catalog(&[("users", SyncMode::FullRefresh)]),
        Some(prior),
    )
    .await;

    assert!(error.is_none());
    assert_eq!(requests.lock().unwrap()[0].1, ReadRequest::full_refresh());
    assert_eq!(states(&messages).len(), 1);
    assert_eq!(
        last_state(&messages).get_cutoff("users", "users"),
        Some(Cutoff::from_millis(7))
    );
}

#[tokio::test]
async fn test_incremental_falls_back_without_cursor() {
    let stream = MockStream::unsliced("users", 1).without_cursor();
    let requests = Arc::clone(&stream.requests);
    let connector = MockConnector::new(vec![stream]);

    let (_, error) = run_sync(
        connector,
        json!({}),
        catalog(&[("users", SyncMode::Incremental)]),
        None,
    )
    .await;

    assert!(error.is_none());
    assert_eq!(requests.lock().unwrap()[0].1.mode, SyncMode::FullRefresh);
}

#[tokio::test]
async fn test_backfill_reads_everything_without_checkpoints() {
    let stream =
        MockStream::sliced("commits", 2, 3).with_definition(|d| d.with_checkpoint_interval(2));
    let requests = Arc::clone(&stream.requests);
    let connector = MockConnector::new(vec![stream]);
    let prior = json!({"commits": {"s1": {"cutoff": BASE_MS + DAY_MS}}});

    let (messages, error) = run_sync(
        connector,
        json!({"backfill": true}),
        catalog(&[("commits", SyncMode::Incremental)]),
        Some(prior.clone()),
    )
    .await;

    assert!(error.is_none());
    assert_eq!(records(&messages).len(), 6);
    assert!(states(&messages).is_empty());
    assert!(requests
        .lock()
        .unwrap()
        .iter()
        .all(|(_, r)| *r == ReadRequest::full_refresh()));

    // The final status still reports the untouched prior state
    let status = final_status(&messages).unwrap();
    assert_eq!(status.state, Some(prior));
}

#[tokio::test]
async fn test_compressed_state() {
    let connector = MockConnector::new(vec![MockStream::unsliced("users", 2)]);

    let (messages, error) = run_sync(
        connector,
        json!({"compress_state": true}),
        catalog(&[("users", SyncMode::Incremental)]),
        None,
    )
    .await;

    assert!(error.is_none());
    let blob = states(&messages)[0];
    assert!(codec::is_compressed(blob));
    assert_eq!(
        last_state(&messages).get_cutoff("users", "users"),
        Some(Cutoff::from_millis(BASE_MS + 1000))
    );
}

#[tokio::test]
async fn test_invalid_prior_state_aborts() {
    let connector = MockConnector::new(vec![MockStream::unsliced("users", 1)]);

    let (messages, error) = run_sync(
        connector,
        json!({}),
        catalog(&[("users", SyncMode::Incremental)]),
        Some(json!({"users": "garbage"})),
    )
    .await;

    assert!(matches!(error, Some(Error::State { .. })));
    assert!(messages.is_empty());
}

// ============================================================================
// Streams and Ordering
// ============================================================================

#[tokio::test]
async fn test_dependencies_run_first() {
    let connector = MockConnector::new(vec![
        MockStream::unsliced("commits", 1).with_definition(|d| d.depends_on("repositories")),
        MockStream::unsliced("repositories", 1),
    ]);

    let (messages, error) = run_sync(
        connector,
        json!({}),
        catalog(&[
            ("commits", SyncMode::Incremental),
            ("repositories", SyncMode::Incremental),
        ]),
        None,
    )
    .await;

    assert!(error.is_none());
    let order: Vec<_> = records(&messages).iter().map(|r| r.stream.clone()).collect();
    assert_eq!(order, vec!["repositories", "commits"]);
}

#[tokio::test]
async fn test_unknown_stream_fails_before_reading() {
    let connector = MockConnector::new(vec![MockStream::unsliced("users", 1)]);

    let (messages, error) = run_sync(
        connector,
        json!({}),
        catalog(&[("users", SyncMode::Incremental), ("ghosts", SyncMode::Incremental)]),
        None,
    )
    .await;

    match error {
        Some(Error::UnknownStreams { unknown, known }) => {
            assert_eq!(unknown, vec!["ghosts"]);
            assert_eq!(known, vec!["users"]);
        }
        other => panic!("expected UnknownStreams, got {other:?}"),
    }
    assert!(records(&messages).is_empty());
}

#[tokio::test]
async fn test_invalid_options_fail_before_any_message() {
    let connector = MockConnector::new(vec![MockStream::unsliced("users", 1)]);

    let (messages, error) = run_sync(
        connector,
        json!({"max_slice_failure_ratio": 1.5}),
        catalog(&[("users", SyncMode::Incremental)]),
        None,
    )
    .await;

    assert!(error.unwrap().is_config());
    assert!(messages.is_empty());
}

#[tokio::test]
async fn test_stream_failure_without_budget_stops_sync() {
    let connector = MockConnector::new(vec![
        MockStream::unsliced("users", 1).failing("<unsliced>", Failure::Source),
        MockStream::unsliced("orders", 1),
    ]);

    let (messages, error) = run_sync(
        connector,
        json!({}),
        catalog(&[("users", SyncMode::Incremental), ("orders", SyncMode::Incremental)]),
        None,
    )
    .await;

    assert!(matches!(error, Some(Error::SliceFailures { .. })));
    assert!(records(&messages).iter().all(|r| r.stream == "users"));
}

#[tokio::test]
async fn test_stream_budget_runs_remaining_streams() {
    let connector = MockConnector::new(vec![
        MockStream::unsliced("users", 1).failing("<unsliced>", Failure::Source),
        MockStream::unsliced("orders", 2),
    ]);

    let (messages, error) = run_sync(
        connector,
        json!({"max_stream_failures": 1}),
        catalog(&[("users", SyncMode::Incremental), ("orders", SyncMode::Incremental)]),
        None,
    )
    .await;

    match error {
        Some(Error::StreamFailures { streams }) => assert_eq!(streams, vec!["users"]),
        other => panic!("expected StreamFailures, got {other:?}"),
    }
    assert_eq!(
        records(&messages)
            .iter()
            .filter(|r| r.stream == "orders")
            .count(),
        2
    );
    assert_eq!(
        stream_statuses(&messages),
        vec![
            ("users".to_string(), StreamStatus::Started),
            ("users".to_string(), StreamStatus::Incomplete),
            ("orders".to_string(), StreamStatus::Started),
            ("orders".to_string(), StreamStatus::Complete),
        ]
    );
    assert!(final_status(&messages).is_none());
}

#[tokio::test]
async fn test_exceeding_stream_budget_aborts() {
    let connector = MockConnector::new(vec![
        MockStream::unsliced("a", 1).failing("<unsliced>", Failure::Source),
        MockStream::unsliced("b", 1).failing("<unsliced>", Failure::Source),
        MockStream::unsliced("c", 1),
    ]);

    let (messages, error) = run_sync(
        connector,
        json!({"max_stream_failures": 1}),
        catalog(&[
            ("a", SyncMode::Incremental),
            ("b", SyncMode::Incremental),
            ("c", SyncMode::Incremental),
        ]),
        None,
    )
    .await;

    match error {
        Some(Error::StreamFailures { streams }) => assert_eq!(streams, vec!["a", "b"]),
        other => panic!("expected StreamFailures, got {other:?}"),
    }
    assert!(records(&messages).iter().all(|r| r.stream != "c"));
}

// ============================================================================
// Cancellation
// ============================================================================

struct Released(Arc<AtomicBool>);

impl Drop for Released {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct EndlessStream {
    definition: StreamDefinition,
    pulled: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl SourceStream for EndlessStream {
    fn definition(&self) -> &StreamDefinition {
        &self.definition
    }

    fn read_records<'a>(&'a self, _slice: &'a Slice, _request: ReadRequest) -> RecordStream<'a> {
        let guard = Released(Arc::clone(&self.released));
        let pulled = Arc::clone(&self.pulled);
        stream::iter(0..)
            .map(move |i: u64| {
                let _held = &guard;
                pulled.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"id": i}))
            })
            .boxed()
    }
}

struct EndlessConnector {
    pulled: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

#[async_trait]
impl Connector for EndlessConnector {
    fn spec(&self) -> ConnectorSpec {
        ConnectorSpec {
            name: "endless".to_string(),
            title: "Endless".to_string(),
            description: None,
            spec: SpecConfig::default(),
            documentation_url: None,
        }
    }

    async fn check(&self, _config: &JsonValue) -> Result<CheckResult> {
        Ok(CheckResult::success())
    }

    fn streams(&self, _config: &JsonValue) -> Result<Vec<Box<dyn SourceStream>>> {
        Ok(vec![Box::new(EndlessStream {
            definition: StreamDefinition::new("events"),
            pulled: Arc::clone(&self.pulled),
            released: Arc::clone(&self.released),
        })])
    }
}

#[tokio::test]
async fn test_dropping_output_cancels_sync_and_releases_source() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let released = Arc::new(AtomicBool::new(false));
    let engine = SyncEngine::new(Arc::new(EndlessConnector {
        pulled: Arc::clone(&pulled),
        released: Arc::clone(&released),
    }));

    let mut output = engine.read(
        json!({}),
        catalog(&[("events", SyncMode::FullRefresh)]),
        None,
    );

    let mut seen = 0;
    while seen < 10 {
        let message = output.next().await.unwrap().unwrap();
        if message.is_record() {
            seen += 1;
        }
    }
    drop(output);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !released.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("record source was not released");

    // Only a bounded number of records were produced ahead of the consumer
    assert!(pulled.load(Ordering::SeqCst) <= seen + 3);
}

#[tokio::test]
async fn test_panicking_source_ends_output_with_error() {
    let connector = MockConnector::new(vec![
        MockStream::sliced("commits", 2, 3).failing("s2", Failure::Panic)
    ]);

    let (messages, error) = run_sync(
        connector,
        json!({}),
        catalog(&[("commits", SyncMode::Incremental)]),
        None,
    )
    .await;

    assert_eq!(records(&messages).len(), 3);
    assert!(final_status(&messages).is_none());
    match error {
        Some(Error::Other(message)) => assert!(message.contains("panicked")),
        other => panic!("expected an aborted sync, got {other:?}"),
    }
}

// ============================================================================
// Unit Helpers
// ============================================================================

#[test]
fn test_effective_mode() {
    assert_eq!(
        effective_mode(SyncMode::Incremental, true, false),
        SyncMode::Incremental
    );
    assert_eq!(
        effective_mode(SyncMode::Incremental, false, false),
        SyncMode::FullRefresh
    );
    assert_eq!(
        effective_mode(SyncMode::Incremental, true, true),
        SyncMode::FullRefresh
    );
    assert_eq!(
        effective_mode(SyncMode::FullRefresh, true, false),
        SyncMode::FullRefresh
    );
}

#[test]
fn test_slice_failures_tolerated() {
    use crate::config::FailureBudget;

    let none = SyncOptions::new();
    assert!(!slice_failures_tolerated(&none, 1, 5));

    let limited = SyncOptions::new().with_max_slice_failures(FailureBudget::Limited(2));
    assert!(slice_failures_tolerated(&limited, 2, 5));
    assert!(!slice_failures_tolerated(&limited, 3, 5));

    let ratio = SyncOptions::new()
        .with_max_slice_failures(FailureBudget::Unlimited)
        .with_max_slice_failure_ratio(0.5);
    assert!(slice_failures_tolerated(&ratio, 1, 2));
    assert!(!slice_failures_tolerated(&ratio, 2, 3));
}

#[tokio::test]
async fn test_run_returns_stats() {
    let connector = MockConnector::new(vec![
        MockStream::sliced("commits", 3, 2).failing("s3", Failure::Recoverable)
    ]);
    let engine = SyncEngine::new(connector);
    let (tx, mut rx) = mpsc::channel(1024);

    let stats = engine
        .run(
            &json!({}),
            &catalog(&[("commits", SyncMode::Incremental)]),
            None,
            tx,
        )
        .await
        .unwrap();

    assert_eq!(stats.records(), 6);
    assert_eq!(stats.slices(), 3);
    assert_eq!(stats.streams[0].skipped_slices, 1);
    assert_eq!(stats.streams[0].checkpoints, 2);
    assert!(stats.failed_streams.is_empty());

    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    assert!(count > 6);
}
