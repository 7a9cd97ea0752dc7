//! JSON Lines file connector
//!
//! A declarative connector whose streams read newline-delimited JSON files.
//! Each stream names a path template; partitioned streams render one file
//! path per slice. Files are read lazily, one line per pull.

use crate::config::SyncOptions;
use crate::connector::{CheckResult, Connector, ConnectorSpec};
use crate::error::{Error, Result};
use crate::loader::{self, ConnectorDefinition, FileStreamDefinition};
use crate::partition::slice_stream;
use crate::state::{parse_cutoff, Cutoff, StreamState};
use crate::stream::{
    FieldPath, ReadRequest, Record, RecordStream, Slice, SliceStream, SourceStream,
    StreamDefinition,
};
use crate::template::{self, TemplateContext};
use crate::types::{JsonValue, SyncMode};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::debug;

/// Connector backed by JSON Lines files
#[derive(Debug, Clone)]
pub struct FileConnector {
    definition: ConnectorDefinition,
}

impl FileConnector {
    /// Create a connector from a parsed definition
    pub fn new(definition: ConnectorDefinition) -> Self {
        Self { definition }
    }

    /// Load a connector from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        loader::load_connector(path).map(Self::new)
    }

    /// Load a connector from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        loader::load_connector_from_str(yaml).map(Self::new)
    }

    /// The parsed definition
    pub fn definition(&self) -> &ConnectorDefinition {
        &self.definition
    }

    fn file_stream(&self, stream: &FileStreamDefinition, config: &JsonValue) -> FileStream {
        FileStream {
            definition: stream.to_definition(),
            source: stream.clone(),
            config: config.clone(),
            base_dir: self.definition.base_dir.clone(),
        }
    }
}

#[async_trait]
impl Connector for FileConnector {
    fn spec(&self) -> ConnectorSpec {
        ConnectorSpec {
            name: self.definition.name.clone(),
            title: self
                .definition
                .title
                .clone()
                .unwrap_or_else(|| self.definition.name.clone()),
            description: self.definition.description.clone(),
            spec: self.definition.spec.clone(),
            documentation_url: self.definition.documentation_url.clone(),
        }
    }

    async fn check(&self, config: &JsonValue) -> Result<CheckResult> {
        let missing_properties: Vec<&str> = self
            .definition
            .spec
            .properties
            .iter()
            .filter(|(name, property)| property.required && config.get(name.as_str()).is_none())
            .map(|(name, _)| name.as_str())
            .collect();
        if !missing_properties.is_empty() {
            return Ok(CheckResult::failure(format!(
                "Missing required configuration: {}",
                missing_properties.join(", ")
            )));
        }

        let mut missing_files = Vec::new();
        for stream in &self.definition.streams {
            let source = self.file_stream(stream, config);
            let slices = match stream.partition.router(None) {
                Ok(Some(router)) => router.slices(),
                Ok(None) => Ok(vec![Slice::unkeyed()]),
                Err(e) => Err(e),
            };
            let slices = match slices {
                Ok(slices) => slices,
                Err(e) => {
                    return Ok(CheckResult::failure(format!(
                        "Stream '{}': {e}",
                        stream.name
                    )))
                }
            };

            for slice in &slices {
                let path = match source.resolve_path(slice) {
                    Ok(path) => path,
                    Err(e) => {
                        return Ok(CheckResult::failure(format!(
                            "Stream '{}': {e}",
                            stream.name
                        )))
                    }
                };
                if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    missing_files.push(path.display().to_string());
                }
            }
        }

        if missing_files.is_empty() {
            Ok(CheckResult::success())
        } else {
            Ok(CheckResult::failure(format!(
                "Missing data file(s): {}",
                missing_files.join(", ")
            )))
        }
    }

    fn streams(&self, config: &JsonValue) -> Result<Vec<Box<dyn SourceStream>>> {
        Ok(self
            .definition
            .streams
            .iter()
            .map(|stream| Box::new(self.file_stream(stream, config)) as Box<dyn SourceStream>)
            .collect())
    }
}

// ============================================================================
// File Stream
// ============================================================================

/// One declared stream bound to a configuration
#[derive(Debug, Clone)]
pub struct FileStream {
    definition: StreamDefinition,
    source: FileStreamDefinition,
    config: JsonValue,
    base_dir: Option<PathBuf>,
}

impl FileStream {
    /// Render the file path of a slice
    pub fn resolve_path(&self, slice: &Slice) -> Result<PathBuf> {
        let ctx = TemplateContext::new(&self.config).with_slice(slice);
        let rendered = PathBuf::from(template::render(&self.source.path, &ctx)?);

        Ok(match &self.base_dir {
            Some(base) if rendered.is_relative() => base.join(rendered),
            _ => rendered,
        })
    }

    fn lag_days(&self) -> u32 {
        SyncOptions::from_config(&self.config)
            .map(|options| options.cutoff_lag_days)
            .unwrap_or_default()
    }
}

impl SourceStream for FileStream {
    fn definition(&self) -> &StreamDefinition {
        &self.definition
    }

    fn stream_slices(&self, mode: SyncMode, state: Option<StreamState>) -> SliceStream<'_> {
        // Skip datetime windows older than every lag-adjusted stored cutoff
        let floor = match mode {
            SyncMode::Incremental => state
                .as_ref()
                .and_then(|state| state.iter().map(|(_, cutoff)| *cutoff).min())
                .map(|cutoff| cutoff.minus_days(self.lag_days()))
                .and_then(Cutoff::to_datetime),
            SyncMode::FullRefresh => None,
        };

        match self.source.partition.router(floor) {
            Ok(Some(router)) => slice_stream(router.as_ref()),
            Ok(None) => stream::iter(vec![Ok(Slice::unkeyed())]).boxed(),
            Err(e) => stream::iter(vec![Err(e)]).boxed(),
        }
    }

    fn read_records<'a>(&'a self, slice: &'a Slice, request: ReadRequest) -> RecordStream<'a> {
        let path = match self.resolve_path(slice) {
            Ok(path) => path,
            Err(e) => return stream::iter(vec![Err(e)]).boxed(),
        };
        debug!(stream = %self.definition.name, path = %path.display(), "Reading file");

        let reader = LineReader {
            path,
            lines: None,
            line_no: 0,
            done: false,
            cursor_field: self.definition.cursor_field.as_ref(),
            cutoff: request.cutoff.map(Cutoff::from_datetime),
        };

        stream::unfold(reader, |mut reader| async move {
            let item = reader.next_record().await?;
            Some((item, reader))
        })
        .boxed()
    }
}

// ============================================================================
// Line Reader
// ============================================================================

/// Pulls records from a JSON Lines file one line at a time
struct LineReader<'a> {
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
    line_no: usize,
    done: bool,
    cursor_field: Option<&'a FieldPath>,
    /// Records at or before this cutoff are skipped
    cutoff: Option<Cutoff>,
}

impl LineReader<'_> {
    async fn next_record(&mut self) -> Option<Result<Record>> {
        if self.done {
            return None;
        }

        if self.lines.is_none() {
            match File::open(&self.path).await {
                Ok(file) => self.lines = Some(BufReader::new(file).lines()),
                Err(e) => {
                    self.done = true;
                    return Some(Err(if e.kind() == std::io::ErrorKind::NotFound {
                        Error::recoverable(format!("File not found: {}", self.path.display()))
                    } else {
                        Error::source(format!("Failed to open {}: {e}", self.path.display()))
                    }));
                }
            }
        }

        loop {
            let next = match self.lines.as_mut() {
                Some(lines) => lines.next_line().await,
                None => Ok(None),
            };
            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(Error::source(format!(
                        "Failed to read {}: {e}",
                        self.path.display()
                    ))));
                }
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            let record: Record = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    self.done = true;
                    return Some(Err(Error::source(format!(
                        "Malformed record at {}:{}: {e}",
                        self.path.display(),
                        self.line_no
                    ))));
                }
            };

            if self.is_before_cutoff(&record) {
                continue;
            }
            return Some(Ok(record));
        }
    }

    fn is_before_cutoff(&self, record: &Record) -> bool {
        let Some(cutoff) = self.cutoff else {
            return false;
        };
        self.cursor_field
            .and_then(|field| field.resolve(record))
            .and_then(parse_cutoff)
            .is_some_and(|latest| latest <= cutoff)
    }
}
