//! Partition types and traits
//!
//! Defines the slice router abstraction and its YAML configuration.

use super::routers::{DatetimeRouter, ListRouter};
use crate::error::Result;
use crate::stream::{Slice, SliceStream};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

/// Produces the slices of a stream
pub trait SliceRouter: Send + Sync {
    /// Enumerate slices in read order
    fn slices(&self) -> Result<Vec<Slice>>;

    /// Name of the slice value that carries the partition
    fn partition_field(&self) -> &str;
}

/// Lazily yield a router's slices; an enumeration error becomes the only item
pub fn slice_stream<'a>(router: &dyn SliceRouter) -> SliceStream<'a> {
    match router.slices() {
        Ok(slices) => stream::iter(slices.into_iter().map(Ok)).boxed(),
        Err(e) => stream::iter(vec![Err(e)]).boxed(),
    }
}

/// Configuration for slice routing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartitionConfig {
    /// No partitioning
    #[default]
    None,

    /// Partition based on a static list
    List {
        /// List of values
        values: Vec<String>,
        /// Field name to use in slices
        partition_field: String,
    },

    /// Partition based on datetime windows
    Datetime {
        /// Start datetime
        start: String,
        /// End datetime (`now` when absent)
        #[serde(default)]
        end: Option<String>,
        /// Window size, e.g. `1d`, `12h`
        step: String,
        /// Output format for window bounds
        #[serde(default = "default_datetime_format")]
        format: String,
        /// Slice value name of the window start
        #[serde(default = "default_start_param")]
        start_param: String,
        /// Slice value name of the window end
        #[serde(default = "default_end_param")]
        end_param: String,
    },
}

fn default_datetime_format() -> String {
    "%Y-%m-%dT%H:%M:%SZ".to_string()
}

fn default_start_param() -> String {
    "start".to_string()
}

fn default_end_param() -> String {
    "end".to_string()
}

impl PartitionConfig {
    /// Whether the stream is unpartitioned
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Build the router; `None` for unpartitioned streams
    ///
    /// Datetime windows ending at or before `floor` are skipped.
    pub fn router(&self, floor: Option<DateTime<Utc>>) -> Result<Option<Box<dyn SliceRouter>>> {
        let router: Box<dyn SliceRouter> = match self {
            Self::None => return Ok(None),
            Self::List {
                values,
                partition_field,
            } => Box::new(ListRouter::new(values.clone(), partition_field.clone())),
            Self::Datetime {
                start,
                end,
                step,
                format,
                start_param,
                end_param,
            } => Box::new(DatetimeRouter::from_strings(
                start,
                end.as_deref().unwrap_or("now"),
                step,
                format.clone(),
                start_param.clone(),
                end_param.clone(),
            )?
            .with_floor(floor)),
        };
        Ok(Some(router))
    }
}
