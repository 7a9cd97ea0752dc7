//! Slice router implementations
//!
//! Each router handles a specific partitioning strategy.

use super::types::SliceRouter;
use crate::error::{Error, Result};
use crate::stream::Slice;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

// ============================================================================
// List Router
// ============================================================================

/// List-based slice router
///
/// Creates one slice per value, keyed by the value itself.
#[derive(Debug, Clone)]
pub struct ListRouter {
    /// List of partition values
    values: Vec<String>,
    /// Field name for partition
    partition_field: String,
}

impl ListRouter {
    /// Create a new list router
    pub fn new(values: Vec<String>, partition_field: impl Into<String>) -> Self {
        Self {
            values,
            partition_field: partition_field.into(),
        }
    }
}

impl SliceRouter for ListRouter {
    fn slices(&self) -> Result<Vec<Slice>> {
        let mut seen = std::collections::HashSet::new();
        Ok(self
            .values
            .iter()
            .filter(|v| seen.insert(v.as_str()))
            .map(|v| Slice::new(v.clone()).with_value(self.partition_field.clone(), v.clone()))
            .collect())
    }

    fn partition_field(&self) -> &str {
        &self.partition_field
    }
}

// ============================================================================
// Datetime Router
// ============================================================================

/// Datetime-based slice router
///
/// Creates one slice per `[start, end)` window; each window is keyed by its
/// formatted start so its cursor survives across runs.
#[derive(Debug, Clone)]
pub struct DatetimeRouter {
    /// Start datetime
    start: DateTime<Utc>,
    /// End datetime
    end: DateTime<Utc>,
    /// Step duration
    step: Duration,
    /// Format string for datetime output
    format: String,
    /// Parameter name for start
    start_param: String,
    /// Parameter name for end
    end_param: String,
    /// Windows ending at or before this instant are skipped
    floor: Option<DateTime<Utc>>,
}

impl DatetimeRouter {
    /// Create a new datetime router
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
        format: impl Into<String>,
        start_param: impl Into<String>,
        end_param: impl Into<String>,
    ) -> Self {
        Self {
            start,
            end,
            step,
            format: format.into(),
            start_param: start_param.into(),
            end_param: end_param.into(),
            floor: None,
        }
    }

    /// Skip windows that end at or before `floor`
    ///
    /// Window bounds do not move, so slice keys stay stable across runs.
    #[must_use]
    pub fn with_floor(mut self, floor: Option<DateTime<Utc>>) -> Self {
        self.floor = floor;
        self
    }

    /// Create from string values
    pub fn from_strings(
        start: &str,
        end: &str,
        step: &str,
        format: impl Into<String>,
        start_param: impl Into<String>,
        end_param: impl Into<String>,
    ) -> Result<Self> {
        let start_dt = parse_datetime(start)?;
        let end_dt = if end == "now" {
            Utc::now()
        } else {
            parse_datetime(end)?
        };
        let step_dur = parse_duration(step)?;
        if step_dur <= Duration::zero() {
            return Err(Error::config(format!("Datetime step must be positive: {step}")));
        }

        Ok(Self::new(
            start_dt,
            end_dt,
            step_dur,
            format,
            start_param,
            end_param,
        ))
    }

    /// Format a datetime using the configured format
    fn format_datetime(&self, dt: DateTime<Utc>) -> String {
        dt.format(&self.format).to_string()
    }
}

impl SliceRouter for DatetimeRouter {
    fn slices(&self) -> Result<Vec<Slice>> {
        let mut slices = Vec::new();
        let mut current = self.start;

        while current < self.end {
            let next = current + self.step;
            let window_end = if next > self.end { self.end } else { next };
            if self.floor.is_some_and(|floor| window_end <= floor) {
                current = next;
                continue;
            }

            let start_str = self.format_datetime(current);
            let end_str = self.format_datetime(window_end);

            slices.push(
                Slice::new(start_str.clone())
                    .with_value(self.start_param.clone(), start_str)
                    .with_value(self.end_param.clone(), end_str),
            );

            current = next;
        }

        Ok(slices)
    }

    fn partition_field(&self) -> &str {
        &self.start_param
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse a datetime string into UTC DateTime
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    // Try RFC 3339 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let formats = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d",
        "%Y/%m/%d",
    ];

    for fmt in formats {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(DateTime::from_naive_utc_and_offset(ndt, Utc));
        }
        if let Some(ndt) = NaiveDate::parse_from_str(s, fmt)
            .ok()
            .and_then(|nd| nd.and_hms_opt(0, 0, 0))
        {
            return Ok(DateTime::from_naive_utc_and_offset(ndt, Utc));
        }
    }

    Err(Error::config(format!("Invalid datetime format: {s}")))
}

/// Parse a duration string like "1d", "2h", "30m"
pub(crate) fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    let (num_str, suffix) = if let Some(stripped) = s.strip_suffix('d') {
        (stripped, 'd')
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, 'h')
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 'm')
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, 's')
    } else if let Some(stripped) = s.strip_suffix('w') {
        (stripped, 'w')
    } else {
        // Assume days if no suffix
        (s, 'd')
    };

    let num: i64 = num_str
        .parse()
        .map_err(|_| Error::config(format!("Invalid duration number: {num_str}")))?;

    let duration = match suffix {
        'w' => Duration::weeks(num),
        'd' => Duration::days(num),
        'h' => Duration::hours(num),
        'm' => Duration::minutes(num),
        's' => Duration::seconds(num),
        _ => return Err(Error::config(format!("Invalid duration suffix: {suffix}"))),
    };

    Ok(duration)
}
