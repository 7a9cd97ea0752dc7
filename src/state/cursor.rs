//! Cursor tracking
//!
//! Decides, record by record, whether a slice's stored cutoff should advance.
//! A cutoff only ever moves forward: an update is accepted when the record's
//! cursor value, minus the configured lag, is strictly greater than the stored
//! cutoff. The stored value is always the unadjusted record value.
//!
//! [`updated_state`] is the pure entry point: it returns a new state and
//! leaves the input untouched. The slice driver updates in place through
//! [`CursorTracker::extract`] and [`CursorTracker::apply`], since it needs the
//! extracted cutoff before emitting the record.

use super::types::{Cutoff, StreamState};
use crate::stream::{FieldPath, Record};
use crate::types::JsonValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Advances per-slice cutoffs from record cursor values
#[derive(Debug, Clone, Copy)]
pub struct CursorTracker<'a> {
    cursor_field: Option<&'a FieldPath>,
    lag_days: u32,
}

impl<'a> CursorTracker<'a> {
    /// Create a tracker for a cursor field
    pub fn new(cursor_field: Option<&'a FieldPath>, lag_days: u32) -> Self {
        Self {
            cursor_field,
            lag_days,
        }
    }

    /// Extract the record's cutoff, if its cursor field resolves
    pub fn extract(&self, record: &Record) -> Option<Cutoff> {
        parse_cutoff(self.cursor_field?.resolve(record)?)
    }

    /// Advance `state[key]` in place; returns whether the state changed
    pub fn advance(&self, state: &mut StreamState, record: &Record, key: &str) -> bool {
        match self.extract(record) {
            Some(latest) => self.apply(state, latest, key),
            None => false,
        }
    }

    /// Offer an already extracted cutoff for `state[key]`
    pub fn apply(&self, state: &mut StreamState, latest: Cutoff, key: &str) -> bool {
        let adjusted = latest.minus_days(self.lag_days);
        match state.get(key) {
            Some(stored) if adjusted <= stored => false,
            _ => {
                state.set(key, latest);
                true
            }
        }
    }
}

/// Pure form of [`CursorTracker::advance`]: returns the updated state
pub fn updated_state(
    current: &StreamState,
    cursor_field: Option<&FieldPath>,
    record: &Record,
    key: &str,
    lag_days: u32,
) -> StreamState {
    let mut next = current.clone();
    CursorTracker::new(cursor_field, lag_days).advance(&mut next, record, key);
    next
}

/// Interpret a cursor value as a cutoff
///
/// Integers are epoch milliseconds; strings are RFC 3339 or common
/// date/datetime formats, or integer strings.
pub fn parse_cutoff(value: &JsonValue) -> Option<Cutoff> {
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Cutoff::from_millis),
        JsonValue::String(s) => parse_datetime(s)
            .map(Cutoff::from_datetime)
            .or_else(|| s.trim().parse::<i64>().ok().map(Cutoff::from_millis)),
        _ => None,
    }
}

/// Parse a datetime string into UTC DateTime
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d",
        "%Y/%m/%d",
    ];

    for fmt in formats {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(ndt, Utc));
        }
        if let Ok(nd) = NaiveDate::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(
                nd.and_hms_opt(0, 0, 0)?,
                Utc,
            ));
        }
    }

    None
}
