//! Timestamp column groups shared by most tables, and the ISO-8601 rendering
//! used by every `to_json` contract.

use chrono::{DateTime, Timelike, Utc};
use serde_json::Value;

/// `created_datetime` / `updated_datetime`, both defaulted by the database at
/// insert. `updated_datetime` is restamped by the store on every update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditColumns {
    pub created_datetime: Option<DateTime<Utc>>,
    pub updated_datetime: Option<DateTime<Utc>>,
}

impl AuditColumns {
    pub fn at(ts: DateTime<Utc>) -> Self {
        Self {
            created_datetime: Some(ts),
            updated_datetime: Some(ts),
        }
    }
}

/// The older `created_date` / `updated_date` naming used by the study tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegacyAuditColumns {
    pub created_date: Option<DateTime<Utc>>,
    pub updated_date: Option<DateTime<Utc>>,
}

impl LegacyAuditColumns {
    pub fn at(ts: DateTime<Utc>) -> Self {
        Self {
            created_date: Some(ts),
            updated_date: Some(ts),
        }
    }
}

fn render(dt: &DateTime<Utc>, separator: char) -> String {
    let date = dt.format("%Y-%m-%d");
    if dt.nanosecond() / 1_000 == 0 {
        format!("{date}{separator}{}+00:00", dt.format("%H:%M:%S"))
    } else {
        format!("{date}{separator}{}+00:00", dt.format("%H:%M:%S%.6f"))
    }
}

/// Renders `2021-01-18T09:30:10.000123+00:00`; the fraction is omitted when
/// the timestamp has no sub-second microseconds.
pub fn iso8601(dt: &DateTime<Utc>) -> String {
    render(dt, 'T')
}

/// Same as [`iso8601`] with a space between date and time.
pub fn iso8601_spaced(dt: &DateTime<Utc>) -> String {
    render(dt, ' ')
}

pub fn iso8601_value(dt: Option<&DateTime<Utc>>) -> Value {
    dt.map_or(Value::Null, |dt| Value::String(iso8601(dt)))
}

/// Text used by `Display` impls for an optional timestamp.
pub(crate) fn display_timestamp(dt: Option<&DateTime<Utc>>) -> String {
    dt.map_or_else(|| "null".to_string(), iso8601)
}
