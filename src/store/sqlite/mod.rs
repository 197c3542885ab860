use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use serde_json::Value;
use uuid::Uuid;

use super::Store;
use super::migrations::{self, Migration, Target};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::types::{AuditColumns, LegacyAuditColumns};

mod batch;
mod cohort;
mod entity_set;
mod notification;
mod qc_report;
mod redaction;
mod released_data;
mod reports;
mod study;
mod study_rule;
mod submission;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens the database named by `config`, creating its parent directory.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&config.path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", config.journal_mode.to_ascii_uppercase())?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }

    pub fn current_revision(&self) -> Result<Option<String>> {
        migrations::current_revision(&self.conn())
    }

    pub fn upgrade_to(&self, target: &Target) -> Result<Vec<&'static str>> {
        migrations::upgrade(&mut self.conn(), target)
    }

    pub fn downgrade_to(&self, target: &Target) -> Result<Vec<&'static str>> {
        migrations::downgrade(&mut self.conn(), target)
    }

    pub fn history(&self) -> &'static [Migration] {
        migrations::history()
    }

    /// Names of the user tables currently present.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.upgrade_to(&Target::Head)?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Current time at the precision the database keeps.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fills unset audit timestamps with `ts`.
fn stamp_audit(audit: AuditColumns, ts: DateTime<Utc>) -> AuditColumns {
    AuditColumns {
        created_datetime: Some(audit.created_datetime.unwrap_or(ts)),
        updated_datetime: Some(audit.updated_datetime.unwrap_or(ts)),
    }
}

fn stamp_legacy_audit(audit: LegacyAuditColumns, ts: DateTime<Utc>) -> LegacyAuditColumns {
    LegacyAuditColumns {
        created_date: Some(audit.created_date.unwrap_or(ts)),
        updated_date: Some(audit.updated_date.unwrap_or(ts)),
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn datetime_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(parse_datetime(&row.get::<_, String>(idx)?))
}

fn optional_datetime_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .map(|s| parse_datetime(&s)))
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Value>> {
    row.get::<_, Option<String>>(idx)?
        .map(|text| {
            serde_json::from_str(&text).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })
        })
        .transpose()
}

/// Decodes a JSON column holding any deserializable shape.
fn decoded_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// JSON text for a column. A JSON `null` binds as SQL NULL so required
/// columns reject it.
fn json_text(value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        other => Ok(Some(serde_json::to_string(other)?)),
    }
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = Error>,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e: Error| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Allocates the next value of a named sequence.
fn nextval(conn: &Connection, sequence: &str) -> Result<i64> {
    let value: i64 = conn.query_row(
        "UPDATE sequences SET last_value = last_value + 1 WHERE name = ?1 RETURNING last_value",
        params![sequence],
        |row| row.get(0),
    )?;
    tracing::debug!(sequence, value, "Allocated sequence value");
    Ok(value)
}

#[cfg(test)]
pub(crate) fn test_store() -> (tempfile::TempDir, SqliteStore) {
    let temp = tempfile::TempDir::new().unwrap();
    let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
    store.initialize().unwrap();
    (temp, store)
}
