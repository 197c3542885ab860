use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{
    SqliteStore, datetime_column, format_datetime, nextval, now, optional_datetime_column,
    parse_column,
};
use crate::error::{Error, Result};
use crate::store::RedactionStore;
use crate::store::constraint::{Operation, translate};
use crate::types::*;

const LOG_COLUMNS: &str = "id, annotation_id, initiated_by, rescinded_by, reason, \
    reason_category, project_id, redaction_type, created_datetime, date_rescinded";
const ENTRY_COLUMNS: &str = "node_id, redaction_id, version, file_name, node_type, \
    release_number, rescinded, rescinded_by, created_datetime, date_rescinded";

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<RedactionLog> {
    Ok(RedactionLog {
        id: Some(row.get(0)?),
        annotation_id: row.get(1)?,
        initiated_by: row.get(2)?,
        rescinded_by: row.get(3)?,
        reason: row.get(4)?,
        reason_category: row.get(5)?,
        project_id: row.get(6)?,
        redaction_type: parse_column(row, 7)?,
        created_datetime: Some(datetime_column(row, 8)?),
        date_rescinded: optional_datetime_column(row, 9)?,
        entries: Vec::new(),
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<RedactionEntry> {
    Ok(RedactionEntry {
        node_id: row.get(0)?,
        redaction_id: Some(row.get(1)?),
        version: row.get(2)?,
        file_name: row.get(3)?,
        node_type: row.get(4)?,
        release_number: row.get(5)?,
        rescinded: row.get(6)?,
        rescinded_by: row.get(7)?,
        created_datetime: Some(datetime_column(row, 8)?),
        date_rescinded: optional_datetime_column(row, 9)?,
    })
}

fn select_entries(conn: &Connection, redaction_id: i64) -> Result<Vec<RedactionEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM redaction_entry WHERE redaction_id = ?1 ORDER BY node_id"
    ))?;
    let rows = stmt.query_map(params![redaction_id], entry_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn select_log(conn: &Connection, column: &str, value: &dyn rusqlite::ToSql) -> Result<Option<RedactionLog>> {
    let log = conn
        .query_row(
            &format!("SELECT {LOG_COLUMNS} FROM redaction_log WHERE {column} = ?1"),
            [value],
            log_from_row,
        )
        .optional()?;
    match log {
        Some(mut log) => {
            if let Some(id) = log.id {
                log.entries = select_entries(conn, id)?;
            }
            Ok(Some(log))
        }
        None => Ok(None),
    }
}

fn insert_entry(conn: &Connection, redaction_id: i64, entry: &RedactionEntry) -> Result<RedactionEntry> {
    let created = RedactionEntry {
        redaction_id: Some(redaction_id),
        created_datetime: Some(entry.created_datetime.unwrap_or_else(now)),
        ..entry.clone()
    };

    conn.execute(
        &format!(
            "INSERT INTO redaction_entry ({ENTRY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        ),
        params![
            created.node_id,
            redaction_id,
            created.version,
            created.file_name,
            created.node_type,
            created.release_number,
            created.rescinded,
            created.rescinded_by,
            created.created_datetime.as_ref().map(format_datetime),
            created.date_rescinded.as_ref().map(format_datetime),
        ],
    )
    .map_err(|e| {
        translate(
            conn,
            e,
            &Operation::insert("redaction_entry")
                .value("node_id", created.node_id.clone())
                .value("redaction_id", redaction_id),
        )
    })?;
    Ok(created)
}

impl RedactionStore for SqliteStore {
    fn create_redaction_log(&self, log: &RedactionLog) -> Result<RedactionLog> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let id = match log.id {
            Some(id) => id,
            None => nextval(&tx, "redaction_log_id_seq")?,
        };
        let ts = now();
        let created_datetime = log.created_datetime.unwrap_or(ts);

        tx.execute(
            &format!(
                "INSERT INTO redaction_log ({LOG_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                id,
                log.annotation_id,
                log.initiated_by,
                log.rescinded_by,
                log.reason,
                log.reason_category,
                log.project_id,
                log.redaction_type.as_str(),
                format_datetime(&created_datetime),
                log.date_rescinded.as_ref().map(format_datetime),
            ],
        )
        .map_err(|e| {
            translate(
                &tx,
                e,
                &Operation::insert("redaction_log")
                    .value("id", id)
                    .value("annotation_id", log.annotation_id.clone()),
            )
        })?;

        let entries = log
            .entries
            .iter()
            .map(|entry| {
                let stamped = RedactionEntry {
                    created_datetime: Some(entry.created_datetime.unwrap_or(ts)),
                    ..entry.clone()
                };
                insert_entry(&tx, id, &stamped)
            })
            .collect::<Result<Vec<_>>>()?;

        tx.commit()?;
        tracing::info!(
            id,
            annotation_id = %log.annotation_id,
            entries = entries.len(),
            "Recorded redaction"
        );

        Ok(RedactionLog {
            id: Some(id),
            created_datetime: Some(created_datetime),
            entries,
            ..log.clone()
        })
    }

    fn get_redaction_log(&self, id: i64) -> Result<Option<RedactionLog>> {
        select_log(&self.conn(), "id", &id)
    }

    fn get_redaction_log_by_annotation(
        &self,
        annotation_id: &str,
    ) -> Result<Option<RedactionLog>> {
        select_log(&self.conn(), "annotation_id", &annotation_id)
    }

    fn rescind_redaction_log(&self, id: i64, rescinded_by: &str) -> Result<RedactionLog> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut log = select_log(&tx, "id", &id)?.ok_or(Error::NotFound)?;
        log.rescind_all(rescinded_by, now());
        let date_rescinded = log.date_rescinded.as_ref().map(format_datetime);

        tx.execute(
            "UPDATE redaction_log SET rescinded_by = ?1, date_rescinded = ?2 WHERE id = ?3",
            params![log.rescinded_by, date_rescinded, id],
        )?;
        tx.execute(
            "UPDATE redaction_entry SET rescinded = 1, rescinded_by = ?1, date_rescinded = ?2
             WHERE redaction_id = ?3",
            params![log.rescinded_by, date_rescinded, id],
        )?;

        tx.commit()?;
        tracing::info!(id, rescinded_by, "Rescinded redaction");
        Ok(log)
    }

    fn rescind_redaction_entry(
        &self,
        redaction_id: i64,
        node_id: &str,
        rescinded_by: &str,
    ) -> Result<RedactionEntry> {
        let conn = self.conn();
        let mut entry = conn
            .query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM redaction_entry
                     WHERE redaction_id = ?1 AND node_id = ?2"
                ),
                params![redaction_id, node_id],
                entry_from_row,
            )
            .optional()?
            .ok_or(Error::NotFound)?;
        entry.rescind(rescinded_by, now());

        conn.execute(
            "UPDATE redaction_entry SET rescinded = 1, rescinded_by = ?1, date_rescinded = ?2
             WHERE redaction_id = ?3 AND node_id = ?4",
            params![
                entry.rescinded_by,
                entry.date_rescinded.as_ref().map(format_datetime),
                redaction_id,
                node_id,
            ],
        )?;
        Ok(entry)
    }
}
