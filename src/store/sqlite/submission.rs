use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{
    SqliteStore, datetime_column, format_datetime, json_column, json_text, nextval, now,
    optional_json_column,
};
use crate::error::{Error, Result};
use crate::store::SubmissionStore;
use crate::store::constraint::{Operation, translate};
use crate::types::*;

/// Every column except the deferred `canonical_json`.
const LOG_COLUMNS: &str = "id, submitter, role, program, project, committed_by, is_dry_run, \
    state, closed, created_datetime";

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<TransactionLog> {
    Ok(TransactionLog {
        id: Some(row.get(0)?),
        submitter: row.get(1)?,
        role: row.get(2)?,
        program: row.get(3)?,
        project: row.get(4)?,
        committed_by: row.get(5)?,
        is_dry_run: row.get(6)?,
        state: row.get(7)?,
        closed: row.get(8)?,
        created_datetime: Some(datetime_column(row, 9)?),
        canonical_json: None,
        entities: Vec::new(),
        documents: Vec::new(),
    })
}

fn insert_snapshot(
    conn: &Connection,
    transaction_id: i64,
    snapshot: &TransactionSnapshot,
) -> Result<TransactionSnapshot> {
    conn.execute(
        "INSERT INTO transaction_snapshots (id, transaction_id, action, old_props, new_props)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            snapshot.id,
            transaction_id,
            snapshot.action,
            json_text(&snapshot.old_props)?,
            json_text(&snapshot.new_props)?,
        ],
    )
    .map_err(|e| {
        translate(
            conn,
            e,
            &Operation::insert("transaction_snapshots")
                .value("id", snapshot.id.clone())
                .value("transaction_id", transaction_id),
        )
    })?;

    Ok(TransactionSnapshot {
        transaction_id: Some(transaction_id),
        ..snapshot.clone()
    })
}

fn insert_document(
    conn: &Connection,
    transaction_id: i64,
    document: &TransactionDocument,
) -> Result<TransactionDocument> {
    let id = match document.id {
        Some(id) => id,
        None => nextval(conn, "transaction_documents_id_seq")?,
    };
    let response_json = match &document.response_json {
        Some(value) => json_text(value)?,
        None => None,
    };

    conn.execute(
        "INSERT INTO transaction_documents (id, transaction_id, name, doc_format, doc, response_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            transaction_id,
            document.name,
            document.doc_format,
            document.doc,
            response_json,
        ],
    )
    .map_err(|e| {
        translate(
            conn,
            e,
            &Operation::insert("transaction_documents")
                .value("id", id)
                .value("transaction_id", transaction_id),
        )
    })?;

    Ok(TransactionDocument {
        id: Some(id),
        transaction_id: Some(transaction_id),
        ..document.clone()
    })
}

fn select_snapshots(conn: &Connection, transaction_id: i64) -> Result<Vec<TransactionSnapshot>> {
    let mut stmt = conn.prepare(
        "SELECT id, transaction_id, action, old_props, new_props FROM transaction_snapshots
         WHERE transaction_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![transaction_id], |row| {
        Ok(TransactionSnapshot {
            id: row.get(0)?,
            transaction_id: Some(row.get(1)?),
            action: row.get(2)?,
            old_props: json_column(row, 3)?,
            new_props: json_column(row, 4)?,
        })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

/// Documents without their deferred bodies.
fn select_documents(conn: &Connection, transaction_id: i64) -> Result<Vec<TransactionDocument>> {
    let mut stmt = conn.prepare(
        "SELECT id, transaction_id, name, doc_format FROM transaction_documents
         WHERE transaction_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![transaction_id], |row| {
        Ok(TransactionDocument {
            id: Some(row.get(0)?),
            transaction_id: Some(row.get(1)?),
            name: row.get(2)?,
            doc_format: row.get(3)?,
            doc: None,
            response_json: None,
        })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn load_children(conn: &Connection, log: &mut TransactionLog) -> Result<()> {
    if let Some(id) = log.id {
        log.entities = select_snapshots(conn, id)?;
        log.documents = select_documents(conn, id)?;
    }
    Ok(())
}

/// Applies a single-column update to one log, failing when it does not exist.
fn update_log(conn: &Connection, id: i64, sql: &str, value: &dyn rusqlite::ToSql) -> Result<()> {
    let changed = conn
        .execute(sql, params![value, id])
        .map_err(|e| translate(conn, e, &Operation::update("transaction_logs").value("id", id)))?;
    if changed == 0 {
        return Err(Error::NotFound);
    }
    Ok(())
}

impl SubmissionStore for SqliteStore {
    fn create_transaction_log(&self, log: &TransactionLog) -> Result<TransactionLog> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let id = match log.id {
            Some(id) => id,
            None => nextval(&tx, "transaction_logs_id_seq")?,
        };
        let created_datetime = log.created_datetime.unwrap_or_else(now);
        let canonical_json = match &log.canonical_json {
            Some(value) => json_text(value)?,
            None => Some("[]".to_string()),
        };

        tx.execute(
            "INSERT INTO transaction_logs (id, submitter, role, program, project, committed_by,
                 is_dry_run, state, closed, created_datetime, canonical_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                log.submitter,
                log.role,
                log.program,
                log.project,
                log.committed_by,
                log.is_dry_run,
                log.state,
                log.closed,
                format_datetime(&created_datetime),
                canonical_json,
            ],
        )
        .map_err(|e| translate(&tx, e, &Operation::insert("transaction_logs").value("id", id)))?;

        let entities = log
            .entities
            .iter()
            .map(|snapshot| insert_snapshot(&tx, id, snapshot))
            .collect::<Result<Vec<_>>>()?;
        let documents = log
            .documents
            .iter()
            .map(|document| insert_document(&tx, id, document))
            .collect::<Result<Vec<_>>>()?;

        tx.commit()?;
        tracing::debug!(id, project_id = %log.project_id(), "Recorded transaction log");

        Ok(TransactionLog {
            id: Some(id),
            created_datetime: Some(created_datetime),
            canonical_json: Some(log.canonical_json.clone().unwrap_or_else(|| serde_json::json!([]))),
            entities,
            documents,
            ..log.clone()
        })
    }

    fn get_transaction_log(&self, id: i64) -> Result<Option<TransactionLog>> {
        let conn = self.conn();
        let log = conn
            .query_row(
                &format!("SELECT {LOG_COLUMNS} FROM transaction_logs WHERE id = ?1"),
                params![id],
                log_from_row,
            )
            .optional()?;
        match log {
            Some(mut log) => {
                load_children(&conn, &mut log)?;
                Ok(Some(log))
            }
            None => Ok(None),
        }
    }

    fn undefer_transaction_log(&self, log: &mut TransactionLog) -> Result<()> {
        let id = log.id.ok_or(Error::Required { field: "id" })?;
        let conn = self.conn();

        let canonical_json = conn
            .query_row(
                "SELECT canonical_json FROM transaction_logs WHERE id = ?1",
                params![id],
                |row| json_column(row, 0),
            )
            .optional()?
            .ok_or(Error::NotFound)?;
        log.canonical_json = Some(canonical_json);

        let mut stmt = conn.prepare(
            "SELECT id, doc, response_json FROM transaction_documents WHERE transaction_id = ?1",
        )?;
        let bodies = stmt
            .query_map(params![id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    optional_json_column(row, 2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (document_id, doc, response_json) in bodies {
            if let Some(document) = log
                .documents
                .iter_mut()
                .find(|d| d.id == Some(document_id))
            {
                document.doc = Some(doc);
                document.response_json = response_json;
            }
        }
        Ok(())
    }

    fn list_transaction_logs(&self, project_id: &str) -> Result<Vec<TransactionLog>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM transaction_logs
             WHERE (program || '-' || project) = ?1 ORDER BY id"
        ))?;
        let mut logs = stmt
            .query_map(params![project_id], log_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for log in &mut logs {
            load_children(&conn, log)?;
        }
        Ok(logs)
    }

    fn update_transaction_state(&self, id: i64, state: &str) -> Result<()> {
        update_log(
            &self.conn(),
            id,
            "UPDATE transaction_logs SET state = ?1 WHERE id = ?2",
            &state,
        )
    }

    fn close_transaction_log(&self, id: i64) -> Result<()> {
        update_log(
            &self.conn(),
            id,
            "UPDATE transaction_logs SET closed = ?1 WHERE id = ?2",
            &true,
        )
    }

    fn set_committed_by(&self, id: i64, committed_by: i64) -> Result<()> {
        update_log(
            &self.conn(),
            id,
            "UPDATE transaction_logs SET committed_by = ?1 WHERE id = ?2",
            &committed_by,
        )
    }

    fn add_transaction_snapshot(
        &self,
        transaction_id: i64,
        snapshot: &TransactionSnapshot,
    ) -> Result<TransactionSnapshot> {
        insert_snapshot(&self.conn(), transaction_id, snapshot)
    }

    fn add_transaction_document(
        &self,
        transaction_id: i64,
        document: &TransactionDocument,
    ) -> Result<TransactionDocument> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let created = insert_document(&tx, transaction_id, document)?;
        tx.commit()?;
        Ok(created)
    }
}
