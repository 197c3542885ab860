use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{
    SqliteStore, datetime_column, format_datetime, json_text, nextval, now, optional_json_column,
    parse_column,
};
use crate::error::{Error, Result};
use crate::store::QcReportStore;
use crate::store::constraint::{Operation, translate};
use crate::types::*;

const RUN_COLUMNS: &str =
    "id, project_id, entity_id, test_type, is_stale, status, date_created, last_updated";
const RESULT_COLUMNS: &str = "id, test_run_id, node_id, submitter_id, error_type, node_type, \
    message, severity, related_nodes, date_created, last_updated";

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<TestRun> {
    Ok(TestRun {
        id: Some(row.get(0)?),
        project_id: row.get(1)?,
        entity_id: row.get(2)?,
        test_type: row.get(3)?,
        is_stale: row.get(4)?,
        status: parse_column(row, 5)?,
        date_created: Some(datetime_column(row, 6)?),
        last_updated: Some(datetime_column(row, 7)?),
        test_results: Vec::new(),
    })
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<ValidationResult> {
    let severity = row
        .get::<_, Option<String>>(7)?
        .map(|s| {
            s.parse::<Severity>()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))
        })
        .transpose()?;

    Ok(ValidationResult {
        id: Some(row.get(0)?),
        test_run_id: Some(row.get(1)?),
        node_id: row.get(2)?,
        submitter_id: row.get(3)?,
        error_type: row.get(4)?,
        node_type: row.get(5)?,
        message: row.get(6)?,
        severity,
        related_nodes: optional_json_column(row, 8)?,
        date_created: Some(datetime_column(row, 9)?),
        last_updated: Some(datetime_column(row, 10)?),
    })
}

fn select_run(conn: &Connection, id: i64) -> Result<Option<TestRun>> {
    conn.query_row(
        &format!("SELECT {RUN_COLUMNS} FROM qc_test_runs WHERE id = ?1"),
        params![id],
        run_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn select_results(conn: &Connection, test_run_id: i64) -> Result<Vec<ValidationResult>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RESULT_COLUMNS} FROM qc_validation_results WHERE test_run_id = ?1 ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![test_run_id], result_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn insert_result(
    conn: &Connection,
    test_run_id: i64,
    result: &ValidationResult,
) -> Result<ValidationResult> {
    let id = match result.id {
        Some(id) => id,
        None => nextval(conn, "qc_validation_results_id_seq")?,
    };
    let ts = now();
    let created = ValidationResult {
        id: Some(id),
        test_run_id: Some(test_run_id),
        date_created: Some(result.date_created.unwrap_or(ts)),
        last_updated: Some(result.last_updated.unwrap_or(ts)),
        ..result.clone()
    };
    let related_nodes = match &created.related_nodes {
        Some(value) => json_text(value)?,
        None => None,
    };

    conn.execute(
        &format!(
            "INSERT INTO qc_validation_results ({RESULT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            id,
            test_run_id,
            created.node_id,
            created.submitter_id,
            created.error_type,
            created.node_type,
            created.message,
            created.severity.map(Severity::as_str),
            related_nodes,
            created.date_created.as_ref().map(format_datetime),
            created.last_updated.as_ref().map(format_datetime),
        ],
    )
    .map_err(|e| {
        translate(
            conn,
            e,
            &Operation::insert("qc_validation_results")
                .value("id", id)
                .value("test_run_id", test_run_id),
        )
    })?;
    Ok(created)
}

impl QcReportStore for SqliteStore {
    fn create_test_run(&self, run: &TestRun) -> Result<TestRun> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let id = match run.id {
            Some(id) => id,
            None => nextval(&tx, "qc_test_runs_id_seq")?,
        };
        let ts = now();
        let date_created = run.date_created.unwrap_or(ts);
        let last_updated = run.last_updated.unwrap_or(ts);

        tx.execute(
            &format!("INSERT INTO qc_test_runs ({RUN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                id,
                run.project_id,
                run.entity_id,
                run.test_type,
                run.is_stale,
                run.status.as_str(),
                format_datetime(&date_created),
                format_datetime(&last_updated),
            ],
        )
        .map_err(|e| translate(&tx, e, &Operation::insert("qc_test_runs").value("id", id)))?;

        let test_results = run
            .test_results
            .iter()
            .map(|result| insert_result(&tx, id, result))
            .collect::<Result<Vec<_>>>()?;

        tx.commit()?;
        tracing::debug!(id, test_type = %run.test_type, "Created test run");

        Ok(TestRun {
            id: Some(id),
            date_created: Some(date_created),
            last_updated: Some(last_updated),
            test_results,
            ..run.clone()
        })
    }

    fn get_test_run(&self, id: i64) -> Result<Option<TestRun>> {
        let conn = self.conn();
        match select_run(&conn, id)? {
            Some(mut run) => {
                run.test_results = select_results(&conn, id)?;
                Ok(Some(run))
            }
            None => Ok(None),
        }
    }

    fn update_test_run_status(&self, id: i64, status: TestRunStatus) -> Result<TestRun> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE qc_test_runs SET status = ?1, last_updated = ?2 WHERE id = ?3",
            params![status.as_str(), format_datetime(&now()), id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound);
        }
        let mut run = select_run(&conn, id)?.ok_or(Error::NotFound)?;
        run.test_results = select_results(&conn, id)?;
        Ok(run)
    }

    fn mark_test_run_stale(&self, id: i64) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE qc_test_runs SET is_stale = 1, last_updated = ?1 WHERE id = ?2",
            params![format_datetime(&now()), id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn add_validation_result(
        &self,
        test_run_id: i64,
        result: &ValidationResult,
    ) -> Result<ValidationResult> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let created = insert_result(&tx, test_run_id, result)?;
        tx.commit()?;
        Ok(created)
    }

    fn list_validation_results(&self, test_run_id: i64) -> Result<Vec<ValidationResult>> {
        select_results(&self.conn(), test_run_id)
    }

    fn delete_test_run(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM qc_test_runs WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}
