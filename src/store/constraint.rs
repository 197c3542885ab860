//! Translation of SQLite constraint failures into [`IntegrityViolation`]s
//! carrying the declared constraint names.
//!
//! SQLite reports unique and not-null failures as `table.column` lists and
//! named CHECK failures by name, but foreign-key failures carry no detail.
//! Foreign-key names are recovered by probing the rows the failed statement
//! touched against the catalog below.

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, ffi, params_from_iter};

use crate::error::{ConstraintKind, Error, IntegrityViolation};

struct UniqueConstraint {
    table: &'static str,
    columns: &'static [&'static str],
    name: &'static str,
}

struct ForeignKey {
    name: &'static str,
    table: &'static str,
    columns: &'static [&'static str],
    parent: &'static str,
    parent_columns: &'static [&'static str],
    cascade: bool,
}

const fn unique(
    table: &'static str,
    columns: &'static [&'static str],
    name: &'static str,
) -> UniqueConstraint {
    UniqueConstraint {
        table,
        columns,
        name,
    }
}

const UNIQUE_CONSTRAINTS: &[UniqueConstraint] = &[
    unique("batch", &["id"], "batch_pk"),
    unique("batch_membership", &["batch_id", "node_id"], "batch_membership_pk"),
    unique("anonymous_context", &["id"], "anonymous_context_pkey"),
    unique("cohort", &["id"], "cohort_pkey"),
    unique("cohort_filter", &["id"], "cohort_filter_pkey"),
    unique("cohort_snapshot", &["id"], "cohort_snapshot_pkey"),
    unique("cohort_snapshot", &["filter_id"], "cohort_snapshot_filter_id_key"),
    unique("entity_set", &["id"], "entity_set_pkey"),
    unique(
        "released_data",
        &["program_name", "project_code", "data_type"],
        "released_data_pk",
    ),
    unique("released_data_log", &["id"], "released_data_log_pk"),
    unique("study", &["id"], "study_pk"),
    unique("study", &["name"], "study_name_idx"),
    unique("study_program", &["study_id", "program_name"], "study_program_pk"),
    unique(
        "study_program_project",
        &["study_id", "program_name", "project_code"],
        "study_program_project_pk",
    ),
    unique("study_rule", &["id"], "study_rule_pk"),
    unique("study_rule", &["name"], "study_rule_name_idx"),
    unique(
        "study_rule_program",
        &["study_rule_id", "program_name"],
        "study_rule_program_pk",
    ),
    unique(
        "study_rule_program_project",
        &["study_rule_id", "program_name", "project_code"],
        "study_rule_program_project_pk",
    ),
    unique("notifications", &["id"], "notifications_pkey"),
    unique("transaction_logs", &["id"], "transaction_logs_pkey"),
    unique(
        "transaction_snapshots",
        &["id", "transaction_id"],
        "transaction_snapshots_pkey",
    ),
    unique(
        "transaction_documents",
        &["id", "transaction_id"],
        "transaction_documents_pkey",
    ),
    unique("data_usage_report", &["report_period"], "data_usage_report_pkey"),
    unique(
        "data_download_report",
        &["report_period"],
        "data_download_report_pkey",
    ),
    unique("monthly_awstats", &["date", "site"], "monthly_awstats_pkey"),
    unique("gdc_reports", &["id"], "gdc_reports_pkey"),
    unique("filereport", &["id", "timestamp"], "filereport_pkey"),
    unique("redaction_log", &["id"], "redaction_log_pkey"),
    unique(
        "redaction_log",
        &["annotation_id"],
        "redaction_log_annotation_id_key",
    ),
    unique(
        "redaction_entry",
        &["node_id", "redaction_id"],
        "redaction_entry_pkey",
    ),
    unique("qc_test_runs", &["id"], "qc_test_runs_pkey"),
    unique(
        "qc_validation_results",
        &["id", "test_run_id"],
        "qc_validation_results_pkey",
    ),
];

const fn foreign_key(
    name: &'static str,
    table: &'static str,
    columns: &'static [&'static str],
    parent: &'static str,
    cascade: bool,
) -> ForeignKey {
    ForeignKey {
        name,
        table,
        columns,
        parent,
        parent_columns: &["id"],
        cascade,
    }
}

const FOREIGN_KEYS: &[ForeignKey] = &[
    foreign_key(
        "batch_membership_batch_id_fk",
        "batch_membership",
        &["batch_id"],
        "batch",
        true,
    ),
    foreign_key(
        "cohort_context_id_fkey",
        "cohort",
        &["context_id"],
        "anonymous_context",
        true,
    ),
    foreign_key(
        "cohort_filter_parent_id_fkey",
        "cohort_filter",
        &["parent_id"],
        "cohort_filter",
        false,
    ),
    foreign_key(
        "cohort_filter_cohort_id_fkey",
        "cohort_filter",
        &["cohort_id"],
        "cohort",
        true,
    ),
    foreign_key(
        "cohort_snapshot_filter_id_fkey",
        "cohort_snapshot",
        &["filter_id"],
        "cohort_filter",
        true,
    ),
    foreign_key(
        "study_program_study_id_fk",
        "study_program",
        &["study_id"],
        "study",
        false,
    ),
    foreign_key(
        "study_program_project_study_id_fk",
        "study_program_project",
        &["study_id"],
        "study",
        false,
    ),
    foreign_key(
        "study_rule_program_study_rule_id_fk",
        "study_rule_program",
        &["study_rule_id"],
        "study_rule",
        false,
    ),
    foreign_key(
        "study_rule_program_project_study_rule_id_fk",
        "study_rule_program_project",
        &["study_rule_id"],
        "study_rule",
        false,
    ),
    foreign_key(
        "transaction_snapshots_transaction_id_fkey",
        "transaction_snapshots",
        &["transaction_id"],
        "transaction_logs",
        false,
    ),
    foreign_key(
        "transaction_documents_transaction_id_fkey",
        "transaction_documents",
        &["transaction_id"],
        "transaction_logs",
        false,
    ),
    foreign_key(
        "redaction_entry_redaction_id_fkey",
        "redaction_entry",
        &["redaction_id"],
        "redaction_log",
        false,
    ),
    foreign_key(
        "qc_validation_results_test_run_id_fkey",
        "qc_validation_results",
        &["test_run_id"],
        "qc_test_runs",
        true,
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OperationKind {
    Insert,
    Update,
    Delete,
}

/// The write a store method attempted, with the key values it used.
#[derive(Debug, Clone)]
pub(crate) struct Operation {
    kind: OperationKind,
    table: &'static str,
    values: Vec<(&'static str, Value)>,
}

impl Operation {
    pub(crate) fn insert(table: &'static str) -> Self {
        Self::new(OperationKind::Insert, table)
    }

    pub(crate) fn update(table: &'static str) -> Self {
        Self::new(OperationKind::Update, table)
    }

    pub(crate) fn delete(table: &'static str) -> Self {
        Self::new(OperationKind::Delete, table)
    }

    fn new(kind: OperationKind, table: &'static str) -> Self {
        Self {
            kind,
            table,
            values: Vec::new(),
        }
    }

    #[must_use]
    pub(crate) fn value(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.values.push((column, value.into()));
        self
    }

    fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
            .filter(|value| !matches!(value, Value::Null))
    }

    fn values_for(&self, columns: &[&str]) -> Option<Vec<&Value>> {
        columns.iter().map(|column| self.get(column)).collect()
    }
}

/// Converts a failed write into a crate error. Constraint failures become
/// [`Error::Integrity`]; anything else is passed through as a database error.
pub(crate) fn translate(conn: &Connection, err: rusqlite::Error, op: &Operation) -> Error {
    let (extended_code, message) = match &err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            (
                failure.extended_code,
                message.clone().unwrap_or_else(|| failure.to_string()),
            )
        }
        _ => return Error::Database(err),
    };

    let violation = match extended_code {
        ffi::SQLITE_CONSTRAINT_NOTNULL => {
            let (table, columns) = parse_column_list(&message, op.table);
            IntegrityViolation {
                kind: ConstraintKind::NotNull,
                table,
                constraint: None,
                columns,
                message,
            }
        }
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
            let (table, columns) = parse_column_list(&message, op.table);
            IntegrityViolation {
                kind: ConstraintKind::Unique,
                constraint: unique_constraint_name(&table, &columns).map(str::to_string),
                table,
                columns,
                message,
            }
        }
        ffi::SQLITE_CONSTRAINT_CHECK => IntegrityViolation {
            kind: ConstraintKind::Check,
            table: op.table.to_string(),
            constraint: check_constraint_name(&message),
            columns: Vec::new(),
            message,
        },
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
            let fk = probe_foreign_key(conn, op);
            IntegrityViolation {
                kind: ConstraintKind::ForeignKey,
                table: op.table.to_string(),
                constraint: fk.map(|fk| fk.name.to_string()),
                columns: fk
                    .map(|fk| fk.columns.iter().map(|c| c.to_string()).collect())
                    .unwrap_or_default(),
                message,
            }
        }
        _ => return Error::Database(err),
    };

    Error::Integrity(violation)
}

/// Parses `"UNIQUE constraint failed: t.a, t.b"` into `("t", ["a", "b"])`.
fn parse_column_list(message: &str, fallback_table: &str) -> (String, Vec<String>) {
    let Some((_, list)) = message.split_once(": ") else {
        return (fallback_table.to_string(), Vec::new());
    };

    let mut table = None;
    let mut columns = Vec::new();
    for qualified in list.split(", ") {
        match qualified.trim().split_once('.') {
            Some((t, column)) => {
                table.get_or_insert_with(|| t.to_string());
                columns.push(column.to_string());
            }
            None => columns.push(qualified.trim().to_string()),
        }
    }
    (
        table.unwrap_or_else(|| fallback_table.to_string()),
        columns,
    )
}

fn unique_constraint_name(table: &str, columns: &[String]) -> Option<&'static str> {
    UNIQUE_CONSTRAINTS
        .iter()
        .find(|c| c.table == table && c.columns.iter().eq(columns.iter()))
        .map(|c| c.name)
}

/// Named CHECK failures read `"CHECK constraint failed: batch_status_check"`.
/// Unnamed ones carry the expression, which is not a name.
fn check_constraint_name(message: &str) -> Option<String> {
    let (_, name) = message.split_once(": ")?;
    let name = name.trim();
    let is_identifier = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    is_identifier.then(|| name.to_string())
}

fn probe_foreign_key(conn: &Connection, op: &Operation) -> Option<&'static ForeignKey> {
    let result = match op.kind {
        OperationKind::Insert | OperationKind::Update => probe_missing_parent(conn, op),
        OperationKind::Delete => probe_remaining_children(conn, op),
    };
    result.unwrap_or_else(|e| {
        tracing::warn!(
            table = op.table,
            "Could not resolve foreign key constraint name: {}",
            e
        );
        None
    })
}

/// Finds the first foreign key of the written row whose parent row is absent.
fn probe_missing_parent(
    conn: &Connection,
    op: &Operation,
) -> rusqlite::Result<Option<&'static ForeignKey>> {
    for fk in FOREIGN_KEYS.iter().filter(|fk| fk.table == op.table) {
        let Some(values) = op.values_for(fk.columns) else {
            continue;
        };
        let sql = format!(
            "SELECT 1 FROM {} WHERE {}",
            fk.parent,
            where_clause(fk.parent_columns)
        );
        let found: Option<i64> = conn
            .query_row(&sql, params_from_iter(values), |row| row.get(0))
            .optional()?;
        if found.is_none() {
            return Ok(Some(fk));
        }
    }
    Ok(None)
}

/// Finds the first non-cascading reference that still points at the deleted row.
fn probe_remaining_children(
    conn: &Connection,
    op: &Operation,
) -> rusqlite::Result<Option<&'static ForeignKey>> {
    for fk in FOREIGN_KEYS
        .iter()
        .filter(|fk| fk.parent == op.table && !fk.cascade)
    {
        let Some(values) = op.values_for(fk.parent_columns) else {
            continue;
        };
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} LIMIT 1",
            fk.table,
            where_clause(fk.columns)
        );
        let found: Option<i64> = conn
            .query_row(&sql, params_from_iter(values), |row| row.get(0))
            .optional()?;
        if found.is_some() {
            return Ok(Some(fk));
        }
    }
    Ok(None)
}

fn where_clause(columns: &[&str]) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::BASELINE_UP;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        conn.execute_batch(BASELINE_UP).unwrap();
        conn
    }

    fn violation(err: Error) -> IntegrityViolation {
        match err {
            Error::Integrity(violation) => violation,
            other => panic!("expected integrity error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_column_list() {
        let (table, columns) = parse_column_list(
            "UNIQUE constraint failed: batch_membership.batch_id, batch_membership.node_id",
            "x",
        );
        assert_eq!(table, "batch_membership");
        assert_eq!(columns, vec!["batch_id", "node_id"]);

        let (table, columns) = parse_column_list("constraint failed", "study");
        assert_eq!(table, "study");
        assert!(columns.is_empty());
    }

    #[test]
    fn test_check_constraint_name() {
        assert_eq!(
            check_constraint_name("CHECK constraint failed: batch_status_check").as_deref(),
            Some("batch_status_check")
        );
        assert_eq!(
            check_constraint_name("CHECK constraint failed: length(site) <= 50"),
            None
        );
    }

    #[test]
    fn test_primary_key_violation_is_named() {
        let conn = conn();
        let insert = "INSERT INTO batch (id, name, project_id) VALUES (?1, 'a', 'GDC-MISC')";
        conn.execute(insert, [1000]).unwrap();
        let err = conn.execute(insert, [1000]).unwrap_err();

        let op = Operation::insert("batch").value("id", 1000_i64);
        let v = violation(translate(&conn, err, &op));
        assert_eq!(v.kind, ConstraintKind::Unique);
        assert_eq!(v.constraint(), Some("batch_pk"));
        assert_eq!(v.columns, vec!["id"]);
    }

    #[test]
    fn test_unique_index_violation_is_named() {
        let conn = conn();
        let insert = "INSERT INTO study (id, name) VALUES (?1, 'shared')";
        conn.execute(insert, [1]).unwrap();
        let err = conn.execute(insert, [2]).unwrap_err();

        let v = violation(translate(&conn, err, &Operation::insert("study")));
        assert_eq!(v.constraint(), Some("study_name_idx"));
    }

    #[test]
    fn test_not_null_violation() {
        let conn = conn();
        let err = conn
            .execute(
                "INSERT INTO batch (id, name, project_id) VALUES (1, NULL, 'GDC-MISC')",
                [],
            )
            .unwrap_err();

        let v = violation(translate(&conn, err, &Operation::insert("batch")));
        assert!(v.is(ConstraintKind::NotNull));
        assert_eq!(v.table, "batch");
        assert_eq!(v.columns, vec!["name"]);
        assert_eq!(v.constraint(), None);
    }

    #[test]
    fn test_check_violation() {
        let conn = conn();
        let err = conn
            .execute(
                "INSERT INTO batch (id, name, project_id, status) VALUES (1, 'a', 'p', 'DONE')",
                [],
            )
            .unwrap_err();

        let v = violation(translate(&conn, err, &Operation::insert("batch")));
        assert!(v.is(ConstraintKind::Check));
        assert_eq!(v.constraint(), Some("batch_status_check"));
    }

    #[test]
    fn test_foreign_key_insert_probe() {
        let conn = conn();
        let err = conn
            .execute(
                "INSERT INTO study_program (study_id, program_name) VALUES (42, 'TCGA')",
                [],
            )
            .unwrap_err();

        let op = Operation::insert("study_program").value("study_id", 42_i64);
        let v = violation(translate(&conn, err, &op));
        assert!(v.is(ConstraintKind::ForeignKey));
        assert_eq!(v.constraint(), Some("study_program_study_id_fk"));
        assert_eq!(v.columns, vec!["study_id"]);
    }

    #[test]
    fn test_foreign_key_delete_probe() {
        let conn = conn();
        conn.execute("INSERT INTO study (id, name) VALUES (1, 's')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO study_program_project (study_id, program_name, project_code)
             VALUES (1, 'TCGA', 'BRCA')",
            [],
        )
        .unwrap();
        let err = conn.execute("DELETE FROM study WHERE id = 1", []).unwrap_err();

        let op = Operation::delete("study").value("id", 1_i64);
        let v = violation(translate(&conn, err, &op));
        assert_eq!(v.constraint(), Some("study_program_project_study_id_fk"));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let conn = conn();
        let err = conn.execute("SELECT * FROM missing_table", []).unwrap_err();
        assert!(matches!(
            translate(&conn, err, &Operation::insert("batch")),
            Error::Database(_)
        ));
    }
}
