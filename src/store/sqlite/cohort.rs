use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use uuid::Uuid;

use super::{
    SqliteStore, datetime_column, decoded_column, format_datetime, json_column, json_text,
    nextval, now, parse_column, stamp_audit, uuid_column,
};
use crate::error::{Error, Result};
use crate::store::CohortStore;
use crate::store::constraint::{Operation, translate};
use crate::types::*;

const FILTER_COLUMNS: &str =
    "id, parent_id, cohort_id, filters, cohort_type, created_datetime, updated_datetime";
const SNAPSHOT_COLUMNS: &str =
    "id, filter_id, data_release, case_ids, created_datetime, updated_datetime";

fn audit_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<AuditColumns> {
    Ok(AuditColumns {
        created_datetime: Some(datetime_column(row, idx)?),
        updated_datetime: Some(datetime_column(row, idx + 1)?),
    })
}

fn context_from_row(row: &Row<'_>) -> rusqlite::Result<AnonymousContext> {
    Ok(AnonymousContext {
        id: uuid_column(row, 0)?,
        name: row.get(1)?,
        audit: audit_from_row(row, 2)?,
    })
}

fn cohort_from_row(row: &Row<'_>) -> rusqlite::Result<Cohort> {
    Ok(Cohort {
        id: uuid_column(row, 0)?,
        name: row.get(1)?,
        context_id: uuid_column(row, 2)?,
        audit: audit_from_row(row, 3)?,
    })
}

fn filter_from_row(row: &Row<'_>) -> rusqlite::Result<CohortFilter> {
    Ok(CohortFilter {
        id: Some(row.get(0)?),
        parent_id: row.get(1)?,
        cohort_id: uuid_column(row, 2)?,
        filters: json_column(row, 3)?,
        cohort_type: parse_column(row, 4)?,
        audit: audit_from_row(row, 5)?,
    })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<CohortSnapshot> {
    let case_ids: Vec<String> = decoded_column(row, 3)?;
    let case_ids = case_ids
        .iter()
        .map(|id| Uuid::parse_str(id))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    Ok(CohortSnapshot {
        id: Some(row.get(0)?),
        filter_id: row.get(1)?,
        data_release: uuid_column(row, 2)?,
        case_ids,
        audit: audit_from_row(row, 4)?,
    })
}

/// A parent must belong to the same cohort. A missing parent is left to
/// `cohort_filter_parent_id_fkey`.
fn check_parent(conn: &Connection, filter: &CohortFilter) -> Result<()> {
    let Some(parent_id) = filter.parent_id else {
        return Ok(());
    };
    let parent_cohort = conn
        .query_row(
            "SELECT cohort_id FROM cohort_filter WHERE id = ?1",
            params![parent_id],
            |row| uuid_column(row, 0),
        )
        .optional()?;

    match parent_cohort {
        Some(cohort_id) if cohort_id != filter.cohort_id => Err(Error::Validation(format!(
            "parent filter {parent_id} belongs to cohort {cohort_id}, not {}",
            filter.cohort_id
        ))),
        _ => Ok(()),
    }
}

fn insert_filter(conn: &Connection, filter: &CohortFilter) -> Result<CohortFilter> {
    check_parent(conn, filter)?;
    let id = match filter.id {
        Some(id) => id,
        None => nextval(conn, "cohort_filter_id_seq")?,
    };
    let mut created = filter.clone();
    created.id = Some(id);
    created.audit = stamp_audit(filter.audit, now());

    conn.execute(
        "INSERT INTO cohort_filter
             (id, parent_id, cohort_id, filters, cohort_type, created_datetime, updated_datetime)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            created.parent_id,
            created.cohort_id.to_string(),
            json_text(&created.filters)?,
            created.cohort_type.as_str(),
            created.audit.created_datetime.as_ref().map(format_datetime),
            created.audit.updated_datetime.as_ref().map(format_datetime),
        ],
    )
    .map_err(|e| {
        translate(
            conn,
            e,
            &Operation::insert("cohort_filter")
                .value("id", id)
                .value("parent_id", created.parent_id)
                .value("cohort_id", created.cohort_id.to_string()),
        )
    })?;
    Ok(created)
}

fn select_filters(conn: &Connection, cohort_id: Uuid, limit: Option<i64>) -> Result<Vec<CohortFilter>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILTER_COLUMNS} FROM cohort_filter WHERE cohort_id = ?1 ORDER BY id DESC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(
        params![cohort_id.to_string(), limit.unwrap_or(-1)],
        filter_from_row,
    )?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

impl CohortStore for SqliteStore {
    fn create_anonymous_context(&self, context: &AnonymousContext) -> Result<AnonymousContext> {
        let mut created = context.clone();
        created.audit = stamp_audit(context.audit, now());

        let conn = self.conn();
        conn.execute(
            "INSERT INTO anonymous_context (id, name, created_datetime, updated_datetime)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                created.id.to_string(),
                created.name,
                created.audit.created_datetime.as_ref().map(format_datetime),
                created.audit.updated_datetime.as_ref().map(format_datetime),
            ],
        )
        .map_err(|e| {
            translate(
                &conn,
                e,
                &Operation::insert("anonymous_context").value("id", created.id.to_string()),
            )
        })?;
        Ok(created)
    }

    fn get_anonymous_context(&self, id: Uuid) -> Result<Option<AnonymousContext>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, created_datetime, updated_datetime
             FROM anonymous_context WHERE id = ?1",
            params![id.to_string()],
            context_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_anonymous_context(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn();
        let rows = conn
            .execute(
                "DELETE FROM anonymous_context WHERE id = ?1",
                params![id.to_string()],
            )
            .map_err(|e| {
                translate(
                    &conn,
                    e,
                    &Operation::delete("anonymous_context").value("id", id.to_string()),
                )
            })?;
        Ok(rows > 0)
    }

    fn create_cohort(&self, cohort: &Cohort) -> Result<Cohort> {
        let mut created = cohort.clone();
        created.audit = stamp_audit(cohort.audit, now());

        let conn = self.conn();
        conn.execute(
            "INSERT INTO cohort (id, name, context_id, created_datetime, updated_datetime)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                created.id.to_string(),
                created.name,
                created.context_id.to_string(),
                created.audit.created_datetime.as_ref().map(format_datetime),
                created.audit.updated_datetime.as_ref().map(format_datetime),
            ],
        )
        .map_err(|e| {
            translate(
                &conn,
                e,
                &Operation::insert("cohort")
                    .value("id", created.id.to_string())
                    .value("context_id", created.context_id.to_string()),
            )
        })?;
        Ok(created)
    }

    fn get_cohort(&self, id: Uuid) -> Result<Option<Cohort>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, context_id, created_datetime, updated_datetime
             FROM cohort WHERE id = ?1",
            params![id.to_string()],
            cohort_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_cohorts(&self, context_id: Uuid) -> Result<Vec<Cohort>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, context_id, created_datetime, updated_datetime
             FROM cohort WHERE context_id = ?1 ORDER BY created_datetime, id",
        )?;
        let rows = stmt.query_map(params![context_id.to_string()], cohort_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn rename_cohort(&self, id: Uuid, name: &str) -> Result<Cohort> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE cohort SET name = ?1, updated_datetime = ?2 WHERE id = ?3",
                params![name, format_datetime(&now()), id.to_string()],
            )
            .map_err(|e| {
                translate(
                    &conn,
                    e,
                    &Operation::update("cohort").value("id", id.to_string()),
                )
            })?;
        if changed == 0 {
            return Err(Error::NotFound);
        }
        conn.query_row(
            "SELECT id, name, context_id, created_datetime, updated_datetime
             FROM cohort WHERE id = ?1",
            params![id.to_string()],
            cohort_from_row,
        )
        .map_err(Error::from)
    }

    fn delete_cohort(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn();
        let rows = conn
            .execute("DELETE FROM cohort WHERE id = ?1", params![id.to_string()])
            .map_err(|e| {
                translate(
                    &conn,
                    e,
                    &Operation::delete("cohort").value("id", id.to_string()),
                )
            })?;
        Ok(rows > 0)
    }

    fn create_cohort_filter(&self, filter: &CohortFilter) -> Result<CohortFilter> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let created = insert_filter(&tx, filter)?;
        tx.commit()?;
        Ok(created)
    }

    fn append_cohort_filter(
        &self,
        cohort_id: Uuid,
        filters: &Value,
        cohort_type: CohortType,
    ) -> Result<CohortFilter> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut filter = CohortFilter::new(cohort_id, filters.clone()).with_type(cohort_type);
        filter.parent_id = select_filters(&tx, cohort_id, Some(1))?
            .first()
            .and_then(|current| current.id);
        let created = insert_filter(&tx, &filter)?;

        tx.commit()?;
        Ok(created)
    }

    fn get_cohort_filter(&self, id: i64) -> Result<Option<CohortFilter>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {FILTER_COLUMNS} FROM cohort_filter WHERE id = ?1"),
            params![id],
            filter_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_current_filter(&self, cohort_id: Uuid) -> Result<Option<CohortFilter>> {
        let conn = self.conn();
        Ok(select_filters(&conn, cohort_id, Some(1))?.into_iter().next())
    }

    fn filter_history(&self, cohort_id: Uuid) -> Result<Vec<CohortFilter>> {
        select_filters(&self.conn(), cohort_id, None)
    }

    fn create_cohort_snapshot(&self, snapshot: &CohortSnapshot) -> Result<CohortSnapshot> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let id = match snapshot.id {
            Some(id) => id,
            None => nextval(&tx, "cohort_snapshot_id_seq")?,
        };
        let mut created = snapshot.clone();
        created.id = Some(id);
        created.audit = stamp_audit(snapshot.audit, now());
        let case_ids: Vec<String> = created.case_ids.iter().map(Uuid::to_string).collect();

        tx.execute(
            "INSERT INTO cohort_snapshot
                 (id, filter_id, data_release, case_ids, created_datetime, updated_datetime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                created.filter_id,
                created.data_release.to_string(),
                serde_json::to_string(&case_ids)?,
                created.audit.created_datetime.as_ref().map(format_datetime),
                created.audit.updated_datetime.as_ref().map(format_datetime),
            ],
        )
        .map_err(|e| {
            translate(
                &tx,
                e,
                &Operation::insert("cohort_snapshot")
                    .value("id", id)
                    .value("filter_id", created.filter_id),
            )
        })?;

        tx.commit()?;
        Ok(created)
    }

    fn get_cohort_snapshot(&self, id: i64) -> Result<Option<CohortSnapshot>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SNAPSHOT_COLUMNS} FROM cohort_snapshot WHERE id = ?1"),
            params![id],
            snapshot_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_cohort_snapshot_for_filter(&self, filter_id: i64) -> Result<Option<CohortSnapshot>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SNAPSHOT_COLUMNS} FROM cohort_snapshot WHERE filter_id = ?1"),
            params![filter_id],
            snapshot_from_row,
        )
        .optional()
        .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::test_store;
    use super::*;
    use crate::error::ConstraintKind;

    fn cohort(store: &SqliteStore) -> (AnonymousContext, Cohort) {
        let context = store
            .create_anonymous_context(&AnonymousContext::new("ctx"))
            .unwrap();
        let cohort = store
            .create_cohort(&Cohort::new("my cohort", context.id))
            .unwrap();
        (context, cohort)
    }

    #[test]
    fn test_context_and_cohort_round_trip() {
        let (_temp, store) = test_store();
        let (context, cohort) = cohort(&store);

        assert_eq!(store.get_anonymous_context(context.id).unwrap().unwrap(), context);
        assert_eq!(store.get_cohort(cohort.id).unwrap().unwrap(), cohort);
        assert_eq!(store.list_cohorts(context.id).unwrap(), vec![cohort.clone()]);

        let renamed = store.rename_cohort(cohort.id, "renamed").unwrap();
        assert_eq!(renamed.name, "renamed");
        assert!(matches!(
            store.rename_cohort(Uuid::new_v4(), "x"),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_cohort_requires_context() {
        let (_temp, store) = test_store();
        let err = store
            .create_cohort(&Cohort::new("orphan", Uuid::new_v4()))
            .unwrap_err();
        let violation = err.integrity().unwrap();
        assert!(violation.is(ConstraintKind::ForeignKey));
        assert_eq!(violation.constraint(), Some("cohort_context_id_fkey"));
    }

    #[test]
    fn test_append_builds_history_chain() {
        let (_temp, store) = test_store();
        let (_, cohort) = cohort(&store);

        let first = store
            .append_cohort_filter(cohort.id, &json!({"op": "and"}), CohortType::Static)
            .unwrap();
        let second = store
            .append_cohort_filter(cohort.id, &json!({"op": "or"}), CohortType::Dynamic)
            .unwrap();

        assert_eq!(first.parent_id, None);
        assert_eq!(second.parent_id, first.id);

        let current = store.get_current_filter(cohort.id).unwrap().unwrap();
        assert_eq!(current, second);

        let history = store.filter_history(cohort.id).unwrap();
        assert_eq!(history, vec![second, first]);
    }

    #[test]
    fn test_filter_requires_filters_value() {
        let (_temp, store) = test_store();
        let (_, cohort) = cohort(&store);

        let err = store
            .create_cohort_filter(&CohortFilter::new(cohort.id, Value::Null))
            .unwrap_err();
        let violation = err.integrity().unwrap();
        assert!(violation.is(ConstraintKind::NotNull));
        assert_eq!(violation.columns, vec!["filters"]);
    }

    #[test]
    fn test_filter_with_missing_parent() {
        let (_temp, store) = test_store();
        let (_, cohort) = cohort(&store);

        let err = store
            .create_cohort_filter(&CohortFilter::new(cohort.id, json!({})).with_parent(99))
            .unwrap_err();
        assert_eq!(
            err.integrity().unwrap().constraint(),
            Some("cohort_filter_parent_id_fkey")
        );
    }

    #[test]
    fn test_filter_parent_must_share_cohort() {
        let (_temp, store) = test_store();
        let (context, first) = cohort(&store);
        let second = store
            .create_cohort(&Cohort::new("other cohort", context.id))
            .unwrap();
        let parent = store
            .append_cohort_filter(first.id, &json!({}), CohortType::Static)
            .unwrap();

        let err = store
            .create_cohort_filter(
                &CohortFilter::new(second.id, json!({})).with_parent(parent.id.unwrap()),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.filter_history(second.id).unwrap().is_empty());

        assert!(store.delete_cohort(first.id).unwrap());
        assert!(store.get_cohort_filter(parent.id.unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_cohort_delete_cascades() {
        let (_temp, store) = test_store();
        let (context, cohort) = cohort(&store);

        let mut snapshots = Vec::new();
        for filters in [json!({"op": "and"}), json!({"op": "or"})] {
            let filter = store
                .append_cohort_filter(cohort.id, &filters, CohortType::Static)
                .unwrap();
            let snapshot = store
                .create_cohort_snapshot(&CohortSnapshot::new(
                    filter.id.unwrap(),
                    Uuid::new_v4(),
                    vec![Uuid::new_v4()],
                ))
                .unwrap();
            snapshots.push(snapshot.id.unwrap());
        }

        assert!(store.delete_cohort(cohort.id).unwrap());
        assert!(store.get_cohort(cohort.id).unwrap().is_none());
        assert!(store.filter_history(cohort.id).unwrap().is_empty());
        for id in snapshots {
            assert!(store.get_cohort_snapshot(id).unwrap().is_none());
        }
        assert!(store.get_anonymous_context(context.id).unwrap().is_some());
        assert!(!store.delete_cohort(cohort.id).unwrap());
    }

    #[test]
    fn test_one_snapshot_per_filter() {
        let (_temp, store) = test_store();
        let (_, cohort) = cohort(&store);
        let filter = store
            .append_cohort_filter(cohort.id, &json!({}), CohortType::Static)
            .unwrap();
        let filter_id = filter.id.unwrap();

        let snapshot = CohortSnapshot::new(filter_id, Uuid::new_v4(), vec![Uuid::new_v4()]);
        let created = store.create_cohort_snapshot(&snapshot).unwrap();
        assert_eq!(
            store.get_cohort_snapshot_for_filter(filter_id).unwrap().unwrap(),
            created
        );

        let err = store.create_cohort_snapshot(&snapshot).unwrap_err();
        assert_eq!(
            err.integrity().unwrap().constraint(),
            Some("cohort_snapshot_filter_id_key")
        );
    }

    #[test]
    fn test_context_delete_cascades() {
        let (_temp, store) = test_store();
        let (context, cohort) = cohort(&store);
        let first = store
            .append_cohort_filter(cohort.id, &json!({}), CohortType::Static)
            .unwrap();
        store
            .append_cohort_filter(cohort.id, &json!({"a": 1}), CohortType::Static)
            .unwrap();
        let snapshot = store
            .create_cohort_snapshot(&CohortSnapshot::new(
                first.id.unwrap(),
                Uuid::new_v4(),
                Vec::new(),
            ))
            .unwrap();

        assert!(store.delete_anonymous_context(context.id).unwrap());
        assert!(store.get_cohort(cohort.id).unwrap().is_none());
        assert!(store.filter_history(cohort.id).unwrap().is_empty());
        assert!(store.get_cohort_snapshot(snapshot.id.unwrap()).unwrap().is_none());
    }
}
