use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{
    SqliteStore, datetime_column, decoded_column, format_datetime, now, parse_column, stamp_audit,
};
use crate::error::{Error, Result};
use crate::store::EntitySetStore;
use crate::store::constraint::{Operation, translate};
use crate::types::*;

const SET_COLUMNS: &str = "id, type, entity_type, entity_ids, \
    created_datetime, updated_datetime, accessed_datetime";

fn set_from_row(row: &Row<'_>) -> rusqlite::Result<EntitySet> {
    Ok(EntitySet {
        id: row.get(0)?,
        set_type: parse_column(row, 1)?,
        entity_type: parse_column(row, 2)?,
        entity_ids: decoded_column(row, 3)?,
        audit: AuditColumns {
            created_datetime: Some(datetime_column(row, 4)?),
            updated_datetime: Some(datetime_column(row, 5)?),
        },
        accessed_datetime: Some(datetime_column(row, 6)?),
    })
}

fn select_set(conn: &Connection, id: &str) -> Result<Option<EntitySet>> {
    conn.query_row(
        &format!("SELECT {SET_COLUMNS} FROM entity_set WHERE id = ?1"),
        params![id],
        set_from_row,
    )
    .optional()
    .map_err(Error::from)
}

impl EntitySetStore for SqliteStore {
    fn create_entity_set(&self, set: &EntitySet) -> Result<EntitySet> {
        set.validate()?;

        let ts = now();
        let mut created = set.clone();
        created.audit = stamp_audit(set.audit, ts);
        created.accessed_datetime = Some(set.accessed_datetime.unwrap_or(ts));

        let conn = self.conn();
        conn.execute(
            "INSERT INTO entity_set (id, type, entity_type, entity_ids,
                 created_datetime, updated_datetime, accessed_datetime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                created.id,
                created.set_type.as_str(),
                created.entity_type.as_str(),
                serde_json::to_string(&created.entity_ids)?,
                created.audit.created_datetime.as_ref().map(format_datetime),
                created.audit.updated_datetime.as_ref().map(format_datetime),
                created.accessed_datetime.as_ref().map(format_datetime),
            ],
        )
        .map_err(|e| {
            translate(
                &conn,
                e,
                &Operation::insert("entity_set").value("id", created.id.clone()),
            )
        })?;
        Ok(created)
    }

    fn get_entity_set(&self, id: &str) -> Result<Option<EntitySet>> {
        select_set(&self.conn(), id)
    }

    fn update_entity_set(&self, set: &EntitySet) -> Result<EntitySet> {
        set.validate()?;
        let ts = format_datetime(&now());

        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE entity_set
                 SET type = ?1, entity_type = ?2, entity_ids = ?3,
                     updated_datetime = ?4, accessed_datetime = ?4
                 WHERE id = ?5",
                params![
                    set.set_type.as_str(),
                    set.entity_type.as_str(),
                    serde_json::to_string(&set.entity_ids)?,
                    ts,
                    set.id,
                ],
            )
            .map_err(|e| {
                translate(
                    &conn,
                    e,
                    &Operation::update("entity_set").value("id", set.id.clone()),
                )
            })?;
        if changed == 0 {
            return Err(Error::NotFound);
        }
        select_set(&conn, &set.id)?.ok_or(Error::NotFound)
    }

    fn mark_entity_set_accessed(&self, id: &str) -> Result<EntitySet> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE entity_set SET accessed_datetime = ?1 WHERE id = ?2",
            params![format_datetime(&now()), id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound);
        }
        select_set(&conn, id)?.ok_or(Error::NotFound)
    }

    fn delete_entity_set(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM entity_set WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn list_entity_sets(&self, entity_type: EntityType) -> Result<Vec<EntitySet>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SET_COLUMNS} FROM entity_set WHERE entity_type = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![entity_type.as_str()], set_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}
