use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{
    SqliteStore, datetime_column, format_datetime, nextval, now, parse_column, stamp_audit,
};
use crate::error::{Error, Result};
use crate::store::BatchStore;
use crate::store::constraint::{Operation, translate};
use crate::types::*;

const BATCH_COLUMNS: &str = "id, name, project_id, status, created_datetime, updated_datetime";
const MEMBER_COLUMNS: &str = "batch_id, node_id, node_type, created_datetime, updated_datetime";

fn batch_from_row(row: &Row<'_>) -> rusqlite::Result<Batch> {
    Ok(Batch {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        project_id: row.get(2)?,
        status: Some(parse_column(row, 3)?),
        audit: AuditColumns {
            created_datetime: Some(datetime_column(row, 4)?),
            updated_datetime: Some(datetime_column(row, 5)?),
        },
        members: Vec::new(),
    })
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<BatchMembership> {
    Ok(BatchMembership {
        batch_id: row.get(0)?,
        node_id: row.get(1)?,
        node_type: row.get(2)?,
        audit: AuditColumns {
            created_datetime: Some(datetime_column(row, 3)?),
            updated_datetime: Some(datetime_column(row, 4)?),
        },
    })
}

fn insert_member(conn: &Connection, member: &BatchMembership) -> Result<BatchMembership> {
    let mut created = member.clone();
    created.audit = stamp_audit(member.audit, now());

    conn.execute(
        "INSERT INTO batch_membership (batch_id, node_id, node_type, created_datetime, updated_datetime)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            created.batch_id,
            created.node_id,
            created.node_type,
            created.audit.created_datetime.as_ref().map(format_datetime),
            created.audit.updated_datetime.as_ref().map(format_datetime),
        ],
    )
    .map_err(|e| {
        translate(
            conn,
            e,
            &Operation::insert("batch_membership")
                .value("batch_id", created.batch_id)
                .value("node_id", created.node_id.clone()),
        )
    })?;
    Ok(created)
}

fn select_members(conn: &Connection, batch_id: i64) -> Result<Vec<BatchMembership>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEMBER_COLUMNS} FROM batch_membership WHERE batch_id = ?1 ORDER BY node_id"
    ))?;
    let rows = stmt.query_map(params![batch_id], member_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

impl BatchStore for SqliteStore {
    fn create_batch(&self, batch: &Batch) -> Result<Batch> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let id = match batch.id {
            Some(id) => id,
            None => nextval(&tx, "batch_id_seq")?,
        };
        let mut created = batch.clone();
        created.id = Some(id);
        created.status = Some(batch.status.unwrap_or_default());
        created.audit = stamp_audit(batch.audit, now());

        tx.execute(
            "INSERT INTO batch (id, name, project_id, status, created_datetime, updated_datetime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                created.name,
                created.project_id,
                created.status.map(BatchStatus::as_str),
                created.audit.created_datetime.as_ref().map(format_datetime),
                created.audit.updated_datetime.as_ref().map(format_datetime),
            ],
        )
        .map_err(|e| translate(&tx, e, &Operation::insert("batch").value("id", id)))?;

        let mut members = Vec::with_capacity(batch.members.len());
        for member in &batch.members {
            let mut member = member.clone();
            member.batch_id = id;
            members.push(insert_member(&tx, &member)?);
        }
        members.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        created.members = members;

        tx.commit()?;
        Ok(created)
    }

    fn get_batch(&self, id: i64) -> Result<Option<Batch>> {
        let conn = self.conn();
        let batch = conn
            .query_row(
                &format!("SELECT {BATCH_COLUMNS} FROM batch WHERE id = ?1"),
                params![id],
                batch_from_row,
            )
            .optional()?;

        match batch {
            Some(mut batch) => {
                batch.members = select_members(&conn, id)?;
                Ok(Some(batch))
            }
            None => Ok(None),
        }
    }

    fn list_batches(&self, project_id: &str) -> Result<Vec<Batch>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BATCH_COLUMNS} FROM batch WHERE project_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![project_id], batch_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_batch(&self, batch: &Batch) -> Result<Batch> {
        let id = batch.id.ok_or(Error::Required { field: "id" })?;
        let status = batch.status.ok_or(Error::Required { field: "status" })?;
        let updated_at = now();

        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE batch SET name = ?1, project_id = ?2, status = ?3, updated_datetime = ?4
                 WHERE id = ?5",
                params![
                    batch.name,
                    batch.project_id,
                    status.as_str(),
                    format_datetime(&updated_at),
                    id
                ],
            )
            .map_err(|e| translate(&conn, e, &Operation::update("batch").value("id", id)))?;
        if changed == 0 {
            return Err(Error::NotFound);
        }

        let mut updated = conn.query_row(
            &format!("SELECT {BATCH_COLUMNS} FROM batch WHERE id = ?1"),
            params![id],
            batch_from_row,
        )?;
        updated.members = select_members(&conn, id)?;
        Ok(updated)
    }

    fn delete_batch(&self, id: i64) -> Result<bool> {
        let conn = self.conn();
        let rows = conn
            .execute("DELETE FROM batch WHERE id = ?1", params![id])
            .map_err(|e| translate(&conn, e, &Operation::delete("batch").value("id", id)))?;
        Ok(rows > 0)
    }

    fn add_batch_member(&self, member: &BatchMembership) -> Result<BatchMembership> {
        insert_member(&self.conn(), member)
    }

    fn remove_batch_member(&self, batch_id: i64, node_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM batch_membership WHERE batch_id = ?1 AND node_id = ?2",
            params![batch_id, node_id],
        )?;
        Ok(rows > 0)
    }

    fn move_batch_member(&self, node_id: &str, from: i64, to: i64) -> Result<BatchMembership> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let changed = tx
            .execute(
                "UPDATE batch_membership SET batch_id = ?1, updated_datetime = ?2
                 WHERE batch_id = ?3 AND node_id = ?4",
                params![to, format_datetime(&now()), from, node_id],
            )
            .map_err(|e| {
                translate(
                    &tx,
                    e,
                    &Operation::update("batch_membership")
                        .value("batch_id", to)
                        .value("node_id", node_id.to_string()),
                )
            })?;
        if changed == 0 {
            return Err(Error::NotFound);
        }

        let moved = tx.query_row(
            &format!(
                "SELECT {MEMBER_COLUMNS} FROM batch_membership WHERE batch_id = ?1 AND node_id = ?2"
            ),
            params![to, node_id],
            member_from_row,
        )?;
        tx.commit()?;
        Ok(moved)
    }

    fn list_batch_members(&self, batch_id: i64) -> Result<Vec<BatchMembership>> {
        select_members(&self.conn(), batch_id)
    }
}
