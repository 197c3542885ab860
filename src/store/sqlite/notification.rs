use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{
    SqliteStore, datetime_column, decoded_column, format_datetime, nextval, now,
    optional_datetime_column,
};
use crate::error::{Error, Result};
use crate::store::NotificationStore;
use crate::store::constraint::{Operation, translate};
use crate::types::Notification;

const NOTIFICATION_COLUMNS: &str =
    "id, components, message, level, dismissible, created, start_date, end_date";

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: Some(row.get(0)?),
        components: decoded_column(row, 1)?,
        message: row.get(2)?,
        level: row.get(3)?,
        dismissible: row.get(4)?,
        created: Some(datetime_column(row, 5)?),
        start_date: optional_datetime_column(row, 6)?,
        end_date: optional_datetime_column(row, 7)?,
    })
}

fn select_notification(conn: &Connection, id: i64) -> Result<Option<Notification>> {
    conn.query_row(
        &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
        params![id],
        notification_from_row,
    )
    .optional()
    .map_err(Error::from)
}

impl NotificationStore for SqliteStore {
    fn create_notification(&self, notification: &Notification) -> Result<Notification> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let id = match notification.id {
            Some(id) => id,
            None => nextval(&tx, "notifications_id_seq")?,
        };
        let mut created = notification.clone();
        created.id = Some(id);
        created.created = Some(notification.created.unwrap_or_else(now));

        tx.execute(
            "INSERT INTO notifications (id, components, message, level, dismissible, created,
                 start_date, end_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                serde_json::to_string(&created.components)?,
                created.message,
                created.level,
                created.dismissible,
                created.created.as_ref().map(format_datetime),
                created.start_date.as_ref().map(format_datetime),
                created.end_date.as_ref().map(format_datetime),
            ],
        )
        .map_err(|e| {
            translate(
                &tx,
                e,
                &Operation::insert("notifications").value("id", id),
            )
        })?;

        tx.commit()?;
        tracing::debug!(id, "Created notification");
        Ok(created)
    }

    fn get_notification(&self, id: i64) -> Result<Option<Notification>> {
        select_notification(&self.conn(), id)
    }

    fn list_notifications(&self) -> Result<Vec<Notification>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications ORDER BY id"
        ))?;
        let rows = stmt.query_map([], notification_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_active_notifications(&self, at: DateTime<Utc>) -> Result<Vec<Notification>> {
        Ok(self
            .list_notifications()?
            .into_iter()
            .filter(|n| n.is_active_at(&at))
            .collect())
    }

    fn update_notification(&self, notification: &Notification) -> Result<Notification> {
        let id = notification.id.ok_or(Error::Required { field: "id" })?;

        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE notifications
             SET components = ?1, message = ?2, level = ?3, dismissible = ?4,
                 start_date = ?5, end_date = ?6
             WHERE id = ?7",
            params![
                serde_json::to_string(&notification.components)?,
                notification.message,
                notification.level,
                notification.dismissible,
                notification.start_date.as_ref().map(format_datetime),
                notification.end_date.as_ref().map(format_datetime),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound);
        }
        select_notification(&conn, id)?.ok_or(Error::NotFound)
    }

    fn delete_notification(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM notifications WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}
