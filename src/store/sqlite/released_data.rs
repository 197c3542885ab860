use rusqlite::{OptionalExtension, Row, params};

use super::{SqliteStore, datetime_column, format_datetime, nextval, now, parse_column, stamp_audit};
use crate::error::{Error, Result};
use crate::store::ReleasedDataStore;
use crate::store::constraint::{Operation, translate};
use crate::types::*;

const DATA_COLUMNS: &str = "program_name, project_code, data_type, is_controlled, is_open, \
    created_datetime, updated_datetime";
const LOG_COLUMNS: &str = "id, program_name, project_code, release_number, data_type, is_open, \
    action, created_datetime, updated_datetime";

fn data_from_row(row: &Row<'_>) -> rusqlite::Result<ReleasedData> {
    Ok(ReleasedData {
        program_name: row.get(0)?,
        project_code: row.get(1)?,
        data_type: parse_column(row, 2)?,
        is_controlled: row.get(3)?,
        is_open: row.get(4)?,
        audit: AuditColumns {
            created_datetime: Some(datetime_column(row, 5)?),
            updated_datetime: Some(datetime_column(row, 6)?),
        },
    })
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<ReleasedDataLog> {
    Ok(ReleasedDataLog {
        id: Some(row.get(0)?),
        program_name: row.get(1)?,
        project_code: row.get(2)?,
        release_number: row.get(3)?,
        data_type: parse_column(row, 4)?,
        is_open: row.get(5)?,
        action: parse_column(row, 6)?,
        audit: AuditColumns {
            created_datetime: Some(datetime_column(row, 7)?),
            updated_datetime: Some(datetime_column(row, 8)?),
        },
    })
}

impl ReleasedDataStore for SqliteStore {
    fn upsert_released_data(&self, data: &ReleasedData) -> Result<ReleasedData> {
        let audit = stamp_audit(data.audit, now());

        let conn = self.conn();
        conn.execute(
            "INSERT INTO released_data (program_name, project_code, data_type, is_controlled,
                 is_open, created_datetime, updated_datetime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (program_name, project_code, data_type) DO UPDATE SET
                 is_controlled = excluded.is_controlled,
                 is_open = excluded.is_open,
                 updated_datetime = ?8",
            params![
                data.program_name,
                data.project_code,
                data.data_type.as_str(),
                data.is_controlled,
                data.is_open,
                audit.created_datetime.as_ref().map(format_datetime),
                audit.updated_datetime.as_ref().map(format_datetime),
                format_datetime(&now()),
            ],
        )
        .map_err(|e| translate(&conn, e, &Operation::insert("released_data")))?;

        conn.query_row(
            &format!(
                "SELECT {DATA_COLUMNS} FROM released_data
                 WHERE program_name = ?1 AND project_code = ?2 AND data_type = ?3"
            ),
            params![data.program_name, data.project_code, data.data_type.as_str()],
            data_from_row,
        )
        .map_err(Error::from)
    }

    fn get_released_data(
        &self,
        program_name: &str,
        project_code: &str,
        data_type: ReleasedDataType,
    ) -> Result<Option<ReleasedData>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {DATA_COLUMNS} FROM released_data
                 WHERE program_name = ?1 AND project_code = ?2 AND data_type = ?3"
            ),
            params![program_name, project_code, data_type.as_str()],
            data_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_released_data(&self, project_id: &str) -> Result<Vec<ReleasedData>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DATA_COLUMNS} FROM released_data WHERE {PROJECT_ID_SQL} = ?1
             ORDER BY data_type"
        ))?;
        let rows = stmt.query_map(params![project_id], data_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_released_data(
        &self,
        program_name: &str,
        project_code: &str,
        data_type: ReleasedDataType,
    ) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM released_data
             WHERE program_name = ?1 AND project_code = ?2 AND data_type = ?3",
            params![program_name, project_code, data_type.as_str()],
        )?;
        Ok(rows > 0)
    }

    fn append_release_log(&self, log: &ReleasedDataLog) -> Result<ReleasedDataLog> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let id = match log.id {
            Some(id) => id,
            None => nextval(&tx, "release_data_log_id_seq")?,
        };
        let mut created = log.clone();
        created.id = Some(id);
        created.audit = stamp_audit(log.audit, now());

        tx.execute(
            "INSERT INTO released_data_log (id, program_name, project_code, release_number,
                 data_type, is_open, action, created_datetime, updated_datetime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                created.program_name,
                created.project_code,
                created.release_number,
                created.data_type.as_str(),
                created.is_open,
                created.action.as_str(),
                created.audit.created_datetime.as_ref().map(format_datetime),
                created.audit.updated_datetime.as_ref().map(format_datetime),
            ],
        )
        .map_err(|e| {
            translate(
                &tx,
                e,
                &Operation::insert("released_data_log").value("id", id),
            )
        })?;

        tx.commit()?;
        Ok(created)
    }

    fn list_release_logs(&self, project_id: &str) -> Result<Vec<ReleasedDataLog>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM released_data_log WHERE {PROJECT_ID_SQL} = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![project_id], log_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn latest_release_log(
        &self,
        project_id: &str,
        data_type: ReleasedDataType,
    ) -> Result<Option<ReleasedDataLog>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {LOG_COLUMNS} FROM released_data_log
                 WHERE {PROJECT_ID_SQL} = ?1 AND data_type = ?2
                 ORDER BY id DESC LIMIT 1"
            ),
            params![project_id, data_type.as_str()],
            log_from_row,
        )
        .optional()
        .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_store;
    use super::*;

    #[test]
    fn test_upsert_updates_flags_in_place() {
        let (_temp, store) = test_store();
        let data = ReleasedData::new("TCGA", "BRCA", "ssm", true, false).unwrap();
        let first = store.upsert_released_data(&data).unwrap();
        assert!(!first.is_open);

        let mut reopened = data.clone();
        reopened.is_open = true;
        let second = store.upsert_released_data(&reopened).unwrap();
        assert!(second.is_open);
        assert_eq!(second.audit.created_datetime, first.audit.created_datetime);

        let all = store.list_released_data("TCGA-BRCA").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id(), "TCGA_BRCA_ssm");
    }

    #[test]
    fn test_list_by_derived_project_id() {
        let (_temp, store) = test_store();
        for data_type in ["ssm", "cnv"] {
            store
                .upsert_released_data(&ReleasedData::new("TCGA", "BRCA", data_type, false, true).unwrap())
                .unwrap();
        }
        store
            .upsert_released_data(&ReleasedData::new("TARGET", "AML", "case", false, true).unwrap())
            .unwrap();

        assert_eq!(store.list_released_data("TCGA-BRCA").unwrap().len(), 2);
        assert!(
            store
                .get_released_data("TARGET", "AML", ReleasedDataType::Case)
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .delete_released_data("TARGET", "AML", ReleasedDataType::Case)
                .unwrap()
        );
        assert!(store.list_released_data("TARGET-AML").unwrap().is_empty());
    }

    #[test]
    fn test_release_log_ordering() {
        let (_temp, store) = test_store();
        let release = ReleasedDataLog::new("TCGA", "BRCA", "30.0", "ssm", true, "release").unwrap();
        let unrelease =
            ReleasedDataLog::new("TCGA", "BRCA", "31.0", "ssm", false, "unrelease").unwrap();

        let first = store.append_release_log(&release).unwrap();
        let second = store.append_release_log(&unrelease).unwrap();
        assert_eq!(first.id, Some(1));
        assert_eq!(second.id, Some(2));

        let logs = store.list_release_logs("TCGA-BRCA").unwrap();
        assert_eq!(logs, vec![first, second.clone()]);

        let mut previous = second.id.unwrap();
        for n in 0..10 {
            let log = ReleasedDataLog::new("TARGET", "AML", format!("{n}.0"), "case", true, "release")
                .unwrap();
            let id = store.append_release_log(&log).unwrap().id.unwrap();
            assert!(id > previous);
            previous = id;
        }
        let ids: Vec<i64> = store
            .list_release_logs("TARGET-AML")
            .unwrap()
            .iter()
            .filter_map(|log| log.id)
            .collect();
        assert_eq!(ids.len(), 10);
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

        let latest = store
            .latest_release_log("TCGA-BRCA", ReleasedDataType::Ssm)
            .unwrap()
            .unwrap();
        assert_eq!(latest, second);
        assert_eq!(latest.action, ReleaseAction::Unrelease);
        assert!(
            store
                .latest_release_log("TCGA-BRCA", ReleasedDataType::Cnv)
                .unwrap()
                .is_none()
        );
    }
}
