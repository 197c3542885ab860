use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{SqliteStore, datetime_column, format_datetime, nextval, now, stamp_legacy_audit};
use crate::error::{Error, Result};
use crate::store::StudyStore;
use crate::store::constraint::{Operation, translate};
use crate::types::*;

fn legacy_audit(row: &Row<'_>, idx: usize) -> rusqlite::Result<LegacyAuditColumns> {
    Ok(LegacyAuditColumns {
        created_date: Some(datetime_column(row, idx)?),
        updated_date: Some(datetime_column(row, idx + 1)?),
    })
}

fn study_from_row(row: &Row<'_>) -> rusqlite::Result<Study> {
    Ok(Study {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        audit: legacy_audit(row, 2)?,
    })
}

fn select_study(conn: &Connection, id: i64) -> Result<Option<Study>> {
    conn.query_row(
        "SELECT id, name, created_date, updated_date FROM study WHERE id = ?1",
        params![id],
        study_from_row,
    )
    .optional()
    .map_err(Error::from)
}

impl StudyStore for SqliteStore {
    fn create_study(&self, study: &Study) -> Result<Study> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let id = match study.id {
            Some(id) => id,
            None => nextval(&tx, "study_id_seq")?,
        };
        let created = Study {
            id: Some(id),
            name: study.name.clone(),
            audit: stamp_legacy_audit(study.audit, now()),
        };

        tx.execute(
            "INSERT INTO study (id, name, created_date, updated_date) VALUES (?1, ?2, ?3, ?4)",
            params![
                id,
                created.name,
                created.audit.created_date.as_ref().map(format_datetime),
                created.audit.updated_date.as_ref().map(format_datetime),
            ],
        )
        .map_err(|e| {
            translate(
                &tx,
                e,
                &Operation::insert("study")
                    .value("id", id)
                    .value("name", created.name.clone()),
            )
        })?;

        tx.commit()?;
        Ok(created)
    }

    fn get_study(&self, id: i64) -> Result<Option<Study>> {
        select_study(&self.conn(), id)
    }

    fn get_study_by_name(&self, name: &str) -> Result<Option<Study>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, created_date, updated_date FROM study WHERE name = ?1",
            params![name],
            study_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_studies(&self) -> Result<Vec<Study>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, name, created_date, updated_date FROM study ORDER BY id")?;
        let rows = stmt.query_map([], study_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn rename_study(&self, id: i64, name: &str) -> Result<Study> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE study SET name = ?1, updated_date = ?2 WHERE id = ?3",
                params![name, format_datetime(&now()), id],
            )
            .map_err(|e| {
                translate(
                    &conn,
                    e,
                    &Operation::update("study").value("id", id).value("name", name.to_string()),
                )
            })?;
        if changed == 0 {
            return Err(Error::NotFound);
        }
        select_study(&conn, id)?.ok_or(Error::NotFound)
    }

    fn delete_study(&self, id: i64) -> Result<bool> {
        let conn = self.conn();
        let rows = conn
            .execute("DELETE FROM study WHERE id = ?1", params![id])
            .map_err(|e| translate(&conn, e, &Operation::delete("study").value("id", id)))?;
        Ok(rows > 0)
    }

    fn add_study_program(&self, study_id: i64, program_name: &str) -> Result<StudyProgram> {
        let mut link = StudyProgram::new(study_id, program_name);
        link.audit = stamp_legacy_audit(link.audit, now());

        let conn = self.conn();
        conn.execute(
            "INSERT INTO study_program (study_id, program_name, created_date, updated_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                link.study_id,
                link.program_name,
                link.audit.created_date.as_ref().map(format_datetime),
                link.audit.updated_date.as_ref().map(format_datetime),
            ],
        )
        .map_err(|e| {
            translate(
                &conn,
                e,
                &Operation::insert("study_program").value("study_id", study_id),
            )
        })?;
        Ok(link)
    }

    fn remove_study_program(&self, study_id: i64, program_name: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM study_program WHERE study_id = ?1 AND program_name = ?2",
            params![study_id, program_name],
        )?;
        Ok(rows > 0)
    }

    fn list_study_programs(&self, study_id: i64) -> Result<Vec<StudyProgram>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT study_id, program_name, created_date, updated_date FROM study_program
             WHERE study_id = ?1 ORDER BY program_name",
        )?;
        let rows = stmt.query_map(params![study_id], |row| {
            Ok(StudyProgram {
                study_id: row.get(0)?,
                program_name: row.get(1)?,
                audit: legacy_audit(row, 2)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn add_study_program_project(
        &self,
        study_id: i64,
        program_name: &str,
        project_code: &str,
    ) -> Result<StudyProgramProject> {
        let mut link = StudyProgramProject::new(study_id, program_name, project_code);
        link.audit = stamp_legacy_audit(link.audit, now());

        let conn = self.conn();
        conn.execute(
            "INSERT INTO study_program_project
                 (study_id, program_name, project_code, created_date, updated_date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                link.study_id,
                link.program_name,
                link.project_code,
                link.audit.created_date.as_ref().map(format_datetime),
                link.audit.updated_date.as_ref().map(format_datetime),
            ],
        )
        .map_err(|e| {
            translate(
                &conn,
                e,
                &Operation::insert("study_program_project").value("study_id", study_id),
            )
        })?;
        Ok(link)
    }

    fn remove_study_program_project(
        &self,
        study_id: i64,
        program_name: &str,
        project_code: &str,
    ) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM study_program_project
             WHERE study_id = ?1 AND program_name = ?2 AND project_code = ?3",
            params![study_id, program_name, project_code],
        )?;
        Ok(rows > 0)
    }

    fn list_study_program_projects(&self, study_id: i64) -> Result<Vec<StudyProgramProject>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT study_id, program_name, project_code, created_date, updated_date
             FROM study_program_project
             WHERE study_id = ?1 ORDER BY program_name, project_code",
        )?;
        let rows = stmt.query_map(params![study_id], |row| {
            Ok(StudyProgramProject {
                study_id: row.get(0)?,
                program_name: row.get(1)?,
                project_code: row.get(2)?,
                audit: legacy_audit(row, 3)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_store;
    use super::*;
    use crate::error::ConstraintKind;

    #[test]
    fn test_create_assigns_sequence_ids() {
        let (_temp, store) = test_store();
        let first = store.create_study(&Study::new("TCGA-study")).unwrap();
        let second = store.create_study(&Study::new("TARGET-study")).unwrap();
        assert_eq!(first.id, Some(1));
        assert_eq!(second.id, Some(2));
        assert_eq!(first.audit.created_date, first.audit.updated_date);

        let by_name = store.get_study_by_name("TARGET-study").unwrap().unwrap();
        assert_eq!(by_name, second);
        assert_eq!(store.list_studies().unwrap(), vec![first, second]);
    }

    #[test]
    fn test_duplicate_name_violates_unique_index() {
        let (_temp, store) = test_store();
        store.create_study(&Study::new("dup")).unwrap();

        let err = store.create_study(&Study::new("dup")).unwrap_err();
        let violation = err.integrity().unwrap();
        assert!(violation.is(ConstraintKind::Unique));
        assert_eq!(violation.constraint(), Some("study_name_idx"));
    }

    #[test]
    fn test_rename() {
        let (_temp, store) = test_store();
        let study = store.create_study(&Study::new("old")).unwrap();
        let renamed = store.rename_study(study.id.unwrap(), "new").unwrap();
        assert_eq!(renamed.name, "new");
        assert_eq!(renamed.audit.created_date, study.audit.created_date);
        assert!(matches!(store.rename_study(99, "x"), Err(Error::NotFound)));
    }

    #[test]
    fn test_program_links() {
        let (_temp, store) = test_store();
        let id = store.create_study(&Study::new("s")).unwrap().id.unwrap();

        store.add_study_program(id, "TCGA").unwrap();
        store.add_study_program(id, "CPTAC").unwrap();
        store.add_study_program_project(id, "TARGET", "AML").unwrap();

        let programs: Vec<_> = store
            .list_study_programs(id)
            .unwrap()
            .into_iter()
            .map(|p| p.program_name)
            .collect();
        assert_eq!(programs, vec!["CPTAC", "TCGA"]);
        assert_eq!(store.list_study_program_projects(id).unwrap().len(), 1);

        let err = store.add_study_program(id, "TCGA").unwrap_err();
        assert_eq!(err.integrity().unwrap().constraint(), Some("study_program_pk"));

        assert!(store.remove_study_program(id, "TCGA").unwrap());
        assert!(!store.remove_study_program(id, "TCGA").unwrap());
    }

    #[test]
    fn test_link_to_missing_study() {
        let (_temp, store) = test_store();
        let err = store.add_study_program(42, "TCGA").unwrap_err();
        let violation = err.integrity().unwrap();
        assert!(violation.is(ConstraintKind::ForeignKey));
        assert_eq!(violation.constraint(), Some("study_program_study_id_fk"));
    }

    #[test]
    fn test_delete_blocked_by_links() {
        let (_temp, store) = test_store();
        let id = store.create_study(&Study::new("s")).unwrap().id.unwrap();
        store.add_study_program_project(id, "TARGET", "AML").unwrap();

        let err = store.delete_study(id).unwrap_err();
        assert_eq!(
            err.integrity().unwrap().constraint(),
            Some("study_program_project_study_id_fk")
        );

        assert!(store.remove_study_program_project(id, "TARGET", "AML").unwrap());
        assert!(store.delete_study(id).unwrap());
        assert!(store.get_study(id).unwrap().is_none());
    }
}
