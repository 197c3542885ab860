use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{SqliteStore, datetime_column, format_datetime, nextval, now, stamp_legacy_audit};
use crate::error::{Error, Result};
use crate::store::StudyRuleStore;
use crate::store::constraint::{Operation, translate};
use crate::types::*;

const RULE_COLUMNS: &str = "id, name, created_date, updated_date";

fn legacy_audit(row: &Row<'_>, idx: usize) -> rusqlite::Result<LegacyAuditColumns> {
    Ok(LegacyAuditColumns {
        created_date: Some(datetime_column(row, idx)?),
        updated_date: Some(datetime_column(row, idx + 1)?),
    })
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<StudyRule> {
    Ok(StudyRule {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        audit: legacy_audit(row, 2)?,
        whole_programs: Vec::new(),
        partial_programs: Vec::new(),
    })
}

/// Populates both link collections of `rule`.
fn load_links(conn: &Connection, rule: &mut StudyRule) -> Result<()> {
    let Some(id) = rule.id else {
        return Ok(());
    };

    let mut stmt = conn.prepare(
        "SELECT study_rule_id, program_name, created_date, updated_date
         FROM study_rule_program WHERE study_rule_id = ?1 ORDER BY program_name",
    )?;
    let rows = stmt.query_map(params![id], |row| {
        Ok(StudyRuleProgram {
            study_rule_id: row.get(0)?,
            program_name: row.get(1)?,
            audit: legacy_audit(row, 2)?,
        })
    })?;
    rule.whole_programs = rows.collect::<std::result::Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT study_rule_id, program_name, project_code, created_date, updated_date
         FROM study_rule_program_project WHERE study_rule_id = ?1
         ORDER BY program_name, project_code",
    )?;
    let rows = stmt.query_map(params![id], |row| {
        Ok(StudyRuleProgramProject {
            study_rule_id: row.get(0)?,
            program_name: row.get(1)?,
            project_code: row.get(2)?,
            audit: legacy_audit(row, 3)?,
        })
    })?;
    rule.partial_programs = rows.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(())
}

fn select_rule(
    conn: &Connection,
    column: &str,
    value: &dyn rusqlite::ToSql,
) -> Result<Option<StudyRule>> {
    let rule = conn
        .query_row(
            &format!("SELECT {RULE_COLUMNS} FROM study_rule WHERE {column} = ?1"),
            [value],
            rule_from_row,
        )
        .optional()?;
    match rule {
        Some(mut rule) => {
            load_links(conn, &mut rule)?;
            Ok(Some(rule))
        }
        None => Ok(None),
    }
}

impl StudyRuleStore for SqliteStore {
    /// Inserts the rule together with any links it already carries.
    fn create_study_rule(&self, rule: &StudyRule) -> Result<StudyRule> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let id = match rule.id {
            Some(id) => id,
            None => nextval(&tx, "study_rule_id_seq")?,
        };
        let ts = now();
        let audit = stamp_legacy_audit(rule.audit, ts);

        tx.execute(
            "INSERT INTO study_rule (id, name, created_date, updated_date) VALUES (?1, ?2, ?3, ?4)",
            params![
                id,
                rule.name,
                audit.created_date.as_ref().map(format_datetime),
                audit.updated_date.as_ref().map(format_datetime),
            ],
        )
        .map_err(|e| {
            translate(
                &tx,
                e,
                &Operation::insert("study_rule")
                    .value("id", id)
                    .value("name", rule.name.clone()),
            )
        })?;

        for program in &rule.whole_programs {
            let link_audit = stamp_legacy_audit(program.audit, ts);
            tx.execute(
                "INSERT INTO study_rule_program (study_rule_id, program_name, created_date, updated_date)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    id,
                    program.program_name,
                    link_audit.created_date.as_ref().map(format_datetime),
                    link_audit.updated_date.as_ref().map(format_datetime),
                ],
            )
            .map_err(|e| {
                translate(
                    &tx,
                    e,
                    &Operation::insert("study_rule_program").value("study_rule_id", id),
                )
            })?;
        }
        for project in &rule.partial_programs {
            let link_audit = stamp_legacy_audit(project.audit, ts);
            tx.execute(
                "INSERT INTO study_rule_program_project
                     (study_rule_id, program_name, project_code, created_date, updated_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    project.program_name,
                    project.project_code,
                    link_audit.created_date.as_ref().map(format_datetime),
                    link_audit.updated_date.as_ref().map(format_datetime),
                ],
            )
            .map_err(|e| {
                translate(
                    &tx,
                    e,
                    &Operation::insert("study_rule_program_project").value("study_rule_id", id),
                )
            })?;
        }

        let created = select_rule(&tx, "id", &id)?.ok_or(Error::NotFound)?;
        tx.commit()?;
        Ok(created)
    }

    fn get_study_rule(&self, id: i64) -> Result<Option<StudyRule>> {
        select_rule(&self.conn(), "id", &id)
    }

    fn get_study_rule_by_name(&self, name: &str) -> Result<Option<StudyRule>> {
        select_rule(&self.conn(), "name", &name)
    }

    fn list_study_rules(&self) -> Result<Vec<StudyRule>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {RULE_COLUMNS} FROM study_rule ORDER BY id"))?;
        let mut rules = stmt
            .query_map([], rule_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for rule in &mut rules {
            load_links(&conn, rule)?;
        }
        Ok(rules)
    }

    fn rename_study_rule(&self, id: i64, name: &str) -> Result<StudyRule> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE study_rule SET name = ?1, updated_date = ?2 WHERE id = ?3",
                params![name, format_datetime(&now()), id],
            )
            .map_err(|e| {
                translate(
                    &conn,
                    e,
                    &Operation::update("study_rule")
                        .value("id", id)
                        .value("name", name.to_string()),
                )
            })?;
        if changed == 0 {
            return Err(Error::NotFound);
        }
        select_rule(&conn, "id", &id)?.ok_or(Error::NotFound)
    }

    fn delete_study_rule(&self, id: i64) -> Result<bool> {
        let conn = self.conn();
        let rows = conn
            .execute("DELETE FROM study_rule WHERE id = ?1", params![id])
            .map_err(|e| translate(&conn, e, &Operation::delete("study_rule").value("id", id)))?;
        Ok(rows > 0)
    }

    fn add_study_rule_program(
        &self,
        study_rule_id: i64,
        program_name: &str,
    ) -> Result<StudyRuleProgram> {
        let mut link = StudyRuleProgram::new(study_rule_id, program_name);
        link.audit = stamp_legacy_audit(link.audit, now());

        let conn = self.conn();
        conn.execute(
            "INSERT INTO study_rule_program (study_rule_id, program_name, created_date, updated_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                link.study_rule_id,
                link.program_name,
                link.audit.created_date.as_ref().map(format_datetime),
                link.audit.updated_date.as_ref().map(format_datetime),
            ],
        )
        .map_err(|e| {
            translate(
                &conn,
                e,
                &Operation::insert("study_rule_program").value("study_rule_id", study_rule_id),
            )
        })?;
        Ok(link)
    }

    fn remove_study_rule_program(&self, study_rule_id: i64, program_name: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM study_rule_program WHERE study_rule_id = ?1 AND program_name = ?2",
            params![study_rule_id, program_name],
        )?;
        Ok(rows > 0)
    }

    fn add_study_rule_program_project(
        &self,
        study_rule_id: i64,
        program_name: &str,
        project_code: &str,
    ) -> Result<StudyRuleProgramProject> {
        let mut link = StudyRuleProgramProject::new(study_rule_id, program_name, project_code);
        link.audit = stamp_legacy_audit(link.audit, now());

        let conn = self.conn();
        conn.execute(
            "INSERT INTO study_rule_program_project
                 (study_rule_id, program_name, project_code, created_date, updated_date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                link.study_rule_id,
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
                &Operation::insert("study_rule_program_project")
                    .value("study_rule_id", study_rule_id),
            )
        })?;
        Ok(link)
    }

    fn remove_study_rule_program_project(
        &self,
        study_rule_id: i64,
        program_name: &str,
        project_code: &str,
    ) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM study_rule_program_project
             WHERE study_rule_id = ?1 AND program_name = ?2 AND project_code = ?3",
            params![study_rule_id, program_name, project_code],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_store;
    use super::*;
    use crate::error::ConstraintKind;

    #[test]
    fn test_links_are_loaded_with_rule() {
        let (_temp, store) = test_store();
        let rule = store.create_study_rule(&StudyRule::new("rule-1")).unwrap();
        let id = rule.id.unwrap();
        assert!(rule.whole_programs.is_empty());

        store.add_study_rule_program(id, "TCGA").unwrap();
        store.add_study_rule_program_project(id, "TARGET", "AML").unwrap();
        store.add_study_rule_program_project(id, "TARGET", "ALL-P2").unwrap();

        let loaded = store.get_study_rule(id).unwrap().unwrap();
        assert_eq!(loaded.whole_programs.len(), 1);
        let codes: Vec<_> = loaded
            .partial_programs
            .iter()
            .map(|p| p.project_code.as_str())
            .collect();
        assert_eq!(codes, vec!["ALL-P2", "AML"]);

        assert!(loaded.covers("TCGA", "BRCA"));
        assert!(loaded.covers("TARGET", "AML"));
        assert!(!loaded.covers("TARGET", "NBL"));
    }

    #[test]
    fn test_create_with_links() {
        let (_temp, store) = test_store();
        let mut rule = StudyRule::new("rule-1");
        rule.whole_programs.push(StudyRuleProgram::new(0, "CPTAC"));
        rule.partial_programs
            .push(StudyRuleProgramProject::new(0, "TCGA", "BRCA"));

        let created = store.create_study_rule(&rule).unwrap();
        let id = created.id.unwrap();
        assert_eq!(created.whole_programs[0].study_rule_id, id);
        assert_eq!(created.partial_programs[0].study_rule_id, id);

        let by_name = store.get_study_rule_by_name("rule-1").unwrap().unwrap();
        assert_eq!(by_name, created);
    }

    #[test]
    fn test_unique_name_and_rename() {
        let (_temp, store) = test_store();
        let first = store.create_study_rule(&StudyRule::new("a")).unwrap();
        store.create_study_rule(&StudyRule::new("b")).unwrap();

        let err = store.rename_study_rule(first.id.unwrap(), "b").unwrap_err();
        let violation = err.integrity().unwrap();
        assert!(violation.is(ConstraintKind::Unique));
        assert_eq!(violation.constraint(), Some("study_rule_name_idx"));

        let renamed = store.rename_study_rule(first.id.unwrap(), "c").unwrap();
        assert_eq!(renamed.name, "c");
        assert_eq!(store.list_study_rules().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_requires_unlinking() {
        let (_temp, store) = test_store();
        let id = store
            .create_study_rule(&StudyRule::new("r"))
            .unwrap()
            .id
            .unwrap();
        store.add_study_rule_program(id, "TCGA").unwrap();

        let err = store.delete_study_rule(id).unwrap_err();
        assert_eq!(
            err.integrity().unwrap().constraint(),
            Some("study_rule_program_study_rule_id_fk")
        );

        assert!(store.remove_study_rule_program(id, "TCGA").unwrap());
        assert!(store.delete_study_rule(id).unwrap());
    }

    #[test]
    fn test_link_to_missing_rule() {
        let (_temp, store) = test_store();
        let err = store
            .add_study_rule_program_project(7, "TCGA", "BRCA")
            .unwrap_err();
        assert_eq!(
            err.integrity().unwrap().constraint(),
            Some("study_rule_program_project_study_rule_id_fk")
        );
        assert!(!store.remove_study_rule_program_project(7, "TCGA", "BRCA").unwrap());
    }
}
