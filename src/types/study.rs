//! Studies for single-study controlled access.
//!
//! A study groups whole programs, or individual projects of a program. Link
//! rows reference the study without a cascade, so a study cannot be deleted
//! while anything still points at it.

use std::fmt;

use serde_json::{Value, json};

use super::timestamps::{LegacyAuditColumns, display_timestamp, iso8601_value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Study {
    /// Assigned from `study_id_seq` when unset at insert.
    pub id: Option<i64>,
    pub name: String,
    pub audit: LegacyAuditColumns,
}

impl Study {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "created_date": iso8601_value(self.audit.created_date.as_ref()),
            "updated_date": iso8601_value(self.audit.updated_date.as_ref()),
        })
    }
}

impl fmt::Display for Study {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Study(id={}, name='{}', created_date={}, updated_date={})>",
            self.id.map_or_else(|| "null".to_string(), |id| id.to_string()),
            self.name,
            display_timestamp(self.audit.created_date.as_ref()),
            display_timestamp(self.audit.updated_date.as_ref()),
        )
    }
}

/// Every project of `program_name` belongs to the study.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyProgram {
    pub study_id: i64,
    pub program_name: String,
    pub audit: LegacyAuditColumns,
}

impl StudyProgram {
    pub fn new(study_id: i64, program_name: impl Into<String>) -> Self {
        Self {
            study_id,
            program_name: program_name.into(),
            audit: LegacyAuditColumns::default(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "study_id": self.study_id,
            "program_name": self.program_name,
            "created_date": iso8601_value(self.audit.created_date.as_ref()),
            "updated_date": iso8601_value(self.audit.updated_date.as_ref()),
        })
    }
}

impl fmt::Display for StudyProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<StudyProgram(study_id={}, program_name='{}', created_date={}, updated_date={})>",
            self.study_id,
            self.program_name,
            display_timestamp(self.audit.created_date.as_ref()),
            display_timestamp(self.audit.updated_date.as_ref()),
        )
    }
}

/// One project of a program belongs to the study.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyProgramProject {
    pub study_id: i64,
    pub program_name: String,
    pub project_code: String,
    pub audit: LegacyAuditColumns,
}

impl StudyProgramProject {
    pub fn new(
        study_id: i64,
        program_name: impl Into<String>,
        project_code: impl Into<String>,
    ) -> Self {
        Self {
            study_id,
            program_name: program_name.into(),
            project_code: project_code.into(),
            audit: LegacyAuditColumns::default(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "study_id": self.study_id,
            "program_name": self.program_name,
            "project_code": self.project_code,
            "created_date": iso8601_value(self.audit.created_date.as_ref()),
            "updated_date": iso8601_value(self.audit.updated_date.as_ref()),
        })
    }
}

impl fmt::Display for StudyProgramProject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<StudyProgramProject(study_id={}, program_name='{}', project_code='{}', created_date={}, updated_date={})>",
            self.study_id,
            self.program_name,
            self.project_code,
            display_timestamp(self.audit.created_date.as_ref()),
            display_timestamp(self.audit.updated_date.as_ref()),
        )
    }
}
