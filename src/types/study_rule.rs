use std::fmt;

use serde_json::{Value, json};

use super::timestamps::{LegacyAuditColumns, display_timestamp, iso8601_value};

/// A named access rule over whole programs and program-project pairs.
///
/// Reads through the store always populate both link collections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudyRule {
    /// Assigned from `study_rule_id_seq` when unset at insert.
    pub id: Option<i64>,
    pub name: String,
    pub audit: LegacyAuditColumns,
    pub whole_programs: Vec<StudyRuleProgram>,
    pub partial_programs: Vec<StudyRuleProgramProject>,
}

impl StudyRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Whether `program_name`/`project_code` falls under this rule.
    pub fn covers(&self, program_name: &str, project_code: &str) -> bool {
        self.whole_programs
            .iter()
            .any(|p| p.program_name == program_name)
            || self
                .partial_programs
                .iter()
                .any(|p| p.program_name == program_name && p.project_code == project_code)
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

impl fmt::Display for StudyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<StudyRule(id={}, name='{}', created_date={}, updated_date={})>",
            self.id.map_or_else(|| "null".to_string(), |id| id.to_string()),
            self.name,
            display_timestamp(self.audit.created_date.as_ref()),
            display_timestamp(self.audit.updated_date.as_ref()),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudyRuleProgram {
    pub study_rule_id: i64,
    pub program_name: String,
    pub audit: LegacyAuditColumns,
}

impl StudyRuleProgram {
    pub fn new(study_rule_id: i64, program_name: impl Into<String>) -> Self {
        Self {
            study_rule_id,
            program_name: program_name.into(),
            audit: LegacyAuditColumns::default(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "study_rule_id": self.study_rule_id,
            "program_name": self.program_name,
            "created_date": iso8601_value(self.audit.created_date.as_ref()),
            "updated_date": iso8601_value(self.audit.updated_date.as_ref()),
        })
    }
}

impl fmt::Display for StudyRuleProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<StudyRuleProgram(study_rule_id={}, program_name='{}', created_date={}, updated_date={})>",
            self.study_rule_id,
            self.program_name,
            display_timestamp(self.audit.created_date.as_ref()),
            display_timestamp(self.audit.updated_date.as_ref()),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudyRuleProgramProject {
    pub study_rule_id: i64,
    pub program_name: String,
    pub project_code: String,
    pub audit: LegacyAuditColumns,
}

impl StudyRuleProgramProject {
    pub fn new(
        study_rule_id: i64,
        program_name: impl Into<String>,
        project_code: impl Into<String>,
    ) -> Self {
        Self {
            study_rule_id,
            program_name: program_name.into(),
            project_code: project_code.into(),
            audit: LegacyAuditColumns::default(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "study_rule_id": self.study_rule_id,
            "program_name": self.program_name,
            "project_code": self.project_code,
            "created_date": iso8601_value(self.audit.created_date.as_ref()),
            "updated_date": iso8601_value(self.audit.updated_date.as_ref()),
        })
    }
}

impl fmt::Display for StudyRuleProgramProject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<StudyRuleProgramProject(study_rule_id={}, program_name='{}', project_code='{}', created_date={}, updated_date={})>",
            self.study_rule_id,
            self.program_name,
            self.project_code,
            display_timestamp(self.audit.created_date.as_ref()),
            display_timestamp(self.audit.updated_date.as_ref()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> StudyRule {
        StudyRule {
            id: Some(5),
            name: "rule".to_string(),
            audit: LegacyAuditColumns::default(),
            whole_programs: vec![StudyRuleProgram::new(5, "TARGET")],
            partial_programs: vec![StudyRuleProgramProject::new(5, "TCGA", "BRCA")],
        }
    }

    #[test]
    fn test_covers() {
        let rule = rule();
        assert!(rule.covers("TARGET", "AML"));
        assert!(rule.covers("TCGA", "BRCA"));
        assert!(!rule.covers("TCGA", "LUAD"));
    }

    #[test]
    fn test_to_json_omits_links() {
        let doc = rule().to_json();
        assert_eq!(
            doc,
            json!({
                "id": 5,
                "name": "rule",
                "created_date": null,
                "updated_date": null,
            })
        );
    }

    #[test]
    fn test_link_display() {
        assert_eq!(
            StudyRuleProgram::new(5, "TARGET").to_string(),
            "<StudyRuleProgram(study_rule_id=5, program_name='TARGET', created_date=null, updated_date=null)>"
        );
    }
}
