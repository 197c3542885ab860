use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use super::timestamps::iso8601_value;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestRunStatus {
    #[default]
    Pending,
    Running,
    Success,
    Error,
    Failed,
}

impl TestRunStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
            Self::Failed => "FAILED",
        }
    }
}

impl FromStr for TestRunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "SUCCESS" => Ok(Self::Success),
            "ERROR" => Ok(Self::Error),
            "FAILED" => Ok(Self::Failed),
            _ => Err(Error::invalid_value("status", s)),
        }
    }
}

impl fmt::Display for TestRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Warning,
    Passed,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::Warning => "WARNING",
            Self::Passed => "PASSED",
        }
    }

    /// Parses a reported severity. Input is upper-cased and `FATAL` maps to
    /// `CRITICAL`; an empty value means no severity.
    pub fn normalize(raw: &str) -> Result<Option<Self>> {
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some)
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" | "FATAL" => Ok(Self::Critical),
            "WARNING" => Ok(Self::Warning),
            "PASSED" => Ok(Self::Passed),
            _ => Err(Error::invalid_value("severity", s)),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One QC test execution against an entity of a project.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRun {
    /// Assigned from `qc_test_runs_id_seq` when unset at insert.
    pub id: Option<i64>,
    pub project_id: String,
    pub entity_id: String,
    pub test_type: String,
    pub is_stale: bool,
    pub status: TestRunStatus,
    pub date_created: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub test_results: Vec<ValidationResult>,
}

impl TestRun {
    pub fn new(
        project_id: impl Into<String>,
        entity_id: impl Into<String>,
        test_type: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            project_id: project_id.into(),
            entity_id: entity_id.into(),
            test_type: test_type.into(),
            is_stale: false,
            status: TestRunStatus::default(),
            date_created: None,
            last_updated: None,
            test_results: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "project_id": self.project_id,
            "entity_id": self.entity_id,
            "test_type": self.test_type,
            "status": self.status.as_str(),
            "date_created": iso8601_value(self.date_created.as_ref()),
            "last_updated": iso8601_value(self.last_updated.as_ref()),
        })
    }
}

impl fmt::Display for TestRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<TestRun(id='{}', test_type='{}', status='{}')>",
            self.id.map_or_else(|| "null".to_string(), |id| id.to_string()),
            self.test_type,
            self.status
        )
    }
}

/// A single finding from a test run, keyed by `(id, test_run_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// Assigned from `qc_validation_results_id_seq` when unset at insert.
    pub id: Option<i64>,
    pub test_run_id: Option<i64>,
    pub node_id: String,
    pub submitter_id: String,
    pub error_type: Option<String>,
    pub node_type: String,
    pub message: String,
    pub severity: Option<Severity>,
    pub related_nodes: Option<Value>,
    pub date_created: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ValidationResult {
    pub fn new(
        node_id: impl Into<String>,
        submitter_id: impl Into<String>,
        node_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            test_run_id: None,
            node_id: node_id.into(),
            submitter_id: submitter_id.into(),
            error_type: Some(String::new()),
            node_type: node_type.into(),
            message: message.into(),
            severity: None,
            related_nodes: None,
            date_created: None,
            last_updated: None,
        }
    }

    pub fn set_severity(&mut self, raw: &str) -> Result<()> {
        self.severity = Severity::normalize(raw)?;
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        json!({
            "node_id": self.node_id,
            "submitter_id": self.submitter_id,
            "error": self.error_type,
            "severity": self.severity.map(Severity::as_str),
            "message": self.message,
            "related_nodes": self.related_nodes,
            "date_created": iso8601_value(self.date_created.as_ref()),
            "last_updated": iso8601_value(self.last_updated.as_ref()),
        })
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<ValidationResult(id={}, error='{}')>",
            self.id.map_or_else(|| "null".to_string(), |id| id.to_string()),
            self.error_type.as_deref().unwrap_or("null")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_normalization() {
        assert_eq!(Severity::normalize("fatal").unwrap(), Some(Severity::Critical));
        assert_eq!(Severity::normalize("Warning").unwrap(), Some(Severity::Warning));
        assert_eq!(Severity::normalize("").unwrap(), None);
        assert!(Severity::normalize("info").is_err());
    }

    #[test]
    fn test_result_defaults_and_json() {
        let mut result = ValidationResult::new("node-1", "sub-1", "case", "missing field");
        result.set_severity("FATAL").unwrap();
        assert_eq!(
            result.to_json(),
            json!({
                "node_id": "node-1",
                "submitter_id": "sub-1",
                "error": "",
                "severity": "CRITICAL",
                "message": "missing field",
                "related_nodes": null,
                "date_created": null,
                "last_updated": null,
            })
        );
    }

    #[test]
    fn test_run_defaults() {
        let run = TestRun::new("TCGA-BRCA", "entity-1", "file_check");
        assert_eq!(run.status, TestRunStatus::Pending);
        assert!(!run.is_stale);
        assert_eq!(
            run.to_string(),
            "<TestRun(id='null', test_type='file_check', status='PENDING')>"
        );
        assert!("DONE".parse::<TestRunStatus>().is_err());
    }
}
