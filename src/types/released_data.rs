use std::fmt;
use std::str::FromStr;

use serde_json::{Value, json};

use super::timestamps::AuditColumns;
use crate::error::{Error, Result};

/// SQL form of [`ReleasedData::project_id`], usable in `WHERE` clauses.
pub const PROJECT_ID_SQL: &str = "(program_name || '-' || project_code)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleasedDataType {
    Ssm,
    Cnv,
    Case,
}

impl ReleasedDataType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ssm => "ssm",
            Self::Cnv => "cnv",
            Self::Case => "case",
        }
    }
}

impl FromStr for ReleasedDataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ssm" => Ok(Self::Ssm),
            "cnv" => Ok(Self::Cnv),
            "case" => Ok(Self::Case),
            _ => Err(Error::invalid_value("data_type", s)),
        }
    }
}

impl fmt::Display for ReleasedDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseAction {
    Release,
    Unrelease,
}

impl ReleaseAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Unrelease => "unrelease",
        }
    }
}

impl FromStr for ReleaseAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "release" => Ok(Self::Release),
            "unrelease" => Ok(Self::Unrelease),
            _ => Err(Error::invalid_value("action", s)),
        }
    }
}

impl fmt::Display for ReleaseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current release state of one data type within a project.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleasedData {
    pub program_name: String,
    pub project_code: String,
    pub data_type: ReleasedDataType,
    pub is_controlled: bool,
    pub is_open: bool,
    pub audit: AuditColumns,
}

impl ReleasedData {
    /// Fails immediately if `data_type` is not one of ssm, cnv or case.
    pub fn new(
        program_name: impl Into<String>,
        project_code: impl Into<String>,
        data_type: &str,
        is_controlled: bool,
        is_open: bool,
    ) -> Result<Self> {
        Ok(Self {
            program_name: program_name.into(),
            project_code: project_code.into(),
            data_type: data_type.parse()?,
            is_controlled,
            is_open,
            audit: AuditColumns::default(),
        })
    }

    pub fn set_data_type(&mut self, data_type: &str) -> Result<()> {
        self.data_type = data_type.parse()?;
        Ok(())
    }

    /// `{program}_{project}_{data_type}`.
    pub fn id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.program_name, self.project_code, self.data_type
        )
    }

    pub fn project_id(&self) -> String {
        format!("{}-{}", self.program_name, self.project_code)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "program_name": self.program_name,
            "project_code": self.project_code,
            "data_type": self.data_type.as_str(),
            "is_controlled": self.is_controlled,
            "is_open": self.is_open,
        })
    }
}

impl fmt::Display for ReleasedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<ReleasedData(project_id='{}', data_type='{}', is_controlled={}, is_open={})>",
            self.project_id(),
            self.data_type,
            self.is_controlled,
            self.is_open
        )
    }
}

/// One immutable release or unrelease action.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleasedDataLog {
    /// Assigned from `release_data_log_id_seq` at insert.
    pub id: Option<i64>,
    pub program_name: String,
    pub project_code: String,
    pub release_number: String,
    pub data_type: ReleasedDataType,
    pub is_open: bool,
    pub action: ReleaseAction,
    pub audit: AuditColumns,
}

impl ReleasedDataLog {
    pub fn new(
        program_name: impl Into<String>,
        project_code: impl Into<String>,
        release_number: impl Into<String>,
        data_type: &str,
        is_open: bool,
        action: &str,
    ) -> Result<Self> {
        Ok(Self {
            id: None,
            program_name: program_name.into(),
            project_code: project_code.into(),
            release_number: release_number.into(),
            data_type: data_type.parse()?,
            is_open,
            action: action.parse()?,
            audit: AuditColumns::default(),
        })
    }

    pub fn project_id(&self) -> String {
        format!("{}-{}", self.program_name, self.project_code)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "program_name": self.program_name,
            "project_code": self.project_code,
            "release_number": self.release_number,
            "data_type": self.data_type.as_str(),
            "is_open": self.is_open,
            "action": self.action.as_str(),
        })
    }
}

impl fmt::Display for ReleasedDataLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<ReleasedDataLog(project_id='{}', release_number={}, data_type='{}', is_open={}, action='{}')>",
            self.project_id(),
            self.release_number,
            self.data_type,
            self.is_open,
            self.action
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_validation() {
        for data_type in ["cnv", "ssm", "case"] {
            assert!(ReleasedData::new("TCGA", "BRCA", data_type, false, false).is_ok());
        }
        let err = ReleasedData::new("TCGA", "BRCA", "xml", false, false).unwrap_err();
        assert_eq!(err.to_string(), "\"xml\" is not a valid value for data_type");
    }

    #[test]
    fn test_set_data_type_keeps_old_value_on_error() {
        let mut data = ReleasedData::new("TCGA", "BRCA", "cnv", false, false).unwrap();
        assert!(data.set_data_type("not-applicable").is_err());
        assert_eq!(data.data_type, ReleasedDataType::Cnv);
    }

    #[test]
    fn test_derived_ids() {
        let data = ReleasedData::new("name", "code", "cnv", true, false).unwrap();
        assert_eq!(data.id(), "name_code_cnv");
        assert_eq!(data.project_id(), "name-code");
    }

    #[test]
    fn test_log_action_validation() {
        assert!(ReleasedDataLog::new("name", "code", "1", "cnv", false, "release").is_ok());
        assert!(ReleasedDataLog::new("name", "code", "1", "cnv", false, "unrelease").is_ok());
        let err = ReleasedDataLog::new("name", "code", "1", "cnv", false, "publish").unwrap_err();
        assert_eq!(err.to_string(), "\"publish\" is not a valid value for action");
    }

    #[test]
    fn test_log_to_json() {
        let log = ReleasedDataLog::new("name", "code", "32.0", "ssm", true, "release").unwrap();
        assert_eq!(
            log.to_json(),
            json!({
                "program_name": "name",
                "project_code": "code",
                "release_number": "32.0",
                "data_type": "ssm",
                "is_open": true,
                "action": "release",
            })
        );
    }
}
