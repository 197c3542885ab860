use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value, json};

use super::timestamps::{AuditColumns, display_timestamp, iso8601_value};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchStatus {
    #[default]
    Open,
    Closed,
}

impl BatchStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

impl FromStr for BatchStatus {
    type Err = Error;

    /// Case-insensitive; an empty value is a missing status, not an invalid one.
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::Required { field: "status" });
        }
        match s.to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            _ => Err(Error::invalid_value("status", s)),
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named collection of graph nodes scoped to a project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    /// Assigned from `batch_id_seq` (first value 1000) when unset at insert.
    pub id: Option<i64>,
    pub name: String,
    pub project_id: String,
    /// Unset until persisted; the database defaults it to OPEN.
    pub status: Option<BatchStatus>,
    pub audit: AuditColumns,
    pub members: Vec<BatchMembership>,
}

impl Batch {
    pub fn new(name: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn set_status(&mut self, status: &str) -> Result<()> {
        self.status = Some(status.parse()?);
        Ok(())
    }

    pub fn to_dict(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert("id".to_string(), json!(self.id));
        doc.insert("name".to_string(), json!(self.name));
        doc.insert("project_id".to_string(), json!(self.project_id));
        doc.insert(
            "status".to_string(),
            json!(self.status.map(BatchStatus::as_str)),
        );
        doc.insert(
            "created_datetime".to_string(),
            iso8601_value(self.audit.created_datetime.as_ref()),
        );
        doc.insert(
            "updated_datetime".to_string(),
            iso8601_value(self.audit.updated_datetime.as_ref()),
        );
        doc
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.to_dict())
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Batch(id='{}', name='{}', project_id='{}', status='{}', created_datetime='{}', updated_datetime='{}')>",
            self.id.map_or_else(|| "null".to_string(), |id| id.to_string()),
            self.name,
            self.project_id,
            self.status.map_or("null", BatchStatus::as_str),
            display_timestamp(self.audit.created_datetime.as_ref()),
            display_timestamp(self.audit.updated_datetime.as_ref()),
        )
    }
}

/// Records that a node belongs to a batch. Keyed by `(batch_id, node_id)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchMembership {
    pub batch_id: i64,
    pub node_id: String,
    pub node_type: String,
    pub audit: AuditColumns,
}

impl BatchMembership {
    pub fn new(batch_id: i64, node_id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            batch_id,
            node_id: node_id.into(),
            node_type: node_type.into(),
            audit: AuditColumns::default(),
        }
    }

    pub fn to_dict(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert("batch_id".to_string(), json!(self.batch_id));
        doc.insert("node_id".to_string(), json!(self.node_id));
        doc.insert("node_type".to_string(), json!(self.node_type));
        doc.insert(
            "created_datetime".to_string(),
            iso8601_value(self.audit.created_datetime.as_ref()),
        );
        doc.insert(
            "updated_datetime".to_string(),
            iso8601_value(self.audit.updated_datetime.as_ref()),
        );
        doc
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.to_dict())
    }
}

impl fmt::Display for BatchMembership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<BatchMembership(batch_id='{}', node_id='{}', node_type='{}', created_datetime='{}', updated_datetime='{}')>",
            self.batch_id,
            self.node_id,
            self.node_type,
            display_timestamp(self.audit.created_datetime.as_ref()),
            display_timestamp(self.audit.updated_datetime.as_ref()),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Timelike, Utc};

    use super::*;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 18, hour, 30, 10)
            .unwrap()
            .with_nanosecond(123_000)
            .unwrap()
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("open".parse::<BatchStatus>().unwrap(), BatchStatus::Open);
        assert_eq!("Closed".parse::<BatchStatus>().unwrap(), BatchStatus::Closed);
        assert!(matches!(
            "PENDING".parse::<BatchStatus>(),
            Err(Error::InvalidValue { field: "status", .. })
        ));
        assert!(matches!(
            "".parse::<BatchStatus>(),
            Err(Error::Required { field: "status" })
        ));
    }

    #[test]
    fn test_batch_to_json_with_datetimes() {
        let mut batch = Batch::new("a", "GDC-MISC").with_id(1000);
        batch.set_status("closed").unwrap();
        batch.audit = AuditColumns {
            created_datetime: Some(ts(9)),
            updated_datetime: Some(ts(10)),
        };

        assert_eq!(
            batch.to_json(),
            json!({
                "id": 1000,
                "name": "a",
                "project_id": "GDC-MISC",
                "status": "CLOSED",
                "created_datetime": "2021-01-18T09:30:10.000123+00:00",
                "updated_datetime": "2021-01-18T10:30:10.000123+00:00",
            })
        );
    }

    #[test]
    fn test_batch_to_json_without_datetimes() {
        let batch = Batch::new("a", "GDC-MISC").with_id(1000);
        assert_eq!(
            batch.to_json(),
            json!({
                "id": 1000,
                "name": "a",
                "project_id": "GDC-MISC",
                "status": null,
                "created_datetime": null,
                "updated_datetime": null,
            })
        );
        assert_eq!(batch.to_json(), batch.to_json());
    }

    #[test]
    fn test_batch_display() {
        let mut batch = Batch::new("a", "GDC-MISC").with_id(1000);
        batch.status = Some(BatchStatus::Closed);
        batch.audit = AuditColumns::at(ts(9));
        assert_eq!(
            batch.to_string(),
            "<Batch(id='1000', name='a', project_id='GDC-MISC', status='CLOSED', created_datetime='2021-01-18T09:30:10.000123+00:00', updated_datetime='2021-01-18T09:30:10.000123+00:00')>"
        );
    }

    #[test]
    fn test_membership_to_json_and_display() {
        let mut member = BatchMembership::new(1000, "node_1", "aliquot");
        assert_eq!(
            member.to_json(),
            json!({
                "batch_id": 1000,
                "node_id": "node_1",
                "node_type": "aliquot",
                "created_datetime": null,
                "updated_datetime": null,
            })
        );

        member.audit = AuditColumns::at(ts(9));
        assert_eq!(
            member.to_string(),
            "<BatchMembership(batch_id='1000', node_id='node_1', node_type='aliquot', created_datetime='2021-01-18T09:30:10.000123+00:00', updated_datetime='2021-01-18T09:30:10.000123+00:00')>"
        );
    }
}
