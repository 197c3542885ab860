//! Redaction events. A [`RedactionLog`] records why and by whom a set of nodes
//! was redacted; each redacted node is a [`RedactionEntry`]. Rescinding
//! happens per entry, and a log counts as rescinded once all of its entries are.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedactionType {
    /// Only the latest version is redacted.
    Latest,
    /// Every version is redacted.
    #[default]
    Complete,
    /// Every version before the latest is redacted.
    Previous,
}

impl RedactionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Latest => "LATEST",
            Self::Complete => "COMPLETE",
            Self::Previous => "PREVIOUS",
        }
    }
}

impl FromStr for RedactionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "LATEST" => Ok(Self::Latest),
            "COMPLETE" => Ok(Self::Complete),
            "PREVIOUS" => Ok(Self::Previous),
            _ => Err(Error::invalid_value("redaction_type", s)),
        }
    }
}

impl fmt::Display for RedactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedactionLog {
    /// Assigned from `redaction_log_id_seq` when unset at insert.
    pub id: Option<i64>,
    pub annotation_id: String,
    pub initiated_by: String,
    pub rescinded_by: Option<String>,
    pub reason: String,
    pub reason_category: String,
    pub project_id: String,
    pub redaction_type: RedactionType,
    pub created_datetime: Option<DateTime<Utc>>,
    pub date_rescinded: Option<DateTime<Utc>>,
    pub entries: Vec<RedactionEntry>,
}

impl RedactionLog {
    pub fn new(
        annotation_id: impl Into<String>,
        project_id: impl Into<String>,
        initiated_by: impl Into<String>,
        reason: impl Into<String>,
        reason_category: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            annotation_id: annotation_id.into(),
            initiated_by: initiated_by.into(),
            rescinded_by: None,
            reason: reason.into(),
            reason_category: reason_category.into(),
            project_id: project_id.into(),
            redaction_type: RedactionType::default(),
            created_datetime: None,
            date_rescinded: None,
            entries: Vec::new(),
        }
    }

    /// Text before the first `-` of the project id.
    pub fn program(&self) -> &str {
        self.project_id
            .split_once('-')
            .map_or(self.project_id.as_str(), |(program, _)| program)
    }

    /// Text after the first `-` of the project id; empty without one.
    pub fn project(&self) -> &str {
        self.project_id
            .split_once('-')
            .map_or("", |(_, project)| project)
    }

    /// True when every entry has been rescinded, including when there are none.
    pub fn is_rescinded(&self) -> bool {
        self.entries.iter().all(|entry| entry.rescinded)
    }

    /// Stamps the log and every entry as rescinded at `at`.
    pub fn rescind_all(&mut self, rescinded_by: &str, at: DateTime<Utc>) {
        self.rescinded_by = Some(rescinded_by.to_string());
        self.date_rescinded = Some(at);
        for entry in &mut self.entries {
            entry.rescind(rescinded_by, at);
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "annotation_id": self.annotation_id,
            "project_id": self.project_id,
            "initiated_by": self.initiated_by,
            "reason": self.reason,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedactionEntry {
    pub node_id: String,
    /// Filled in by the store from the owning log.
    pub redaction_id: Option<i64>,
    pub version: Option<String>,
    pub file_name: Option<String>,
    pub node_type: String,
    pub release_number: Option<String>,
    pub rescinded: bool,
    pub rescinded_by: Option<String>,
    pub created_datetime: Option<DateTime<Utc>>,
    pub date_rescinded: Option<DateTime<Utc>>,
}

impl RedactionEntry {
    pub fn new(node_id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            redaction_id: None,
            version: None,
            file_name: None,
            node_type: node_type.into(),
            release_number: None,
            rescinded: false,
            rescinded_by: None,
            created_datetime: None,
            date_rescinded: None,
        }
    }

    #[must_use]
    pub fn with_file(mut self, file_name: impl Into<String>, version: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_release(mut self, release_number: impl Into<String>) -> Self {
        self.release_number = Some(release_number.into());
        self
    }

    /// Entries backed by a file in the index carry its name.
    pub fn is_indexed(&self) -> bool {
        self.file_name.is_some()
    }

    pub fn rescind(&mut self, rescinded_by: &str, at: DateTime<Utc>) {
        self.rescinded = true;
        self.rescinded_by = Some(rescinded_by.to_string());
        self.date_rescinded = Some(at);
    }

    pub fn to_json(&self) -> Value {
        json!({
            "node_id": self.node_id,
            "redaction_id": self.redaction_id,
            "is_indexed": self.is_indexed(),
            "node_type": self.node_type,
            "rescinded": self.rescinded,
        })
    }
}
