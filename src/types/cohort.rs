//! Cohorts: saved case searches authorized by an anonymous context.
//!
//! A cohort owns a backward-linked history of filters. Each new filter points
//! at the one it replaces through `parent_id`; the current filter is simply
//! the one with the highest id. A filter may carry one immutable snapshot of
//! the case ids it matched under a given data release.

use std::fmt;
use std::str::FromStr;

use serde_json::{Value, json};
use uuid::Uuid;

use super::timestamps::{AuditColumns, iso8601_value};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct AnonymousContext {
    pub id: Uuid,
    pub name: String,
    pub audit: AuditColumns,
}

impl AnonymousContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            audit: AuditColumns::default(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "name": self.name,
            "created_datetime": iso8601_value(self.audit.created_datetime.as_ref()),
            "updated_datetime": iso8601_value(self.audit.updated_datetime.as_ref()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cohort {
    pub id: Uuid,
    pub name: String,
    pub context_id: Uuid,
    pub audit: AuditColumns,
}

impl Cohort {
    pub fn new(name: impl Into<String>, context_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            context_id,
            audit: AuditColumns::default(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "name": self.name,
            "context_id": self.context_id.to_string(),
            "created_datetime": iso8601_value(self.audit.created_datetime.as_ref()),
            "updated_datetime": iso8601_value(self.audit.updated_datetime.as_ref()),
        })
    }
}

/// Whether a cohort's case set is frozen by snapshot or recomputed per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CohortType {
    #[default]
    Static,
    Dynamic,
}

impl CohortType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
        }
    }
}

impl FromStr for CohortType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "static" => Ok(Self::Static),
            "dynamic" => Ok(Self::Dynamic),
            _ => Err(Error::invalid_value("cohort_type", s)),
        }
    }
}

impl fmt::Display for CohortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CohortFilter {
    /// Assigned from `cohort_filter_id_seq` when unset at insert.
    pub id: Option<i64>,
    pub parent_id: Option<i64>,
    pub cohort_id: Uuid,
    /// Required; `Value::Null` is stored as SQL NULL and rejected.
    pub filters: Value,
    pub cohort_type: CohortType,
    pub audit: AuditColumns,
}

impl CohortFilter {
    pub fn new(cohort_id: Uuid, filters: Value) -> Self {
        Self {
            id: None,
            parent_id: None,
            cohort_id,
            filters,
            cohort_type: CohortType::default(),
            audit: AuditColumns::default(),
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    #[must_use]
    pub fn with_type(mut self, cohort_type: CohortType) -> Self {
        self.cohort_type = cohort_type;
        self
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "parent_id": self.parent_id,
            "cohort_id": self.cohort_id.to_string(),
            "filters": self.filters,
            "cohort_type": self.cohort_type.as_str(),
            "created_datetime": iso8601_value(self.audit.created_datetime.as_ref()),
            "updated_datetime": iso8601_value(self.audit.updated_datetime.as_ref()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CohortSnapshot {
    pub id: Option<i64>,
    pub filter_id: i64,
    pub data_release: Uuid,
    pub case_ids: Vec<Uuid>,
    pub audit: AuditColumns,
}

impl CohortSnapshot {
    pub fn new(filter_id: i64, data_release: Uuid, case_ids: Vec<Uuid>) -> Self {
        Self {
            id: None,
            filter_id,
            data_release,
            case_ids,
            audit: AuditColumns::default(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "filter_id": self.filter_id,
            "data_release": self.data_release.to_string(),
            "case_ids": self.case_ids.iter().map(Uuid::to_string).collect::<Vec<_>>(),
            "created_datetime": iso8601_value(self.audit.created_datetime.as_ref()),
            "updated_datetime": iso8601_value(self.audit.updated_datetime.as_ref()),
        })
    }
}
