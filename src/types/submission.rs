//! Audit trail of data submission transactions.
//!
//! A [`TransactionLog`] is one submission attempt, dry run or committed. Its
//! `entities` are per-node before/after diffs and its `documents` are the raw
//! payloads that were submitted. Large columns (`canonical_json`, document
//! bodies) are deferred: the store leaves them `None` until explicitly loaded.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use super::timestamps::{display_timestamp, iso8601};
use crate::error::{Error, Result};

pub const TRANSACTION_LOG_COLUMNS: &[&str] = &[
    "id",
    "submitter",
    "role",
    "program",
    "project",
    "committed_by",
    "is_dry_run",
    "state",
    "closed",
    "created_datetime",
    "canonical_json",
];

pub const TRANSACTION_SNAPSHOT_COLUMNS: &[&str] =
    &["id", "transaction_id", "action", "old_props", "new_props"];

pub const TRANSACTION_DOCUMENT_COLUMNS: &[&str] = &[
    "id",
    "transaction_id",
    "name",
    "doc_format",
    "doc",
    "response_json",
];

const DEFAULT_LOG_FIELDS: &[&str] = &["id", "submitter", "role", "program", "created_datetime"];

const ENTITIES_PREFIX: &str = "entities.";
const DOCUMENTS_PREFIX: &str = "documents.";

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionLog {
    /// Assigned from `transaction_logs_id_seq` when unset at insert.
    pub id: Option<i64>,
    pub submitter: Option<String>,
    pub role: String,
    pub program: String,
    pub project: String,
    pub committed_by: Option<i64>,
    pub is_dry_run: bool,
    pub state: String,
    pub closed: bool,
    pub created_datetime: Option<DateTime<Utc>>,
    /// Deferred. The database default is an empty JSON array.
    pub canonical_json: Option<Value>,
    pub entities: Vec<TransactionSnapshot>,
    pub documents: Vec<TransactionDocument>,
}

impl TransactionLog {
    pub fn new(
        role: impl Into<String>,
        program: impl Into<String>,
        project: impl Into<String>,
        is_dry_run: bool,
        state: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            submitter: None,
            role: role.into(),
            program: program.into(),
            project: project.into(),
            committed_by: None,
            is_dry_run,
            state: state.into(),
            closed: false,
            created_datetime: None,
            canonical_json: None,
            entities: Vec::new(),
            documents: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_submitter(mut self, submitter: impl Into<String>) -> Self {
        self.submitter = Some(submitter.into());
        self
    }

    pub fn project_id(&self) -> String {
        format!("{}-{}", self.program, self.project)
    }

    fn column(&self, name: &str) -> Value {
        match name {
            "id" => json!(self.id),
            "submitter" => json!(self.submitter),
            "role" => json!(self.role),
            "program" => json!(self.program),
            "project" => json!(self.project),
            "committed_by" => json!(self.committed_by),
            "is_dry_run" => json!(self.is_dry_run),
            "state" => json!(self.state),
            "closed" => json!(self.closed),
            "created_datetime" => self
                .created_datetime
                .as_ref()
                .map_or(Value::Null, |dt| Value::String(iso8601(dt))),
            "canonical_json" => self.canonical_json.clone().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Projects the log onto `fields`.
    ///
    /// With no top-level fields the default set is used. `entities.<f>` and
    /// `documents.<f>` select child fields and imply the child collection.
    /// Unknown names fail with [`Error::UnknownFields`].
    pub fn to_json<S: AsRef<str>>(&self, fields: &[S]) -> Result<Value> {
        let mut top: BTreeSet<&str> = BTreeSet::new();
        let mut entity_fields = Vec::new();
        let mut document_fields = Vec::new();
        for field in fields {
            let field = field.as_ref();
            if let Some(child) = field.strip_prefix(ENTITIES_PREFIX) {
                entity_fields.push(child);
            } else if let Some(child) = field.strip_prefix(DOCUMENTS_PREFIX) {
                document_fields.push(child);
            } else {
                top.insert(field);
            }
        }
        if top.is_empty() {
            top.extend(DEFAULT_LOG_FIELDS);
        }

        let unknown: Vec<String> = top
            .iter()
            .filter(|f| {
                !TRANSACTION_LOG_COLUMNS.contains(*f) && **f != "entities" && **f != "documents"
            })
            .map(|f| (*f).to_string())
            .collect();
        if !unknown.is_empty() {
            return Err(Error::UnknownFields {
                entity: "Transaction",
                fields: unknown,
            });
        }

        let mut doc = Map::new();
        for field in top.iter().filter(|f| TRANSACTION_LOG_COLUMNS.contains(*f)) {
            doc.insert((*field).to_string(), self.column(field));
        }
        if top.contains("entities") || !entity_fields.is_empty() {
            let entities = self
                .entities
                .iter()
                .map(|e| e.to_json(entity_fields.as_slice()))
                .collect::<Result<Vec<_>>>()?;
            doc.insert("entities".to_string(), Value::Array(entities));
        }
        if top.contains("documents") || !document_fields.is_empty() {
            let documents = self
                .documents
                .iter()
                .map(|d| d.to_json(document_fields.as_slice()))
                .collect::<Result<Vec<_>>>()?;
            doc.insert("documents".to_string(), Value::Array(documents));
        }
        Ok(Value::Object(doc))
    }
}

impl fmt::Display for TransactionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<TransactionLog({}, {})>",
            self.id.map_or_else(|| "null".to_string(), |id| id.to_string()),
            display_timestamp(self.created_datetime.as_ref()),
        )
    }
}

/// Projects a child row: every column when `fields` is empty.
fn project_child<F>(
    entity: &'static str,
    columns: &[&str],
    fields: &[&str],
    column: F,
) -> Result<Value>
where
    F: Fn(&str) -> Value,
{
    let selected: BTreeSet<&str> = if fields.is_empty() {
        columns.iter().copied().collect()
    } else {
        fields.iter().copied().collect()
    };
    let unknown: Vec<String> = selected
        .iter()
        .filter(|f| !columns.contains(*f))
        .map(|f| (*f).to_string())
        .collect();
    if !unknown.is_empty() {
        return Err(Error::UnknownFields {
            entity,
            fields: unknown,
        });
    }
    Ok(Value::Object(
        selected
            .into_iter()
            .map(|f| (f.to_string(), column(f)))
            .collect(),
    ))
}

/// Before/after properties of one node touched by a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionSnapshot {
    pub id: String,
    /// Filled in by the store from the owning log.
    pub transaction_id: Option<i64>,
    pub action: String,
    pub old_props: Value,
    pub new_props: Value,
}

impl TransactionSnapshot {
    pub fn new(
        id: impl Into<String>,
        action: impl Into<String>,
        old_props: Value,
        new_props: Value,
    ) -> Self {
        Self {
            id: id.into(),
            transaction_id: None,
            action: action.into(),
            old_props,
            new_props,
        }
    }

    pub fn to_json<S: AsRef<str>>(&self, fields: &[S]) -> Result<Value> {
        let fields: Vec<&str> = fields.iter().map(|f| f.as_ref()).collect();
        project_child("Entity", TRANSACTION_SNAPSHOT_COLUMNS, &fields, |name| {
            match name {
                "id" => json!(self.id),
                "transaction_id" => json!(self.transaction_id),
                "action" => json!(self.action),
                "old_props" => self.old_props.clone(),
                "new_props" => self.new_props.clone(),
                _ => Value::Null,
            }
        })
    }
}

impl fmt::Display for TransactionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<TransactionSnapshot({}, {})>",
            self.id,
            self.transaction_id
                .map_or_else(|| "null".to_string(), |id| id.to_string()),
        )
    }
}

/// A submitted document. `doc_format` decides how `doc` is read back.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDocument {
    /// Assigned from `transaction_documents_id_seq` when unset at insert.
    pub id: Option<i64>,
    pub transaction_id: Option<i64>,
    pub name: Option<String>,
    pub doc_format: String,
    /// Deferred.
    pub doc: Option<String>,
    /// Deferred.
    pub response_json: Option<Value>,
}

impl TransactionDocument {
    pub fn from_json(doc: &Value) -> Result<Self> {
        let mut document = Self::empty();
        document.set_json(doc)?;
        Ok(document)
    }

    pub fn from_xml(doc: impl Into<String>) -> Self {
        let mut document = Self::empty();
        document.set_xml(doc);
        document
    }

    fn empty() -> Self {
        Self {
            id: None,
            transaction_id: None,
            name: None,
            doc_format: String::new(),
            doc: None,
            response_json: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_json(&self) -> bool {
        self.doc_format.eq_ignore_ascii_case("JSON")
    }

    pub fn is_xml(&self) -> bool {
        self.doc_format.eq_ignore_ascii_case("XML")
    }

    /// Parsed body when the format is JSON and the body is loaded.
    pub fn json(&self) -> Result<Option<Value>> {
        if !self.is_json() {
            return Ok(None);
        }
        self.doc
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(Error::from)
    }

    pub fn set_json(&mut self, doc: &Value) -> Result<()> {
        let body = serde_json::to_string(doc)?;
        self.doc_format = "JSON".to_string();
        self.doc = Some(body);
        Ok(())
    }

    pub fn xml(&self) -> Option<&str> {
        if !self.is_xml() {
            return None;
        }
        self.doc.as_deref()
    }

    pub fn set_xml(&mut self, doc: impl Into<String>) {
        self.doc_format = "XML".to_string();
        self.doc = Some(doc.into());
    }

    pub fn to_json<S: AsRef<str>>(&self, fields: &[S]) -> Result<Value> {
        let fields: Vec<&str> = fields.iter().map(|f| f.as_ref()).collect();
        project_child("Document", TRANSACTION_DOCUMENT_COLUMNS, &fields, |name| {
            match name {
                "id" => json!(self.id),
                "transaction_id" => json!(self.transaction_id),
                "name" => json!(self.name),
                "doc_format" => json!(self.doc_format),
                "doc" => json!(self.doc),
                "response_json" => self.response_json.clone().unwrap_or(Value::Null),
                _ => Value::Null,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn log() -> TransactionLog {
        let mut log = TransactionLog::new("create", "TCGA", "BRCA", true, "SUCCEEDED")
            .with_submitter("user");
        log.id = Some(11);
        log.created_datetime = Some(Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap());
        log.entities.push(TransactionSnapshot {
            transaction_id: Some(11),
            ..TransactionSnapshot::new("node-1", "update", json!({"a": 1}), json!({"a": 2}))
        });
        let mut document = TransactionDocument::from_json(&json!({"type": "case"})).unwrap();
        document.id = Some(4);
        document.transaction_id = Some(11);
        log.documents.push(document);
        log
    }

    #[test]
    fn test_default_projection() {
        let doc = log().to_json::<&str>(&[]).unwrap();
        assert_eq!(
            doc,
            json!({
                "id": 11,
                "submitter": "user",
                "role": "create",
                "program": "TCGA",
                "created_datetime": "2020-01-02T03:04:05+00:00",
            })
        );
    }

    #[test]
    fn test_child_fields_imply_collection() {
        let doc = log()
            .to_json(&["state", "entities.id", "documents.doc_format"])
            .unwrap();
        assert_eq!(
            doc,
            json!({
                "state": "SUCCEEDED",
                "entities": [{"id": "node-1"}],
                "documents": [{"doc_format": "JSON"}],
            })
        );
    }

    #[test]
    fn test_entities_default_to_all_columns() {
        let doc = log().to_json(&["id", "entities"]).unwrap();
        assert_eq!(
            doc["entities"],
            json!([{
                "id": "node-1",
                "transaction_id": 11,
                "action": "update",
                "old_props": {"a": 1},
                "new_props": {"a": 2},
            }])
        );
        assert!(doc.get("documents").is_none());
    }

    #[test]
    fn test_unknown_fields() {
        let err = log().to_json(&["id", "zeta", "alpha"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Transaction fields do not exist: alpha, zeta"
        );

        let err = log().to_json(&["entities.bogus"]).unwrap_err();
        assert!(matches!(err, Error::UnknownFields { entity: "Entity", .. }));

        // project_id is derived, not a column.
        assert!(log().to_json(&["project_id"]).is_err());
    }

    #[test]
    fn test_document_format_switch() {
        let mut document = TransactionDocument::from_xml("<case/>");
        assert!(document.is_xml());
        assert_eq!(document.xml(), Some("<case/>"));
        assert_eq!(document.json().unwrap(), None);

        document.set_json(&json!([1, 2])).unwrap();
        assert!(document.is_json());
        assert_eq!(document.xml(), None);
        assert_eq!(document.json().unwrap(), Some(json!([1, 2])));

        document.doc_format = "json".to_string();
        assert!(document.is_json());
    }

    #[test]
    fn test_project_id() {
        assert_eq!(log().project_id(), "TCGA-BRCA");
        assert_eq!(
            log().to_string(),
            "<TransactionLog(11, 2020-01-02T03:04:05+00:00)>"
        );
    }
}
