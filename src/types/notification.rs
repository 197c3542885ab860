use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use super::timestamps::iso8601_value;

/// A banner message shown to portal users, optionally within a time window.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Assigned from `notifications_id_seq` when unset at insert.
    pub id: Option<i64>,
    pub components: Vec<String>,
    pub message: Option<String>,
    pub level: Option<String>,
    pub dismissible: bool,
    /// Stamped by the database at insert.
    pub created: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl Default for Notification {
    fn default() -> Self {
        Self {
            id: None,
            components: Vec::new(),
            message: None,
            level: None,
            dismissible: true,
            created: None,
            start_date: None,
            end_date: None,
        }
    }
}

impl Notification {
    pub fn new(message: impl Into<String>, level: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            level: Some(level.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components = components.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_window(
        mut self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_date = start_date;
        self.end_date = end_date;
        self
    }

    /// Start is inclusive, end exclusive; an unset bound is open.
    pub fn is_active_at(&self, at: &DateTime<Utc>) -> bool {
        self.start_date.is_none_or(|start| start <= *at)
            && self.end_date.is_none_or(|end| end > *at)
    }

    pub fn to_dict(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert("id".to_string(), json!(self.id));
        doc.insert("components".to_string(), json!(self.components));
        doc.insert("created".to_string(), iso8601_value(self.created.as_ref()));
        doc.insert("dismissible".to_string(), json!(self.dismissible));
        doc.insert("message".to_string(), json!(self.message));
        doc.insert("level".to_string(), json!(self.level));
        doc.insert(
            "start_date".to_string(),
            iso8601_value(self.start_date.as_ref()),
        );
        doc.insert("end_date".to_string(), iso8601_value(self.end_date.as_ref()));
        doc
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.to_dict())
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Notification(id='{}', level='{}', message='{}')>",
            self.id.map_or_else(|| "null".to_string(), |id| id.to_string()),
            self.level.as_deref().unwrap_or("null"),
            self.message.as_deref().unwrap_or("null"),
        )
    }
}
