//! Persisted sets of entity ids, all of one entity type.
//!
//! Ephemeral sets are transient query accelerators; frozen sets are
//! immutable and referenced from cohort filters; mutable sets are persistent
//! and updated by backend services.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use super::timestamps::{AuditColumns, iso8601_value};
use crate::error::{Error, Result};

pub const MAX_ENTITY_SET_ID_LEN: usize = 128;
pub const MAX_ENTITY_ID_LEN: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetType {
    Ephemeral,
    Frozen,
    Mutable,
}

impl SetType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ephemeral => "ephemeral",
            Self::Frozen => "frozen",
            Self::Mutable => "mutable",
        }
    }
}

impl FromStr for SetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            // "ephmeral" is the spelling older rows were written with.
            "ephemeral" | "ephmeral" => Ok(Self::Ephemeral),
            "frozen" => Ok(Self::Frozen),
            "mutable" => Ok(Self::Mutable),
            _ => Err(Error::invalid_value("type", s)),
        }
    }
}

impl fmt::Display for SetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Case,
    File,
    Gene,
    Ssm,
}

impl EntityType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Case => "case",
            Self::File => "file",
            Self::Gene => "gene",
            Self::Ssm => "ssm",
        }
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "case" => Ok(Self::Case),
            "file" => Ok(Self::File),
            "gene" => Ok(Self::Gene),
            "ssm" => Ok(Self::Ssm),
            _ => Err(Error::invalid_value("entity_type", s)),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntitySet {
    /// Client supplied; there is no generated default.
    pub id: String,
    pub set_type: SetType,
    pub entity_type: EntityType,
    pub entity_ids: Vec<String>,
    pub audit: AuditColumns,
    pub accessed_datetime: Option<DateTime<Utc>>,
}

impl EntitySet {
    pub fn new(
        id: impl Into<String>,
        set_type: SetType,
        entity_type: EntityType,
        entity_ids: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            set_type,
            entity_type,
            entity_ids,
            audit: AuditColumns::default(),
            accessed_datetime: None,
        }
    }

    /// Checks the rules the column types cannot express: a non-empty id,
    /// bounded lengths, and no repeated entity ids.
    pub fn validate(&self) -> Result<()> {
        validate_set_id(&self.id)?;
        validate_entity_ids(&self.entity_ids)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "type": self.set_type.as_str(),
            "entity_type": self.entity_type.as_str(),
            "entity_ids": self.entity_ids,
            "created_datetime": iso8601_value(self.audit.created_datetime.as_ref()),
            "updated_datetime": iso8601_value(self.audit.updated_datetime.as_ref()),
            "accessed_datetime": iso8601_value(self.accessed_datetime.as_ref()),
        })
    }
}

pub fn validate_set_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::Validation("entity set id cannot be empty".to_string()));
    }
    if id.chars().count() > MAX_ENTITY_SET_ID_LEN {
        return Err(Error::Validation(format!(
            "entity set id cannot exceed {MAX_ENTITY_SET_ID_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_entity_ids(entity_ids: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(entity_ids.len());
    for entity_id in entity_ids {
        if entity_id.chars().count() > MAX_ENTITY_ID_LEN {
            return Err(Error::Validation(format!(
                "entity id '{entity_id}' exceeds {MAX_ENTITY_ID_LEN} characters"
            )));
        }
        if !seen.insert(entity_id.as_str()) {
            return Err(Error::Validation(format!(
                "entity id '{entity_id}' appears more than once"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_36: &str = "00000000-0000-0000-0000-000000000000";

    fn set_with_id(id: String) -> EntitySet {
        EntitySet::new(id, SetType::Frozen, EntityType::Case, vec![ID_36.to_string()])
    }

    #[test]
    fn test_id_length_boundary() {
        assert!(set_with_id("a".repeat(128)).validate().is_ok());
        assert!(matches!(
            set_with_id("a".repeat(129)).validate(),
            Err(Error::Validation(_))
        ));
        assert!(set_with_id(String::new()).validate().is_err());
    }

    #[test]
    fn test_entity_id_length_boundary() {
        let mut set = set_with_id("set".to_string());
        set.entity_ids = vec![format!("{ID_36}1")];
        assert!(set.validate().is_err());
    }

    #[test]
    fn test_duplicate_entity_ids_rejected() {
        let mut set = set_with_id("set".to_string());
        set.entity_ids = vec![ID_36.to_string(), ID_36.to_string()];
        assert!(matches!(set.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_enum_parse() {
        assert_eq!("ephmeral".parse::<SetType>().unwrap(), SetType::Ephemeral);
        assert_eq!("ssm".parse::<EntityType>().unwrap(), EntityType::Ssm);
        assert!(matches!(
            "project".parse::<EntityType>(),
            Err(Error::InvalidValue { field: "entity_type", .. })
        ));
    }

    #[test]
    fn test_to_json_uses_enum_names() {
        let set = set_with_id("s1".to_string());
        assert_eq!(
            set.to_json(),
            json!({
                "id": "s1",
                "type": "frozen",
                "entity_type": "case",
                "entity_ids": [ID_36],
                "created_datetime": null,
                "updated_datetime": null,
                "accessed_datetime": null,
            })
        );
    }
}
