use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityViolation),

    #[error("\"{value}\" is not a valid value for {field}")]
    InvalidValue { field: &'static str, value: String },

    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("{entity} fields do not exist: {}", .fields.join(", "))]
    UnknownFields {
        entity: &'static str,
        fields: Vec<String>,
    },

    #[error("not found")]
    NotFound,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("migration error: {0}")]
    Migration(String),
}

impl Error {
    pub(crate) fn invalid_value(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            value: value.into(),
        }
    }

    /// Returns the constraint violation behind this error, if any.
    pub fn integrity(&self) -> Option<&IntegrityViolation> {
        match self {
            Self::Integrity(violation) => Some(violation),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The family of relational constraint that rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    NotNull,
    Unique,
    ForeignKey,
    Check,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotNull => "not-null",
            Self::Unique => "unique",
            Self::ForeignKey => "foreign key",
            Self::Check => "check",
        };
        f.write_str(label)
    }
}

/// A constraint violation raised by the database engine, with the declared
/// constraint name resolved where the schema names one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityViolation {
    pub kind: ConstraintKind,
    pub table: String,
    pub constraint: Option<String>,
    pub columns: Vec<String>,
    pub message: String,
}

impl IntegrityViolation {
    pub fn constraint(&self) -> Option<&str> {
        self.constraint.as_deref()
    }

    pub fn is(&self, kind: ConstraintKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "violates {} constraint", self.kind)?;
        if let Some(name) = &self.constraint {
            write!(f, " \"{name}\"")?;
        }
        write!(f, " on table \"{}\"", self.table)?;
        if !self.columns.is_empty() {
            write!(f, " ({})", self.columns.join(", "))?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for IntegrityViolation {}
