//! GRANT/REVOKE statements for the portal's server database.
//!
//! SQLite has no roles, so these statements are rendered for an operator to
//! run against the deployment's server database rather than executed here.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::store::Module;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionSet {
    Read,
    Write,
}

impl PermissionSet {
    /// Privileges the set expands to.
    pub const fn privileges(self) -> &'static str {
        match self {
            Self::Read => "SELECT",
            Self::Write => "USAGE, SELECT, INSERT, UPDATE, DELETE",
        }
    }
}

impl FromStr for PermissionSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "READ" => Ok(Self::Read),
            "WRITE" => Ok(Self::Write),
            _ => Err(Error::invalid_value("permission", s)),
        }
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

fn validate_identifier(field: &'static str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(Error::invalid_value(field, name))
    }
}

fn table_list<S: AsRef<str>>(tables: &[S]) -> Result<String> {
    if tables.is_empty() {
        return Err(Error::Required { field: "tables" });
    }
    for table in tables {
        validate_identifier("table", table.as_ref())?;
    }
    Ok(tables
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", "))
}

pub fn grant_statement<S: AsRef<str>>(
    permission: PermissionSet,
    role: &str,
    tables: &[S],
) -> Result<String> {
    validate_identifier("role", role)?;
    let statement = format!(
        "GRANT {} ON {} TO {role}",
        permission.privileges(),
        table_list(tables)?
    );
    tracing::debug!("{}", statement);
    Ok(statement)
}

pub fn revoke_statement<S: AsRef<str>>(
    permission: PermissionSet,
    role: &str,
    tables: &[S],
) -> Result<String> {
    validate_identifier("role", role)?;
    let statement = format!(
        "REVOKE {} ON {} FROM {role}",
        permission.privileges(),
        table_list(tables)?
    );
    tracing::debug!("{}", statement);
    Ok(statement)
}

/// Grant covering every table of `module`.
pub fn grant_module(permission: PermissionSet, role: &str, module: Module) -> Result<String> {
    grant_statement(permission, role, module.tables())
}

pub fn revoke_module(permission: PermissionSet, role: &str, module: Module) -> Result<String> {
    revoke_statement(permission, role, module.tables())
}
