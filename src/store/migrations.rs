//! Linearly chained schema revisions.
//!
//! The applied head is kept in the single-row `schema_version` table. Each
//! revision runs in its own transaction together with the version update, so a
//! failed step leaves the database at the previous revision.

use std::fmt;
use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, params};

use super::schema;
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Migration {
    pub revision: &'static str,
    pub down_revision: Option<&'static str>,
    pub description: &'static str,
    upgrade: &'static str,
    downgrade: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        revision: "3f2a9c4d1b70",
        down_revision: None,
        description: "baseline schema",
        upgrade: schema::BASELINE_UP,
        downgrade: schema::BASELINE_DOWN,
    },
    Migration {
        revision: "e9d53a640d5d",
        down_revision: Some("3f2a9c4d1b70"),
        description: "add start_date and end_date to notifications",
        upgrade: schema::NOTIFICATION_WINDOW_UP,
        downgrade: schema::NOTIFICATION_WINDOW_DOWN,
    },
    Migration {
        revision: "7c41d0e8a2f5",
        down_revision: Some("e9d53a640d5d"),
        description: "add node_type to batch_membership",
        upgrade: schema::MEMBERSHIP_NODE_TYPE_UP,
        downgrade: schema::MEMBERSHIP_NODE_TYPE_DOWN,
    },
];

const VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    revision TEXT NOT NULL
)";

/// Where an upgrade or downgrade should stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Head,
    Base,
    Revision(String),
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Err(Error::Required { field: "revision" }),
            "head" => Ok(Self::Head),
            "base" => Ok(Self::Base),
            revision => Ok(Self::Revision(revision.to_string())),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head => f.write_str("head"),
            Self::Base => f.write_str("base"),
            Self::Revision(revision) => f.write_str(revision),
        }
    }
}

pub fn head() -> &'static str {
    MIGRATIONS[MIGRATIONS.len() - 1].revision
}

/// Revisions in application order.
pub fn history() -> &'static [Migration] {
    MIGRATIONS
}

/// Checks that the first revision has no parent and each later revision
/// names its predecessor.
pub fn validate_chain() -> Result<()> {
    let mut previous: Option<&str> = None;
    for migration in MIGRATIONS {
        if migration.down_revision != previous {
            return Err(Error::Migration(format!(
                "revision {} expects parent {:?}, found {:?}",
                migration.revision, migration.down_revision, previous
            )));
        }
        previous = Some(migration.revision);
    }
    Ok(())
}

pub fn current_revision(conn: &Connection) -> Result<Option<String>> {
    conn.execute_batch(VERSION_TABLE)?;
    conn.query_row("SELECT revision FROM schema_version WHERE id = 1", [], |row| {
        row.get(0)
    })
    .optional()
    .map_err(Error::from)
}

/// Applies pending revisions up to `target`. Returns the revisions applied.
pub fn upgrade(conn: &mut Connection, target: &Target) -> Result<Vec<&'static str>> {
    validate_chain()?;
    let applied = applied_count(conn)?;
    let wanted = match target {
        Target::Head => MIGRATIONS.len(),
        Target::Base => 0,
        Target::Revision(revision) => position(revision)? + 1,
    };
    if wanted < applied {
        return Err(Error::Migration(format!(
            "cannot upgrade to {target}: database is already at {}",
            MIGRATIONS[applied - 1].revision
        )));
    }

    let mut done = Vec::new();
    for migration in &MIGRATIONS[applied..wanted] {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.upgrade).map_err(|e| {
            Error::Migration(format!("upgrade to {} failed: {e}", migration.revision))
        })?;
        set_revision(&tx, Some(migration.revision))?;
        tx.commit()?;
        tracing::info!(
            revision = migration.revision,
            "Applied migration: {}",
            migration.description
        );
        done.push(migration.revision);
    }
    Ok(done)
}

/// Reverts applied revisions down to `target`. Returns the revisions reverted.
pub fn downgrade(conn: &mut Connection, target: &Target) -> Result<Vec<&'static str>> {
    validate_chain()?;
    let applied = applied_count(conn)?;
    let wanted = match target {
        Target::Head => MIGRATIONS.len(),
        Target::Base => 0,
        Target::Revision(revision) => position(revision)? + 1,
    };
    if wanted > applied {
        return Err(Error::Migration(format!(
            "cannot downgrade to {target}: it is ahead of the database"
        )));
    }

    let mut done = Vec::new();
    for migration in MIGRATIONS[wanted..applied].iter().rev() {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.downgrade).map_err(|e| {
            Error::Migration(format!("downgrade of {} failed: {e}", migration.revision))
        })?;
        set_revision(&tx, migration.down_revision)?;
        tx.commit()?;
        tracing::info!(
            revision = migration.revision,
            "Reverted migration: {}",
            migration.description
        );
        done.push(migration.revision);
    }
    Ok(done)
}

fn position(revision: &str) -> Result<usize> {
    MIGRATIONS
        .iter()
        .position(|m| m.revision == revision)
        .ok_or_else(|| Error::Migration(format!("unknown revision '{revision}'")))
}

fn applied_count(conn: &Connection) -> Result<usize> {
    match current_revision(conn)? {
        Some(revision) => Ok(position(&revision)? + 1),
        None => Ok(0),
    }
}

fn set_revision(conn: &Connection, revision: Option<&str>) -> Result<()> {
    match revision {
        Some(revision) => conn.execute(
            "INSERT INTO schema_version (id, revision) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET revision = excluded.revision",
            params![revision],
        )?,
        None => conn.execute("DELETE FROM schema_version", [])?,
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        conn
    }

    fn columns(conn: &Connection, table: &str) -> Vec<String> {
        conn.prepare(&format!("SELECT name FROM pragma_table_info('{table}')"))
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_chain_is_linear() {
        validate_chain().unwrap();
        assert_eq!(head(), "7c41d0e8a2f5");
        assert_eq!(history()[0].down_revision, None);
    }

    #[test]
    fn test_upgrade_to_head_is_idempotent() {
        let mut conn = conn();
        assert_eq!(current_revision(&conn).unwrap(), None);

        let applied = upgrade(&mut conn, &Target::Head).unwrap();
        assert_eq!(applied.len(), MIGRATIONS.len());
        assert_eq!(current_revision(&conn).unwrap().as_deref(), Some(head()));

        assert!(upgrade(&mut conn, &Target::Head).unwrap().is_empty());
        assert!(columns(&conn, "notifications").contains(&"end_date".to_string()));
        assert!(columns(&conn, "batch_membership").contains(&"node_type".to_string()));
    }

    #[test]
    fn test_membership_rebuild_backfills_rows() {
        let mut conn = conn();
        upgrade(&mut conn, &Target::Revision("e9d53a640d5d".to_string())).unwrap();
        conn.execute_batch(
            "INSERT INTO batch (id, name, project_id) VALUES (1000, 'b', 'GDC-MISC');
             INSERT INTO batch_membership (batch_id, node_id) VALUES (1000, 'node-1');",
        )
        .unwrap();

        upgrade(&mut conn, &Target::Head).unwrap();
        let node_type: String = conn
            .query_row(
                "SELECT node_type FROM batch_membership WHERE node_id = 'node-1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(node_type, "");

        // Cascade still holds on the rebuilt table.
        conn.execute("DELETE FROM batch WHERE id = 1000", []).unwrap();
        let left: i64 = conn
            .query_row("SELECT COUNT(*) FROM batch_membership", [], |row| row.get(0))
            .unwrap();
        assert_eq!(left, 0);
    }

    #[test]
    fn test_downgrade_steps_back() {
        let mut conn = conn();
        upgrade(&mut conn, &Target::Head).unwrap();

        let reverted = downgrade(&mut conn, &Target::Revision("3f2a9c4d1b70".to_string())).unwrap();
        assert_eq!(reverted, vec!["7c41d0e8a2f5", "e9d53a640d5d"]);
        assert!(!columns(&conn, "notifications").contains(&"start_date".to_string()));
        assert!(!columns(&conn, "batch_membership").contains(&"node_type".to_string()));

        downgrade(&mut conn, &Target::Base).unwrap();
        assert_eq!(current_revision(&conn).unwrap(), None);
        assert!(columns(&conn, "batch").is_empty());
    }

    #[test]
    fn test_rejects_wrong_direction_and_unknown_revisions() {
        let mut conn = conn();
        upgrade(&mut conn, &Target::Head).unwrap();

        assert!(matches!(
            upgrade(&mut conn, &Target::Base),
            Err(Error::Migration(_))
        ));
        assert!(matches!(
            downgrade(&mut conn, &Target::Revision("deadbeef".to_string())),
            Err(Error::Migration(_))
        ));
    }

    #[test]
    fn test_target_parsing() {
        assert_eq!("head".parse::<Target>().unwrap(), Target::Head);
        assert_eq!("base".parse::<Target>().unwrap(), Target::Base);
        assert_eq!(
            "e9d53a640d5d".parse::<Target>().unwrap(),
            Target::Revision("e9d53a640d5d".to_string())
        );
        assert!(" ".parse::<Target>().is_err());
    }
}
