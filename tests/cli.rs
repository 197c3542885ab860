//! CLI integration tests for the gdc-models schema commands.
//!
//! Each test uses an isolated temp directory for the database, ensuring tests
//! can run in parallel safely.

#![allow(deprecated)] // Command::cargo_bin deprecation only affects custom build dirs

use std::path::PathBuf;

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use gdc_models::store::{BatchStore, SqliteStore};
use gdc_models::types::Batch;
use predicates::prelude::*;

const BASELINE: &str = "3f2a9c4d1b70";
const NOTIFICATION_WINDOW: &str = "e9d53a640d5d";
const HEAD: &str = "7c41d0e8a2f5";

struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn db_path(&self) -> PathBuf {
        self.temp_dir.path().join("models.db")
    }

    fn db_path_str(&self) -> String {
        self.db_path().to_string_lossy().to_string()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("gdc-models").expect("failed to find binary");
        cmd.env("NO_COLOR", "1")
            .env_remove("GDC_MODELS_DATABASE")
            .env_remove("GDC_MODELS_BUSY_TIMEOUT_MS")
            .env_remove("GDC_MODELS_JOURNAL_MODE")
            .env_remove("RUST_LOG");
        cmd
    }

    fn run(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        let db = self.db_path_str();
        let mut full = vec!["--database", db.as_str()];
        full.extend_from_slice(args);
        self.cmd().args(full).assert()
    }

    fn init(&self) -> assert_cmd::assert::Assert {
        self.run(&["init"])
    }

    fn current(&self) -> String {
        let output = self.run(&["migrate", "current"]).success().get_output().clone();
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }
}

#[test]
fn test_init_creates_database_at_head() {
    let ctx = TestContext::new();

    ctx.init()
        .success()
        .stdout(predicate::str::contains(format!("at revision {HEAD}")));

    assert!(ctx.db_path().exists());
    assert_eq!(ctx.current(), HEAD);
}

#[test]
fn test_init_is_idempotent() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.init()
        .success()
        .stdout(predicate::str::contains("already at"));
}

#[test]
fn test_current_before_init_is_base() {
    let ctx = TestContext::new();
    assert_eq!(ctx.current(), "<base>");
}

#[test]
fn test_upgrade_to_revision_then_head() {
    let ctx = TestContext::new();

    ctx.run(&["migrate", "upgrade", "--to", NOTIFICATION_WINDOW])
        .success()
        .stdout(predicate::str::contains(format!("Upgraded to {BASELINE}")))
        .stdout(predicate::str::contains(format!("Upgraded to {NOTIFICATION_WINDOW}")));
    assert_eq!(ctx.current(), NOTIFICATION_WINDOW);

    ctx.run(&["migrate", "upgrade"])
        .success()
        .stdout(predicate::str::contains(format!("Upgraded to {HEAD}")));
    ctx.run(&["migrate", "upgrade"])
        .success()
        .stdout(predicate::str::contains("Already at head"));
}

#[test]
fn test_upgrade_unknown_revision_fails() {
    let ctx = TestContext::new();

    ctx.run(&["migrate", "upgrade", "--to", "deadbeef0000"])
        .failure()
        .stderr(predicate::str::contains("unknown revision"));
}

#[test]
fn test_history_marks_current() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.run(&["migrate", "history"])
        .success()
        .stdout(predicate::str::contains(format!("<base> -> {BASELINE}")))
        .stdout(predicate::str::contains(format!(
            "{NOTIFICATION_WINDOW} -> {HEAD} (current)"
        )));
}

#[test]
fn test_downgrade_to_base_drops_tables() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.run(&["migrate", "downgrade", "--to", "base", "--yes"])
        .success()
        .stdout(predicate::str::contains(format!("Reverted {HEAD}")))
        .stdout(predicate::str::contains(format!("Reverted {BASELINE}")));
    assert_eq!(ctx.current(), "<base>");

    ctx.run(&["tables", "--module", "batch"])
        .success()
        .stdout(predicate::str::contains("batch_membership (missing)"));
}

#[test]
fn test_downgrade_keeps_existing_rows() {
    let ctx = TestContext::new();
    ctx.init().success();

    {
        let store = SqliteStore::new(ctx.db_path()).unwrap();
        store.create_batch(&Batch::new("b", "TCGA-BRCA")).unwrap();
    }

    ctx.run(&["migrate", "downgrade", "--to", NOTIFICATION_WINDOW, "--yes"])
        .success();
    assert_eq!(ctx.current(), NOTIFICATION_WINDOW);

    let store = SqliteStore::new(ctx.db_path()).unwrap();
    let count: i64 = store
        .connection()
        .query_row("SELECT COUNT(*) FROM batch", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_downgrade_without_terminal_requires_yes() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.run(&["migrate", "downgrade", "--to", "base"]).failure();
    assert_eq!(ctx.current(), HEAD);
}

#[test]
fn test_downgrade_without_schema_fails() {
    let ctx = TestContext::new();

    ctx.run(&["migrate", "downgrade", "--to", "base", "--yes"])
        .failure()
        .stderr(predicate::str::contains("nothing to downgrade"));
}

#[test]
fn test_tables_lists_every_module() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.run(&["tables"])
        .success()
        .stdout(predicate::str::contains("studyrule:"))
        .stdout(predicate::str::contains("  study_rule_program_project"))
        .stdout(predicate::str::contains("qcreport:"))
        .stdout(predicate::str::contains("(missing)").not());
}

#[test]
fn test_tables_rejects_unknown_module() {
    let ctx = TestContext::new();

    ctx.run(&["tables", "--module", "nope"]).failure();
}

#[test]
fn test_grant_prints_statement() {
    let ctx = TestContext::new();

    ctx.cmd()
        .args([
            "grant",
            "--module",
            "batch",
            "--role",
            "portal_ro",
            "--permission",
            "READ",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "GRANT SELECT ON batch, batch_membership TO portal_ro",
        ));
    assert!(!ctx.db_path().exists());
}

#[test]
fn test_revoke_prints_statement() {
    let ctx = TestContext::new();

    ctx.cmd()
        .args([
            "revoke",
            "--module",
            "entity_set",
            "--role",
            "api",
            "--permission",
            "write",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "REVOKE USAGE, SELECT, INSERT, UPDATE, DELETE ON entity_set FROM api",
        ));
}

#[test]
fn test_grant_rejects_bad_role() {
    let ctx = TestContext::new();

    ctx.cmd()
        .args([
            "grant",
            "--module",
            "batch",
            "--role",
            "drop table",
            "--permission",
            "read",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("role"));
}

#[test]
fn test_config_file_and_env() {
    let ctx = TestContext::new();
    let config = ctx.temp_dir.child("gdc_models.toml");
    let from_file = ctx.temp_dir.path().join("from_file.db");
    config
        .write_str(&format!(
            "path = {:?}\njournal_mode = \"delete\"\n",
            from_file.to_string_lossy()
        ))
        .unwrap();

    ctx.cmd()
        .args(["--config", &config.path().to_string_lossy(), "init"])
        .assert()
        .success();
    assert!(from_file.exists());

    let from_env = ctx.temp_dir.path().join("from_env.db");
    ctx.cmd()
        .env("GDC_MODELS_DATABASE", &from_env)
        .args(["init"])
        .assert()
        .success();
    assert!(from_env.exists());

    ctx.cmd()
        .env("GDC_MODELS_JOURNAL_MODE", "sideways")
        .args(["--database", &ctx.db_path_str(), "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("journal mode"));
}
