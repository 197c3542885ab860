use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DATABASE_ENV: &str = "GDC_MODELS_DATABASE";
pub const BUSY_TIMEOUT_ENV: &str = "GDC_MODELS_BUSY_TIMEOUT_MS";
pub const JOURNAL_MODE_ENV: &str = "GDC_MODELS_JOURNAL_MODE";

const JOURNAL_MODES: &[&str] = &["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
    /// SQLite journal mode (e.g. "WAL", "DELETE").
    pub journal_mode: String,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Loads a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from defaults overlaid with the environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// Overlays `GDC_MODELS_*` environment variables onto this configuration.
    pub fn with_env(self) -> Result<Self> {
        self.with_vars(|key| std::env::var(key).ok())
    }

    fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(path) = lookup(DATABASE_ENV) {
            self.path = PathBuf::from(path);
        }
        if let Some(timeout) = lookup(BUSY_TIMEOUT_ENV) {
            self.busy_timeout_ms = timeout.trim().parse().map_err(|_| {
                Error::Config(format!("{BUSY_TIMEOUT_ENV} must be an integer, got '{timeout}'"))
            })?;
        }
        if let Some(mode) = lookup(JOURNAL_MODE_ENV) {
            self.journal_mode = mode;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::Config("database path cannot be empty".to_string()));
        }
        let mode = self.journal_mode.to_ascii_uppercase();
        if !JOURNAL_MODES.contains(&mode.as_str()) {
            return Err(Error::Config(format!(
                "unsupported journal mode '{}'",
                self.journal_mode
            )));
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/gdc_models.db"),
            busy_timeout_ms: 5000,
            journal_mode: "WAL".to_string(),
        }
    }
}
