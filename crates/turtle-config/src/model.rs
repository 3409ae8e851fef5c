use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MIGRATIONS_TABLE: &str = "migrations";
pub const DEFAULT_MIGRATIONS_PATH: &str = "migrations";
pub const DEFAULT_DATABASE_PATH: &str = "turtle.db";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Settings shared by every turtle command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurtleConfig {
    /// Table that records which migrations are applied.
    pub migrations_table: String,
    /// Directory holding the `<id>_up.sql` / `<id>_down.sql` pairs.
    pub migrations_path: PathBuf,
    /// SQLite database file the migrations run against.
    pub database_path: PathBuf,
    /// Total time spent retrying the initial connection check.
    pub connect_timeout_secs: u64,
    pub log_level: String,
}

impl Default for TurtleConfig {
    fn default() -> Self {
        Self {
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            migrations_path: PathBuf::from(DEFAULT_MIGRATIONS_PATH),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            log_level: "info".to_string(),
        }
    }
}

impl TurtleConfig {
    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connect_timeout_secs)
    }
}
