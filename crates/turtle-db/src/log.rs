use serde::{Deserialize, Serialize};
use turtle_common::Result;

/// Whether a migration has an entry in the migration log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveState {
    /// A log entry exists for the migration.
    Active,
    /// No log entry exists for the migration.
    Inactive,
    /// The log could not be queried.
    Error(String),
}

/// One row of the migration log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Insertion order. Informational only, never used to order migrations.
    pub sequence: i64,
    pub migration_id: String,
}

/// Persisted record of which migration identifiers are applied.
///
/// `create_table` and `drop_table` are not idempotent on their own: creating
/// an existing table fails. Callers pair them with `table_exists`.
pub trait MigrationLog {
    /// Best-effort probe. A failed probe is reported as absent.
    fn table_exists(&self) -> bool;

    fn create_table(&self) -> Result<()>;

    fn drop_table(&self) -> Result<()>;

    /// Record `id` as applied. Fails with a constraint error if `id` is
    /// already present.
    fn insert(&self, id: &str) -> Result<()>;

    /// Remove `id` from the log. Removing an absent id is not an error.
    fn delete(&self, id: &str) -> Result<()>;

    fn is_active(&self, id: &str) -> ActiveState;
}
