use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, params};
use tracing::{debug, info};
use turtle_common::{Error, Result};

use crate::connection;
use crate::log::{ActiveState, LogEntry, MigrationLog};
use crate::transaction::ScriptRunner;

const MAX_TABLE_NAME_LEN: usize = 64;

/// Check that `name` can be interpolated into SQL as a bare identifier.
pub fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Config("migrations table name cannot be empty".into()));
    }
    if name.len() > MAX_TABLE_NAME_LEN {
        return Err(Error::Config(format!(
            "migrations table name too long (max {MAX_TABLE_NAME_LEN})"
        )));
    }

    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::Config(format!(
            "invalid migrations table name: {name:?}"
        )));
    }
    Ok(())
}

/// SQLite-backed migration log and script runner sharing one connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteStore {
    pub fn open(db_path: &Path, table: &str, timeout: Duration) -> Result<Self> {
        let conn = connection::connect(db_path, timeout)?;
        Self::from_connection(conn, table)
    }

    pub fn in_memory(table: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Self::from_connection(conn, table)
    }

    pub fn from_connection(conn: Connection, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("migration store lock poisoned".into()))
    }

    /// All log rows in insertion order.
    pub fn entries(&self) -> Result<Vec<LogEntry>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, migration_id FROM {} ORDER BY id ASC",
                self.table
            ))
            .map_err(|e| Error::Query(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(LogEntry {
                    sequence: row.get(0)?,
                    migration_id: row.get(1)?,
                })
            })
            .map_err(|e| Error::Query(format!("failed to query migration log: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(
                row.map_err(|e| Error::Query(format!("failed to read migration log row: {e}")))?,
            );
        }
        Ok(entries)
    }

    /// Run arbitrary SQL outside the migration flow.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(sql)
            .map_err(|e| Error::Query(format!("failed to execute statement: {e}")))
    }

    /// Whether a table with the given name exists in the schema.
    pub fn has_table(&self, name: &str) -> Result<bool> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count > 0)
        .map_err(|e| Error::Query(format!("failed to inspect schema: {e}")))
    }
}

impl MigrationLog for SqliteStore {
    fn table_exists(&self) -> bool {
        let Ok(conn) = self.connection() else {
            return false;
        };
        let probe = format!("SELECT 1 FROM {} LIMIT 1", self.table);
        match conn.query_row(&probe, [], |_| Ok(())) {
            Ok(()) | Err(rusqlite::Error::QueryReturnedNoRows) => true,
            Err(e) => {
                debug!("migration table probe failed: {e}");
                false
            }
        }
    }

    fn create_table(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(&format!(
            "CREATE TABLE {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                migration_id VARCHAR(255) NOT NULL UNIQUE
            );",
            self.table
        ))
        .map_err(|e| Error::Query(format!("failed to create migration table: {e}")))?;

        info!("created migration table {}", self.table);
        Ok(())
    }

    fn drop_table(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(&format!("DROP TABLE {};", self.table))
            .map_err(|e| Error::Query(format!("failed to drop migration table: {e}")))?;

        info!("dropped migration table {}", self.table);
        Ok(())
    }

    fn insert(&self, id: &str) -> Result<()> {
        let conn = self.connection()?;
        let sql = format!("INSERT INTO {} (migration_id) VALUES (?1)", self.table);
        match conn.execute(&sql, params![id]) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(Error::Constraint(format!(
                    "migration {id} is already recorded in {}",
                    self.table
                )))
            }
            Err(e) => Err(Error::Query(format!("failed to record migration {id}: {e}"))),
        }
    }

    fn delete(&self, id: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            &format!("DELETE FROM {} WHERE migration_id = ?1", self.table),
            params![id],
        )
        .map_err(|e| Error::Query(format!("failed to remove migration {id}: {e}")))?;
        Ok(())
    }

    fn is_active(&self, id: &str) -> ActiveState {
        let conn = match self.connection() {
            Ok(conn) => conn,
            Err(e) => return ActiveState::Error(e.to_string()),
        };
        let sql = format!("SELECT id FROM {} WHERE migration_id = ?1", self.table);
        match conn.query_row(&sql, params![id], |row| row.get::<_, i64>(0)) {
            Ok(_) => ActiveState::Active,
            Err(rusqlite::Error::QueryReturnedNoRows) => ActiveState::Inactive,
            Err(e) => ActiveState::Error(e.to_string()),
        }
    }
}

impl ScriptRunner for SqliteStore {
    fn begin(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch("BEGIN")
            .map_err(|e| Error::Transaction(format!("failed to begin transaction: {e}")))
    }

    fn execute(&self, sql: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(sql)
            .map_err(|e| Error::Transaction(format!("failed to execute script: {e}")))
    }

    fn commit(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch("COMMIT")
            .map_err(|e| Error::Transaction(format!("failed to commit transaction: {e}")))
    }

    fn rollback(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch("ROLLBACK")
            .map_err(|e| Error::Transaction(format!("failed to roll back transaction: {e}")))
    }
}
