use std::path::Path;
use std::time::{Duration, Instant};

use rusqlite::{Connection, OpenFlags};
use tracing::{info, warn};
use turtle_common::{Error, Result};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Open the existing database at `path` and verify it answers queries,
/// retrying with exponential backoff until `timeout` has elapsed. A missing
/// file is an error; [`create_database`] makes one.
pub fn connect(path: &Path, timeout: Duration) -> Result<Connection> {
    info!("opening database at {}", path.display());
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags).map_err(|e| {
        Error::Database(format!(
            "failed to open database {} (run `turtle create` first?): {e}",
            path.display()
        ))
    })?;

    verify_connection(&conn, timeout)?;
    Ok(conn)
}

/// Ping the connection until it responds or `timeout` is exhausted.
pub fn verify_connection(conn: &Connection, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    let mut delay = INITIAL_BACKOFF;

    loop {
        let err = match ping(conn) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        let elapsed = started.elapsed();
        if elapsed + delay > timeout {
            return Err(Error::Database(format!(
                "unable to connect to the database after {:.1}s: {err}",
                elapsed.as_secs_f64()
            )));
        }

        warn!("database not ready ({err}), retrying in {delay:?}");
        std::thread::sleep(delay);
        delay = (delay * 2).min(MAX_BACKOFF);
    }
}

fn ping(conn: &Connection) -> rusqlite::Result<()> {
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        .map(|_| ())
}

/// Create a new, empty database file. Fails if one already exists.
pub fn create_database(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(Error::Database(format!(
            "database already exists: {}",
            path.display()
        )));
    }

    let conn = Connection::open(path).map_err(|e| {
        Error::Database(format!("failed to create database {}: {e}", path.display()))
    })?;
    ping(&conn)
        .map_err(|e| Error::Database(format!("failed to initialise database: {e}")))?;

    info!("created database {}", path.display());
    Ok(())
}

/// Delete the database file at `path`.
pub fn drop_database(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(Error::Database(format!(
            "database does not exist: {}",
            path.display()
        )));
    }

    std::fs::remove_file(path).map_err(|e| {
        Error::Database(format!("failed to drop database {}: {e}", path.display()))
    })?;

    info!("dropped database {}", path.display());
    Ok(())
}
