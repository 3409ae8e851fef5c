use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};
use turtle_common::{Error, Result};

use crate::fs::FileSystem;
use crate::migration::{Direction, Migration};

/// `<digits>_<name>_<up|down>.sql`, where the id is everything before the
/// final direction token.
static MIGRATION_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+_[A-Za-z0-9_-]+)_(up|down)\.sql$").expect("valid migration regex")
});

/// A filename classified as one side of a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileKind {
    pub id: String,
    pub direction: Direction,
}

/// Classify a bare filename. Returns `None` for anything that is not a
/// migration script.
pub fn parse_filename(name: &str) -> Option<FileKind> {
    let caps = MIGRATION_FILENAME.captures(name)?;
    let direction = match &caps[2] {
        "up" => Direction::Up,
        "down" => Direction::Down,
        _ => return None,
    };
    Some(FileKind {
        id: caps[1].to_string(),
        direction,
    })
}

/// Scan `dir` (one level, no recursion) and group up/down scripts by id.
///
/// Entries that are not migration scripts are skipped. Two scripts for the
/// same id and direction are rejected.
pub fn discover<F: FileSystem>(fs: &F, dir: &Path) -> Result<HashMap<String, Migration>> {
    let stat = fs.stat(dir).map_err(|e| {
        Error::Discovery(format!(
            "cannot open migrations directory {}: {e}",
            dir.display()
        ))
    })?;
    if !stat.is_dir {
        return Err(Error::Discovery(format!(
            "migrations path is not a directory: {}",
            dir.display()
        )));
    }

    let entries = fs.read_dir(dir).map_err(|e| {
        Error::Discovery(format!(
            "cannot list migrations directory {}: {e}",
            dir.display()
        ))
    })?;

    let mut migrations: HashMap<String, Migration> = HashMap::new();
    for entry in entries {
        if entry.is_dir {
            debug!("skipping directory {}", entry.name);
            continue;
        }

        let Some(kind) = parse_filename(&entry.name) else {
            if entry.name.ends_with(".sql") {
                warn!(
                    "ignoring {}: expected <timestamp>_<name>_up.sql or _down.sql",
                    entry.name
                );
            } else {
                debug!("skipping non-migration file {}", entry.name);
            }
            continue;
        };

        let path = dir.join(&entry.name);
        let migration = migrations
            .entry(kind.id.clone())
            .or_insert_with(|| Migration::new(kind.id.clone()));
        if let Some(previous) = migration.set_path(kind.direction, path.clone()) {
            return Err(Error::Discovery(format!(
                "migration {} has more than one {} script: {} and {}",
                kind.id,
                kind.direction,
                previous.display(),
                path.display()
            )));
        }
    }

    debug!(
        "discovered {} migrations in {}",
        migrations.len(),
        dir.display()
    );
    Ok(migrations)
}
