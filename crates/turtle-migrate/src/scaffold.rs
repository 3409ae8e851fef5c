use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;
use turtle_common::{Error, Result};

use crate::migration::Direction;

/// 14 digits of date and time plus 3 of milliseconds.
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";

pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// Create an empty `<timestamp>_<name>_up.sql` / `_down.sql` pair in `dir`,
/// creating `dir` if needed. Returns the up and down paths.
pub fn generate(dir: &Path, name: &str, now: DateTime<Utc>) -> Result<(PathBuf, PathBuf)> {
    let valid_name = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid_name {
        return Err(Error::Config(format!(
            "invalid migration name {name:?}: use letters, digits, '_' or '-'"
        )));
    }

    std::fs::create_dir_all(dir).map_err(|e| {
        Error::Other(format!(
            "failed to create migrations directory {}: {e}",
            dir.display()
        ))
    })?;

    let id = format!("{}_{name}", timestamp(now));
    let up = create_script(dir, &id, Direction::Up)?;
    let down = create_script(dir, &id, Direction::Down)?;
    Ok((up, down))
}

fn create_script(dir: &Path, id: &str, direction: Direction) -> Result<PathBuf> {
    let path = dir.join(format!("{id}_{direction}.sql"));
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| Error::Other(format!("failed to create {}: {e}", path.display())))?;

    info!("created {}", path.display());
    Ok(path)
}
