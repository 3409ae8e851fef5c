use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Which script of a migration a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reversible schema change, built from the files sharing an id.
///
/// Whether it is applied is not stored here; ask the migration log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Migration {
    /// Timestamp prefix plus name, e.g. `20150703234300001_first`. Sorting ids
    /// lexicographically sorts migrations chronologically.
    pub id: String,
    pub up_path: Option<PathBuf>,
    pub down_path: Option<PathBuf>,
}

impl Migration {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            up_path: None,
            down_path: None,
        }
    }

    pub fn path(&self, direction: Direction) -> Option<&Path> {
        match direction {
            Direction::Up => self.up_path.as_deref(),
            Direction::Down => self.down_path.as_deref(),
        }
    }

    /// Set the script path for `direction`, returning the path it replaced.
    pub fn set_path(&mut self, direction: Direction, path: PathBuf) -> Option<PathBuf> {
        match direction {
            Direction::Up => self.up_path.replace(path),
            Direction::Down => self.down_path.replace(path),
        }
    }
}
