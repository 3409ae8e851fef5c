//! Discovery, ordering and execution of ordered, reversible SQL migrations.
//!
//! A migration is a pair of `<id>_up.sql` / `<id>_down.sql` scripts in a flat
//! directory. Whether it is applied is derived from the migration log kept by
//! [`turtle_db::MigrationLog`].

pub mod discovery;
pub mod engine;
pub mod fs;
pub mod migration;
pub mod ordering;
pub mod scaffold;

pub use discovery::{FileKind, discover, parse_filename};
pub use engine::{MigrationStatus, Migrator, Transition};
pub use fs::{FileSystem, MemoryFileSystem, OsFileSystem};
pub use migration::{Direction, Migration};
pub use ordering::{SortOrder, sort_migrations};
pub use scaffold::generate;
