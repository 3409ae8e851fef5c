pub mod connection;
pub mod log;
pub mod store;
pub mod transaction;

pub use connection::{connect, create_database, drop_database};
pub use log::{ActiveState, LogEntry, MigrationLog};
pub use store::{SqliteStore, validate_table_name};
pub use transaction::ScriptRunner;
