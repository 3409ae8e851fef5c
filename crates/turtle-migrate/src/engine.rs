//! The apply/revert state machine and the orchestration built on it.
//!
//! Each migration is either active (it has a migration log entry) or
//! inactive. Apply and revert run one script inside one transaction, then
//! update the log. Orchestration stops at the first error. Migrations
//! committed before the error stay committed, and nothing after it is
//! attempted.
//!
//! There is no locking between processes. Two concurrent runs can race on
//! creating the log table or on inserting the same id. The unique
//! `migration_id` column stops the second insert and surfaces a constraint
//! error.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, error, info};
use turtle_common::{Error, Result};
use turtle_db::{ActiveState, MigrationLog, ScriptRunner};

use crate::discovery::discover;
use crate::fs::{FileSystem, OsFileSystem};
use crate::migration::{Direction, Migration};
use crate::ordering::{SortOrder, sort_migrations};

/// Result of a single apply or revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The script ran and the log was updated.
    Performed,
    /// The migration was already in the requested state. Nothing ran.
    Skipped,
}

/// A discovered migration and whether the log marks it applied.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub id: String,
    pub active: bool,
    pub up_path: Option<PathBuf>,
    pub down_path: Option<PathBuf>,
}

/// Runs migrations from one directory against one database handle.
pub struct Migrator<D, F = OsFileSystem> {
    db: D,
    fs: F,
    migrations_path: PathBuf,
}

impl<D> Migrator<D, OsFileSystem>
where
    D: MigrationLog + ScriptRunner,
{
    pub fn new(db: D, migrations_path: impl Into<PathBuf>) -> Self {
        Self::with_fs(db, OsFileSystem, migrations_path)
    }
}

impl<D, F> Migrator<D, F>
where
    D: MigrationLog + ScriptRunner,
    F: FileSystem,
{
    pub fn with_fs(db: D, fs: F, migrations_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            fs,
            migrations_path: migrations_path.into(),
        }
    }

    pub fn db(&self) -> &D {
        &self.db
    }

    /// Create the migration log table if the probe says it is absent.
    pub fn ensure_log_table(&self) -> Result<()> {
        if self.db.table_exists() {
            return Ok(());
        }
        self.db.create_table()
    }

    /// Discover the migrations in the configured directory, keyed by id.
    pub fn migrations(&self) -> Result<HashMap<String, Migration>> {
        discover(&self.fs, &self.migrations_path)
    }

    fn ordered(&self, order: SortOrder) -> Result<Vec<Migration>> {
        Ok(sort_migrations(self.migrations()?, order))
    }

    pub fn is_active(&self, migration: &Migration) -> Result<bool> {
        match self.db.is_active(&migration.id) {
            ActiveState::Active => Ok(true),
            ActiveState::Inactive => Ok(false),
            ActiveState::Error(detail) => Err(Error::Query(format!(
                "failed to check whether migration {} is applied: {detail}",
                migration.id
            ))),
        }
    }

    /// Run the up script and record the migration. Already active migrations
    /// are left alone.
    pub fn apply(&self, migration: &Migration) -> Result<Transition> {
        if self.is_active(migration)? {
            debug!("migration ({}) already applied, skipping", migration.id);
            return Ok(Transition::Skipped);
        }

        let sql = self.read_script(migration, Direction::Up)?;
        self.run_in_transaction(migration, Direction::Up, &sql)?;
        self.db.insert(&migration.id)?;

        info!("migration ({}) applied", migration.id);
        Ok(Transition::Performed)
    }

    /// Run the down script and remove the log entry. Inactive migrations are
    /// left alone and reported as skipped.
    pub fn revert(&self, migration: &Migration) -> Result<Transition> {
        if !self.is_active(migration)? {
            debug!("migration ({}) not applied, skipping", migration.id);
            return Ok(Transition::Skipped);
        }

        let sql = self.read_script(migration, Direction::Down)?;
        self.run_in_transaction(migration, Direction::Down, &sql)?;
        self.db.delete(&migration.id)?;

        info!("migration ({}) reverted", migration.id);
        Ok(Transition::Performed)
    }

    /// Apply every migration, oldest first. Returns how many were applied.
    pub fn apply_all(&self) -> Result<usize> {
        self.ensure_log_table()?;

        let mut applied = 0;
        for migration in self.ordered(SortOrder::Ascending)? {
            if self.apply(&migration)? == Transition::Performed {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Revert every migration, newest first. Returns how many were reverted.
    pub fn revert_all(&self) -> Result<usize> {
        self.ensure_log_table()?;

        let mut reverted = 0;
        for migration in self.ordered(SortOrder::Descending)? {
            if self.revert(&migration)? == Transition::Performed {
                reverted += 1;
            }
        }
        Ok(reverted)
    }

    /// Revert up to `n` active migrations, newest first. Inactive migrations
    /// do not count towards `n`. Asking for more than are active reverts all
    /// of them.
    pub fn rollback(&self, n: usize) -> Result<usize> {
        self.ensure_log_table()?;

        let mut reverted = 0;
        for migration in self.ordered(SortOrder::Descending)? {
            if reverted >= n {
                break;
            }
            if self.revert(&migration)? == Transition::Performed {
                reverted += 1;
            }
        }
        Ok(reverted)
    }

    /// Every discovered migration, oldest first, with its applied state.
    pub fn status(&self) -> Result<Vec<MigrationStatus>> {
        self.ensure_log_table()?;

        self.ordered(SortOrder::Ascending)?
            .into_iter()
            .map(|m| {
                let active = self.is_active(&m)?;
                Ok(MigrationStatus {
                    id: m.id,
                    active,
                    up_path: m.up_path,
                    down_path: m.down_path,
                })
            })
            .collect()
    }

    fn read_script(&self, migration: &Migration, direction: Direction) -> Result<String> {
        let path = migration.path(direction).ok_or_else(|| {
            Error::Read(format!(
                "migration {} has no {direction} script",
                migration.id
            ))
        })?;
        self.fs
            .read_to_string(path)
            .map_err(|e| Error::Read(format!("failed to read {}: {e}", path.display())))
    }

    /// begin, execute, commit. Any failure after `begin` is followed by a
    /// rollback attempt and the original error is returned.
    fn run_in_transaction(
        &self,
        migration: &Migration,
        direction: Direction,
        sql: &str,
    ) -> Result<()> {
        self.db.begin()?;

        if let Err(e) = self.db.execute(sql) {
            error!(
                "unable to {} migration ({}): {e}",
                verb(direction),
                migration.id
            );
            self.rollback_quietly();
            return Err(e);
        }

        if let Err(e) = self.db.commit() {
            error!("unable to commit migration ({}): {e}", migration.id);
            self.rollback_quietly();
            return Err(e);
        }

        Ok(())
    }

    fn rollback_quietly(&self) {
        if let Err(e) = self.db.rollback() {
            error!("unable to roll back transaction: {e}");
        }
    }
}

fn verb(direction: Direction) -> &'static str {
    match direction {
        Direction::Up => "apply",
        Direction::Down => "revert",
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeSet;

    use super::*;
    use crate::fs::MemoryFileSystem;

    /// Records every call and keeps the log in a set.
    #[derive(Default)]
    struct FakeDb {
        table: RefCell<bool>,
        log: RefCell<BTreeSet<String>>,
        calls: RefCell<Vec<String>>,
        fail_script: Option<&'static str>,
        fail_commit: bool,
        fail_probe: bool,
        /// Already logged by someone else, though `is_active` said otherwise.
        raced_insert: Option<&'static str>,
    }

    impl FakeDb {
        fn with_active(ids: &[&str]) -> Self {
            let db = Self::default();
            *db.table.borrow_mut() = true;
            db.log
                .borrow_mut()
                .extend(ids.iter().map(|id| id.to_string()));
            db
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.borrow_mut().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn scripts(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| c.strip_prefix("exec ").map(str::to_string))
                .collect()
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls().iter().filter(|c| c.starts_with(prefix)).count()
        }

        fn active(&self) -> Vec<String> {
            self.log.borrow().iter().cloned().collect()
        }
    }

    impl MigrationLog for FakeDb {
        fn table_exists(&self) -> bool {
            *self.table.borrow()
        }

        fn create_table(&self) -> Result<()> {
            self.record("create_table");
            *self.table.borrow_mut() = true;
            Ok(())
        }

        fn drop_table(&self) -> Result<()> {
            *self.table.borrow_mut() = false;
            Ok(())
        }

        fn insert(&self, id: &str) -> Result<()> {
            self.record(format!("insert {id}"));
            if self.raced_insert == Some(id) || !self.log.borrow_mut().insert(id.to_string()) {
                return Err(Error::Constraint(format!("duplicate {id}")));
            }
            Ok(())
        }

        fn delete(&self, id: &str) -> Result<()> {
            self.record(format!("delete {id}"));
            self.log.borrow_mut().remove(id);
            Ok(())
        }

        fn is_active(&self, id: &str) -> ActiveState {
            if self.fail_probe {
                return ActiveState::Error("connection reset".into());
            }
            if self.log.borrow().contains(id) {
                ActiveState::Active
            } else {
                ActiveState::Inactive
            }
        }
    }

    impl ScriptRunner for FakeDb {
        fn begin(&self) -> Result<()> {
            self.record("begin");
            Ok(())
        }

        fn execute(&self, sql: &str) -> Result<()> {
            self.record(format!("exec {sql}"));
            if self.fail_script == Some(sql) {
                return Err(Error::Transaction(format!("syntax error in {sql}")));
            }
            Ok(())
        }

        fn commit(&self) -> Result<()> {
            self.record("commit");
            if self.fail_commit {
                return Err(Error::Transaction("disk full".into()));
            }
            Ok(())
        }

        fn rollback(&self) -> Result<()> {
            self.record("rollback");
            Ok(())
        }
    }

    const FIRST: &str = "20150703234300001_first";
    const SECOND: &str = "20150703234300002_second";
    const THIRD: &str = "20150703234300003_third";

    fn three_migrations() -> MemoryFileSystem {
        let mut fs = MemoryFileSystem::new();
        for (id, name) in [(FIRST, "first"), (SECOND, "second"), (THIRD, "third")] {
            fs.add_file(format!("migrations/{id}_up.sql"), format!("CREATE TABLE {name}"))
                .add_file(format!("migrations/{id}_down.sql"), format!("DROP TABLE {name}"));
        }
        fs
    }

    fn migrator(db: FakeDb) -> Migrator<FakeDb, MemoryFileSystem> {
        Migrator::with_fs(db, three_migrations(), "migrations")
    }

    #[test]
    fn apply_all_runs_in_ascending_order() {
        let m = migrator(FakeDb::default());
        assert_eq!(m.apply_all().unwrap(), 3);

        assert_eq!(
            m.db().scripts(),
            ["CREATE TABLE first", "CREATE TABLE second", "CREATE TABLE third"]
        );
        assert_eq!(m.db().active(), [FIRST, SECOND, THIRD]);
    }

    #[test]
    fn apply_all_creates_missing_log_table_once() {
        let m = migrator(FakeDb::default());
        m.apply_all().unwrap();
        m.apply_all().unwrap();
        assert_eq!(m.db().count("create_table"), 1);
    }

    #[test]
    fn each_script_gets_its_own_transaction() {
        let m = migrator(FakeDb::with_active(&[FIRST, SECOND]));
        m.apply_all().unwrap();
        assert_eq!(
            m.db().calls(),
            [
                "begin",
                "exec CREATE TABLE third",
                "commit",
                format!("insert {THIRD}").as_str(),
            ]
        );
    }

    #[test]
    fn revert_all_runs_in_descending_order() {
        let m = migrator(FakeDb::with_active(&[FIRST, SECOND, THIRD]));
        assert_eq!(m.revert_all().unwrap(), 3);

        assert_eq!(
            m.db().scripts(),
            ["DROP TABLE third", "DROP TABLE second", "DROP TABLE first"]
        );
        assert!(m.db().active().is_empty());
    }

    #[test]
    fn apply_all_is_idempotent() {
        let m = migrator(FakeDb::default());
        m.apply_all().unwrap();
        let after_first = m.db().active();
        let calls_after_first = m.db().calls().len();

        assert_eq!(m.apply_all().unwrap(), 0);
        assert_eq!(m.db().active(), after_first);
        assert_eq!(m.db().calls().len(), calls_after_first);
    }

    #[test]
    fn apply_all_only_applies_inactive_migrations() {
        let m = migrator(FakeDb::with_active(&[FIRST]));
        assert_eq!(m.apply_all().unwrap(), 2);

        assert_eq!(m.db().scripts(), ["CREATE TABLE second", "CREATE TABLE third"]);
        assert_eq!(m.db().count(&format!("insert {FIRST}")), 0);
        assert_eq!(m.db().active(), [FIRST, SECOND, THIRD]);
    }

    #[test]
    fn revert_all_with_nothing_active_does_nothing() {
        let m = migrator(FakeDb::with_active(&[]));
        assert_eq!(m.revert_all().unwrap(), 0);
        assert!(m.db().calls().is_empty());
    }

    #[test]
    fn rollback_counts_only_performed_reverts() {
        let m = migrator(FakeDb::with_active(&[FIRST, SECOND, THIRD]));
        assert_eq!(m.rollback(2).unwrap(), 2);

        assert_eq!(m.db().scripts(), ["DROP TABLE third", "DROP TABLE second"]);
        assert_eq!(m.db().active(), [FIRST]);
    }

    #[test]
    fn rollback_skips_inactive_without_spending_budget() {
        // THIRD is inactive, so rollback(1) must still revert SECOND
        let m = migrator(FakeDb::with_active(&[FIRST, SECOND]));
        assert_eq!(m.rollback(1).unwrap(), 1);

        assert_eq!(m.db().scripts(), ["DROP TABLE second"]);
        assert_eq!(m.db().active(), [FIRST]);
    }

    #[test]
    fn over_rollback_reverts_everything_and_succeeds() {
        let m = migrator(FakeDb::with_active(&[FIRST, SECOND, THIRD]));
        assert_eq!(m.rollback(4).unwrap(), 3);
        assert!(m.db().active().is_empty());
    }

    #[test]
    fn rollback_zero_does_nothing() {
        let m = migrator(FakeDb::with_active(&[FIRST, SECOND, THIRD]));
        assert_eq!(m.rollback(0).unwrap(), 0);
        assert!(m.db().scripts().is_empty());
    }

    #[test]
    fn failed_script_rolls_back_and_stops_the_run() {
        let db = FakeDb {
            fail_script: Some("CREATE TABLE second"),
            ..FakeDb::default()
        };
        let m = migrator(db);

        let err = m.apply_all().unwrap_err();
        assert!(matches!(err, Error::Transaction(_)), "got {err:?}");

        assert_eq!(
            m.db().calls(),
            [
                "create_table",
                "begin",
                "exec CREATE TABLE first",
                "commit",
                format!("insert {FIRST}").as_str(),
                "begin",
                "exec CREATE TABLE second",
                "rollback",
            ]
        );
        assert_eq!(m.db().active(), [FIRST]);
    }

    #[test]
    fn failed_commit_rolls_back_without_log_update() {
        let db = FakeDb {
            fail_commit: true,
            ..FakeDb::default()
        };
        let m = migrator(db);

        assert!(matches!(m.apply_all(), Err(Error::Transaction(_))));
        assert_eq!(m.db().count("rollback"), 1);
        assert_eq!(m.db().count("insert"), 0);
    }

    #[test]
    fn failed_revert_keeps_log_entry() {
        let db = FakeDb {
            fail_script: Some("DROP TABLE third"),
            ..FakeDb::with_active(&[FIRST, SECOND, THIRD])
        };
        let m = migrator(db);

        assert!(m.rollback(2).is_err());
        assert_eq!(m.db().count("delete"), 0);
        assert_eq!(m.db().active(), [FIRST, SECOND, THIRD]);
    }

    #[test]
    fn duplicate_log_insert_aborts_the_run() {
        let db = FakeDb {
            raced_insert: Some(SECOND),
            ..FakeDb::default()
        };
        let m = migrator(db);

        let err = m.apply_all().unwrap_err();
        assert!(matches!(err, Error::Constraint(_)), "got {err:?}");

        assert_eq!(m.db().scripts(), ["CREATE TABLE first", "CREATE TABLE second"]);
        assert_eq!(m.db().active(), [FIRST]);
    }

    #[test]
    fn log_query_failure_is_a_query_error() {
        let db = FakeDb {
            fail_probe: true,
            ..FakeDb::default()
        };
        let m = migrator(db);

        let err = m.apply_all().unwrap_err();
        assert!(matches!(err, Error::Query(_)), "got {err:?}");
        assert!(m.db().scripts().is_empty());
    }

    #[test]
    fn apply_of_active_migration_is_a_noop() {
        let m = migrator(FakeDb::with_active(&[FIRST]));
        let first = m.migrations().unwrap().remove(FIRST).unwrap();
        assert_eq!(m.apply(&first).unwrap(), Transition::Skipped);
        assert!(m.db().calls().is_empty());
    }

    #[test]
    fn revert_of_inactive_migration_reports_not_performed() {
        let m = migrator(FakeDb::with_active(&[]));
        let first = m.migrations().unwrap().remove(FIRST).unwrap();
        assert_eq!(m.revert(&first).unwrap(), Transition::Skipped);
        assert!(m.db().calls().is_empty());
    }

    #[test]
    fn unreadable_script_is_a_read_error() {
        let mut fs = three_migrations();
        fs.deny(format!("migrations/{SECOND}_up.sql"));
        let m = Migrator::with_fs(FakeDb::default(), fs, "migrations");

        let err = m.apply_all().unwrap_err();
        assert!(matches!(err, Error::Read(_)), "got {err:?}");
        assert_eq!(m.db().active(), [FIRST]);
        assert_eq!(m.db().count("begin"), 1);
    }

    #[test]
    fn missing_up_script_is_a_read_error() {
        let mut fs = three_migrations();
        fs.remove(format!("migrations/{FIRST}_up.sql"));
        let m = Migrator::with_fs(FakeDb::default(), fs, "migrations");

        let err = m.apply_all().unwrap_err();
        assert!(err.to_string().contains("has no up script"));
        assert!(m.db().scripts().is_empty());
    }

    #[test]
    fn missing_directory_fails_before_any_script() {
        let m = Migrator::with_fs(FakeDb::default(), MemoryFileSystem::new(), "migrations");
        assert!(matches!(m.apply_all(), Err(Error::Discovery(_))));
        assert!(m.db().scripts().is_empty());
    }

    #[test]
    fn status_lists_migrations_with_active_state() {
        let m = migrator(FakeDb::with_active(&[SECOND]));
        let status = m.status().unwrap();
        let summary: Vec<_> = status.iter().map(|s| (s.id.as_str(), s.active)).collect();
        assert_eq!(summary, [(FIRST, false), (SECOND, true), (THIRD, false)]);
    }
}
