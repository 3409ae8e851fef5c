use turtle_common::Result;

/// Transaction port used to run one migration script.
///
/// At most one transaction is open at a time. Scripts must not contain their
/// own transaction control statements.
pub trait ScriptRunner {
    fn begin(&self) -> Result<()>;

    /// Execute a script, possibly holding several statements, inside the
    /// open transaction.
    fn execute(&self, sql: &str) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;
}
