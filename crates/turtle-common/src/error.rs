use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The migrations directory could not be opened or listed.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// A migration script could not be read.
    #[error("read error: {0}")]
    Read(String),

    /// A migration log probe or query failed.
    #[error("query error: {0}")]
    Query(String),

    /// A migration log insert collided with an existing entry.
    #[error("constraint error: {0}")]
    Constraint(String),

    /// A migration script failed to execute or commit.
    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
