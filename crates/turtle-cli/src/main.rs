mod commands;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use turtle_config::{ConfigLoader, TurtleConfig};

use crate::logging::LogFormat;

/// For incredible (SQL) migrations, just the sea turtle!
#[derive(Parser, Debug)]
#[command(name = "turtle", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (toml or yaml). Defaults to ./turtle.toml or ./turtle.yml if present
    #[arg(short, long, global = true, env = "TURTLE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the migration files
    #[arg(long, global = true)]
    migrations_path: Option<PathBuf>,

    /// Table recording applied migrations
    #[arg(long, global = true)]
    migrations_table: Option<String>,

    /// SQLite database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence
    #[arg(short = 'L', long, global = true)]
    log_level: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Generates a new set of migration files
    #[command(alias = "g")]
    Generate {
        /// Migration name, e.g. create_users
        name: String,
    },

    /// Creates the database file
    #[command(alias = "c")]
    Create,

    /// Deletes the database file
    Drop,

    /// Applies all outstanding migrations
    #[command(alias = "u")]
    Up,

    /// Reverts all applied migrations
    #[command(alias = "d")]
    Down,

    /// Reverts the n most recent applied migrations
    #[command(alias = "r")]
    Rollback {
        /// Number of migrations to revert
        n: usize,
    },

    /// Lists migrations and whether each is applied
    #[command(alias = "s")]
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn load_config(&self) -> Result<TurtleConfig> {
        let mut loader = ConfigLoader::new();
        if let Some(path) = &self.config {
            loader = loader.with_file(path);
        }
        let mut config = loader.load()?;

        if let Some(path) = &self.migrations_path {
            config.migrations_path = path.clone();
        }
        if let Some(table) = &self.migrations_table {
            config.migrations_table = table.clone();
        }
        if let Some(path) = &self.database {
            config.database_path = path.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    logging::init(&config.log_level, cli.log_format)?;

    commands::run(&cli.command, &config)
}
