use std::io::Write;

use anyhow::{Context, Result};
use tracing::info;
use turtle_config::TurtleConfig;
use turtle_db::SqliteStore;
use turtle_migrate::{MigrationStatus, Migrator};

use crate::Command;

pub fn run(command: &Command, config: &TurtleConfig) -> Result<()> {
    match command {
        Command::Generate { name } => {
            let (up, down) =
                turtle_migrate::generate(&config.migrations_path, name, chrono::Utc::now())?;
            println!("Created {}", up.display());
            println!("Created {}", down.display());
        }
        Command::Create => {
            turtle_db::create_database(&config.database_path)?;
            println!("Created database {}", config.database_path.display());
        }
        Command::Drop => {
            turtle_db::drop_database(&config.database_path)?;
            println!("Dropped database {}", config.database_path.display());
        }
        Command::Up => {
            let applied = open_migrator(config)?
                .apply_all()
                .context("migration run aborted")?;
            println!("{applied} migration(s) applied");
        }
        Command::Down => {
            let reverted = open_migrator(config)?
                .revert_all()
                .context("revert aborted")?;
            println!("{reverted} migration(s) reverted");
        }
        Command::Rollback { n } => {
            let reverted = open_migrator(config)?
                .rollback(*n)
                .context("rollback aborted")?;
            println!("{reverted} migration(s) rolled back");
        }
        Command::Status { json } => {
            let status = open_migrator(config)?.status()?;
            let mut out = std::io::stdout().lock();
            if *json {
                serde_json::to_writer_pretty(&mut out, &status)?;
                writeln!(out)?;
            } else {
                write_status_table(&mut out, &status)?;
            }
        }
    }
    Ok(())
}

fn open_migrator(config: &TurtleConfig) -> Result<Migrator<SqliteStore>> {
    let store = SqliteStore::open(
        &config.database_path,
        &config.migrations_table,
        config.connect_timeout(),
    )
    .with_context(|| format!("failed to open {}", config.database_path.display()))?;

    info!(
        migrations = %config.migrations_path.display(),
        table = %config.migrations_table,
        "using migration log"
    );
    Ok(Migrator::new(store, &config.migrations_path))
}

fn write_status_table(out: &mut impl Write, status: &[MigrationStatus]) -> std::io::Result<()> {
    if status.is_empty() {
        return writeln!(out, "No migrations found");
    }
    writeln!(out, "{:<8}  MIGRATION", "STATUS")?;
    for s in status {
        let state = if s.active { "applied" } else { "pending" };
        writeln!(out, "{state:<8}  {}", s.id)?;
    }
    Ok(())
}
