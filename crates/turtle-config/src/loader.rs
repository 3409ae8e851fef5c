use std::path::{Path, PathBuf};

use tracing::{debug, info};
use turtle_common::{Error, Result};

use crate::model::TurtleConfig;

/// Config files probed in the working directory when no explicit path is given.
const DEFAULT_CONFIG_FILES: &[&str] = &["turtle.toml", "turtle.yml", "turtle.yaml"];

pub const ENV_MIGRATIONS_TABLE: &str = "MIGRATIONS_TABLE_NAME";
pub const ENV_MIGRATIONS_PATH: &str = "MIGRATIONS_PATH";
pub const ENV_DATABASE_PATH: &str = "DATABASE_PATH";
pub const ENV_CONNECT_TIMEOUT: &str = "DB_CONNECT_TIMEOUT";
pub const ENV_LOG_LEVEL: &str = "TURTLE_LOG";

/// Builds a `TurtleConfig` from defaults, an optional config file, `.env`
/// and the process environment, in increasing order of precedence.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    search_dir: PathBuf,
    load_dotenv: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: None,
            search_dir: PathBuf::from("."),
            load_dotenv: true,
        }
    }

    /// Use an explicit config file instead of probing the working directory.
    /// A missing explicit file is an error.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = dir.into();
        self
    }

    pub fn skip_dotenv(mut self) -> Self {
        self.load_dotenv = false;
        self
    }

    pub fn load(&self) -> Result<TurtleConfig> {
        if self.load_dotenv {
            // A missing .env is fine as long as the environment has what we need.
            match dotenvy::dotenv() {
                Ok(path) => debug!("loaded environment from {}", path.display()),
                Err(e) => debug!("no .env loaded: {e}"),
            }
        }
        self.load_with_env(|key| std::env::var(key).ok())
    }

    /// Same as `load` but reads environment values through `lookup`, and never
    /// touches `.env`.
    pub fn load_with_env<F>(&self, lookup: F) -> Result<TurtleConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = match self.resolve_file()? {
            Some(path) => {
                info!("loading config from {}", path.display());
                load_file(&path)?
            }
            None => TurtleConfig::default(),
        };
        apply_env(config, lookup)
    }

    fn resolve_file(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = &self.config_path {
            if !path.is_file() {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(Some(path.clone()));
        }

        Ok(DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| self.search_dir.join(name))
            .find(|p| p.is_file()))
    }
}

/// Parse a config file, choosing the format from its extension.
pub fn load_file(path: &Path) -> Result<TurtleConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("YAML parse error in {}: {e}", path.display()))),
        "toml" => toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("TOML parse error in {}: {e}", path.display()))),
        other => Err(Error::Config(format!(
            "unsupported config extension: {other}"
        ))),
    }
}

/// Overlay environment values on `config`. Blank values are ignored.
pub fn apply_env<F>(mut config: TurtleConfig, lookup: F) -> Result<TurtleConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(table) = get(ENV_MIGRATIONS_TABLE) {
        config.migrations_table = table;
    }
    if let Some(path) = get(ENV_MIGRATIONS_PATH) {
        config.migrations_path = PathBuf::from(path);
    }
    if let Some(path) = get(ENV_DATABASE_PATH) {
        config.database_path = PathBuf::from(path);
    }
    if let Some(timeout) = get(ENV_CONNECT_TIMEOUT) {
        config.connect_timeout_secs = timeout.trim().parse().map_err(|_| {
            Error::Config(format!(
                "{ENV_CONNECT_TIMEOUT} must be a whole number of seconds, got {timeout:?}"
            ))
        })?;
    }
    if let Some(level) = get(ENV_LOG_LEVEL) {
        config.log_level = level;
    }

    Ok(config)
}
