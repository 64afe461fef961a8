use crate::constants;
use crate::error::{ImportError, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "sekolah-import.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub import: ImportConfig,
    pub logging: LogConfig,
}

/// Store connection settings. The bundled backend is a local SQLite file
/// named after `database`; `user` and `password` are only carried for
/// connection logging.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            user: "root".to_string(),
            password: String::new(),
            database: "mantap_work_db".to_string(),
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("database", &self.database)
            .finish()
    }
}

impl StoreConfig {
    /// Resolve the SQLite file for this configuration.
    pub fn sqlite_path(&self) -> Result<PathBuf> {
        let host = self.host.trim();
        if !(host.is_empty() || host == "localhost" || host == "127.0.0.1") {
            return Err(ImportError::Config(format!(
                "store host '{}' is not local; only a local SQLite store is supported",
                host
            )));
        }
        let database = self.database.trim();
        if database.is_empty() {
            return Err(ImportError::Config("store database name is empty".to_string()));
        }
        let path = PathBuf::from(database);
        if path.extension().is_some() {
            Ok(path)
        } else {
            Ok(path.with_extension("sqlite3"))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub default_path: PathBuf,
    /// Source identifier written to the batch log; defaults to the input file name
    pub source_name: Option<String>,
    pub header_row: usize,
    pub checkpoint_every: usize,
    pub error_log_cap: usize,
    pub console_error_preview: usize,
    /// Fold state and city aliases to canonical names and record what changed
    pub canonicalize_names: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            default_path: PathBuf::from(constants::DEFAULT_SOURCE_PATH),
            source_name: None,
            header_row: constants::HEADER_ROW,
            checkpoint_every: constants::DEFAULT_CHECKPOINT_EVERY,
            error_log_cap: constants::DEFAULT_ERROR_LOG_CAP,
            console_error_preview: constants::DEFAULT_CONSOLE_ERROR_PREVIEW,
            canonicalize_names: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory for the daily-rolled JSON log; `None` disables file logging
    pub log_dir: Option<PathBuf>,
    pub file_name: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: Some(PathBuf::from("logs")),
            file_name: "import.log".to_string(),
            json: true,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file if one is given or found, then `DB_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(&|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ImportError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply `DB_HOST`, `DB_USER`, `DB_PASSWORD` and `DB_NAME` from the given lookup.
    pub fn apply_env_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("DB_HOST") {
            self.store.host = v;
        }
        if let Some(v) = lookup("DB_USER") {
            self.store.user = v;
        }
        if let Some(v) = lookup("DB_PASSWORD") {
            self.store.password = v;
        }
        if let Some(v) = lookup("DB_NAME") {
            self.store.database = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.import.checkpoint_every == 0 {
            return Err(ImportError::Config(
                "import.checkpoint_every must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
