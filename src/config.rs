//! Application configuration, read from `farmstock.toml`.
//!
//! Layered: file → environment → CLI flags.
//!
//! ```toml
//! [database]
//! path = "farmstock.db"
//! busy_timeout_ms = 5000
//!
//! [allocation]
//! max_attempts = 5
//!
//! [logging]
//! level = "info"
//! json = false
//! ```
//!
//! The SKU format itself (prefix, suffix, format kind) is not here: it lives
//! in the database so every caller of the engine sees the same settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sku::allocator::DEFAULT_MAX_ATTEMPTS;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "farmstock.toml";

pub const ENV_DB_PATH: &str = "FARMSTOCK_DB";
pub const ENV_LOG_LEVEL: &str = "FARMSTOCK_LOG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// How long a connection waits for another writer, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("farmstock.db")
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// Attempts per allocation when a write hits a busy database or a
    /// duplicate code.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub allocation: AllocationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse farmstock.toml")
    }

    /// Load `path` if given, else `farmstock.toml` in `dir` if present,
    /// else defaults. An explicitly named file must exist.
    pub fn load_or_default(path: Option<&Path>, dir: &Path) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let candidate = dir.join(CONFIG_FILE);
                if candidate.exists() {
                    Self::load(&candidate)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply environment overrides, then CLI overrides.
    pub fn with_overrides(mut self, db_path: Option<PathBuf>, verbose: bool) -> Self {
        if let Ok(path) = std::env::var(ENV_DB_PATH)
            && !path.is_empty()
        {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL)
            && !level.is_empty()
        {
            self.logging.level = level;
        }
        if let Some(path) = db_path {
            self.database.path = path;
        }
        if verbose {
            self.logging.level = "debug".to_string();
        }
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    /// Problems that do not stop the program but are probably mistakes.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.allocation.max_attempts == 0 {
            warnings.push("allocation.max_attempts is 0; treating it as 1".to_string());
        }
        if self.database.busy_timeout_ms == 0 {
            warnings.push(
                "database.busy_timeout_ms is 0; concurrent allocations will fail instead of waiting"
                    .to_string(),
            );
        }
        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error" | "off"
        ) {
            warnings.push(format!("Unknown logging.level '{}'", self.logging.level));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.database.path, PathBuf::from("farmstock.db"));
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.allocation.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file_fills_defaults() {
        let config = AppConfig::parse(
            r#"
[database]
path = "/var/lib/farm/stock.db"

[logging]
json = true
"#,
        )
        .unwrap();
        assert_eq!(config.database.path, PathBuf::from("/var/lib/farm/stock.db"));
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_rejects_malformed_toml() {
        assert!(AppConfig::parse("[database\npath = 1").is_err());
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_or_default(None, dir.path()).unwrap();
        assert_eq!(config.allocation.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_load_or_default_missing_explicit_file_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(AppConfig::load_or_default(Some(&missing), dir.path()).is_err());
    }

    #[test]
    fn test_load_or_default_reads_file_in_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[allocation]\nmax_attempts = 9\n").unwrap();

        let loaded = AppConfig::load_or_default(None, dir.path()).unwrap();
        assert_eq!(loaded.allocation.max_attempts, 9);
    }

    #[test]
    fn test_cli_overrides_env_overrides_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let saved = std::env::var(ENV_DB_PATH).ok();
        unsafe { std::env::set_var(ENV_DB_PATH, "/env/stock.db") };

        let config = AppConfig::default().with_overrides(None, false);
        assert_eq!(config.database.path, PathBuf::from("/env/stock.db"));

        let config = AppConfig::default().with_overrides(Some(PathBuf::from("/cli.db")), true);
        assert_eq!(config.database.path, PathBuf::from("/cli.db"));
        assert_eq!(config.logging.level, "debug");

        match saved {
            Some(val) => unsafe { std::env::set_var(ENV_DB_PATH, val) },
            None => unsafe { std::env::remove_var(ENV_DB_PATH) },
        }
    }

    #[test]
    fn test_validate_flags_zero_attempts_and_bad_level() {
        let mut config = AppConfig::default();
        config.allocation.max_attempts = 0;
        config.logging.level = "loud".into();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
    }
}
