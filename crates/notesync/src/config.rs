//! Configuration management for notesync.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::subscriber::SyncStrategy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "notesync";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "notes.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `NOTESYNC_`, `__` between sections)
/// 2. TOML config file at `~/.config/notesync/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Sync configuration.
    pub sync: SyncConfig,
    /// Identity provider configuration.
    pub auth: AuthConfig,
    /// Note list configuration.
    pub notes: NotesConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/notesync/notes.db`
    pub database_path: Option<PathBuf>,
    /// Capacity of the change notification buffer shared by live subscriptions.
    pub change_buffer: usize,
}

/// Sync-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How the note list follows the store: `live` or `fetch`.
    pub mode: SyncStrategy,
    /// Upper bound for any single auth or store call, in milliseconds.
    pub operation_timeout_ms: u64,
}

/// Identity provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Name of the provider; part of every derived session identifier.
    pub provider_name: String,
    /// Accounts must match this pattern to sign in.
    pub account_pattern: String,
}

/// Note list configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotesConfig {
    /// Maximum notes per list. Set to 0 for unlimited.
    pub list_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Resolved at runtime
            change_buffer: 64,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncStrategy::Live,
            operation_timeout_ms: 10_000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider_name: "local".to_string(),
            account_pattern: default_account_pattern(),
        }
    }
}

/// Default account pattern: a plain name or an email address.
fn default_account_pattern() -> String {
    r"^[A-Za-z0-9._%+-]+(@[A-Za-z0-9.-]+\.[A-Za-z]{2,})?$".to_string()
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("NOTESYNC_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.sync.operation_timeout_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "operation_timeout_ms must be greater than 0".to_string(),
            });
        }

        if self.storage.change_buffer == 0 {
            return Err(Error::ConfigValidation {
                message: "change_buffer must be greater than 0".to_string(),
            });
        }

        if self.auth.provider_name.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "provider_name must not be empty".to_string(),
            });
        }

        if regex::Regex::new(&self.auth.account_pattern).is_err() {
            return Err(Error::ConfigValidation {
                message: format!("invalid regex pattern: {}", self.auth.account_pattern),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the operation timeout as a Duration.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.sync.operation_timeout_ms)
    }

    /// Get the list limit, `None` when unlimited.
    #[must_use]
    pub fn list_limit(&self) -> Option<usize> {
        match self.notes.list_limit {
            0 => None,
            n => Some(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.sync.mode, SyncStrategy::Live);
        assert_eq!(config.sync.operation_timeout_ms, 10_000);
        assert_eq!(config.storage.change_buffer, 64);
        assert_eq!(config.auth.provider_name, "local");
        assert_eq!(config.notes.list_limit, 0);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.sync.operation_timeout_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("operation_timeout_ms"));
    }

    #[test]
    fn test_validate_zero_change_buffer() {
        let mut config = Config::default();
        config.storage.change_buffer = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("change_buffer"));
    }

    #[test]
    fn test_validate_empty_provider_name() {
        let mut config = Config::default();
        config.auth.provider_name = "  ".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("provider_name"));
    }

    #[test]
    fn test_validate_invalid_regex() {
        let mut config = Config::default();
        config.auth.account_pattern = "[invalid".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("invalid regex"));
    }

    #[test]
    fn test_default_account_pattern_accepts_names_and_emails() {
        let re = regex::Regex::new(&default_account_pattern()).unwrap();
        assert!(re.is_match("alice"));
        assert!(re.is_match("bob.smith@example.com"));
        assert!(!re.is_match("has space"));
        assert!(!re.is_match(""));
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        assert!(config.database_path().to_string_lossy().contains("notes.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_operation_timeout() {
        let config = Config::default();
        assert_eq!(config.operation_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_list_limit() {
        let mut config = Config::default();
        assert_eq!(config.list_limit(), None);

        config.notes.list_limit = 25;
        assert_eq!(config.list_limit(), Some(25));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("notesync"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "notesync_config_test_{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "[sync]\nmode = \"fetch\"\noperation_timeout_ms = 250\n\n[notes]\nlist_limit = 5\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path.clone())).unwrap();
        assert_eq!(config.sync.mode, SyncStrategy::Fetch);
        assert_eq!(config.operation_timeout(), Duration::from_millis(250));
        assert_eq!(config.list_limit(), Some(5));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_sync_config_deserialize() {
        let json = r#"{"mode": "fetch"}"#;
        let sync: SyncConfig = serde_json::from_str(json).unwrap();
        assert_eq!(sync.mode, SyncStrategy::Fetch);
        assert_eq!(sync.operation_timeout_ms, 10_000);
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("\"mode\":\"live\""));
        assert!(json.contains("account_pattern"));
    }
}
