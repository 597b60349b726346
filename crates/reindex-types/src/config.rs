//! Configuration loading for the reindexer.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/reindexer/config.toml.

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::TypesError;
use crate::request::DEFAULT_TIMESTAMP_FIELD;

/// Upper bound on the clock-skew guard (one day).
pub const MAX_CLOCK_SKEW_SECS: u64 = 86_400;

/// Connection settings for the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Base URL of the cluster
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Basic-auth user, if the cluster requires one
    #[serde(default)]
    pub username: Option<String>,

    /// Basic-auth password (read from env, not written to config files)
    #[serde(default, skip_serializing)]
    pub password: Option<SecretString>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts for idempotent reads before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_store_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl StoreSettings {
    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Tunables for a migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSettings {
    /// Documents fetched per scroll page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Scroll lease, renewed on every fetch
    #[serde(default = "default_keep_alive_secs")]
    pub scroll_keep_alive_secs: u64,

    /// Subtracted from "now" when recording the cutover mark
    #[serde(default = "default_clock_skew_secs")]
    pub clock_skew_secs: u64,

    /// Timestamp field used when the request does not name one
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
}

fn default_page_size() -> usize {
    100
}

fn default_keep_alive_secs() -> u64 {
    300
}

fn default_clock_skew_secs() -> u64 {
    1
}

fn default_timestamp_field() -> String {
    DEFAULT_TIMESTAMP_FIELD.to_string()
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            scroll_keep_alive_secs: default_keep_alive_secs(),
            clock_skew_secs: default_clock_skew_secs(),
            timestamp_field: default_timestamp_field(),
        }
    }
}

impl MigrationSettings {
    /// Scroll lease as a duration.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.scroll_keep_alive_secs)
    }

    /// Clock-skew guard as a chrono duration.
    pub fn clock_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.clock_skew_secs.min(MAX_CLOCK_SKEW_SECS) as i64)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("page_size must be > 0".to_string());
        }
        if self.scroll_keep_alive_secs == 0 {
            return Err("scroll_keep_alive_secs must be > 0".to_string());
        }
        if self.clock_skew_secs > MAX_CLOCK_SKEW_SECS {
            return Err(format!(
                "clock_skew_secs must be <= {}",
                MAX_CLOCK_SKEW_SECS
            ));
        }
        if self.timestamp_field.trim().is_empty() {
            return Err("timestamp_field must not be empty".to_string());
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Store connection
    #[serde(default)]
    pub store: StoreSettings,

    /// Migration tunables
    #[serde(default)]
    pub migration: MigrationSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store: StoreSettings::default(),
            migration: MigrationSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/reindexer/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (REINDEX_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, TypesError> {
        let config_dir = ProjectDirs::from("", "", "reindexer")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("store.url", default_store_url())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("store.timeout_secs", default_timeout_secs() as i64)
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("store.max_retries", i64::from(default_max_retries()))
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("migration.page_size", default_page_size() as i64)
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default(
                "migration.scroll_keep_alive_secs",
                default_keep_alive_secs() as i64,
            )
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("migration.clock_skew_secs", default_clock_skew_secs() as i64)
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("migration.timestamp_field", default_timestamp_field())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: REINDEX_STORE__URL, REINDEX_MIGRATION__PAGE_SIZE, REINDEX_LOG_LEVEL
        builder = builder.add_source(
            Environment::with_prefix("REINDEX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| TypesError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| TypesError::Config(e.to_string()))?;

        settings.migration.validate().map_err(TypesError::Config)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.store.url, "http://localhost:9200");
        assert_eq!(settings.migration.page_size, 100);
        assert_eq!(settings.migration.keep_alive(), Duration::from_secs(300));
        assert_eq!(settings.migration.clock_skew(), chrono::Duration::seconds(1));
        assert_eq!(settings.migration.timestamp_field, "_timestamp");
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_load_with_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.migration.scroll_keep_alive_secs, 300);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reindex.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "log_level = \"debug\"\n[store]\nurl = \"http://es:9200\"\n[migration]\npage_size = 250"
        )
        .unwrap();

        let settings = Settings::load(Some(&path.to_string_lossy())).unwrap();
        assert_eq!(settings.store.url, "http://es:9200");
        assert_eq!(settings.migration.page_size, 250);
        assert_eq!(settings.migration.scroll_keep_alive_secs, 300);
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let result = Settings::load(Some("/definitely/not/here.toml"));
        assert!(matches!(result, Err(TypesError::Config(_))));
    }

    #[test]
    fn test_migration_settings_validation() {
        let mut settings = MigrationSettings::default();
        assert!(settings.validate().is_ok());

        settings.page_size = 0;
        assert!(settings.validate().is_err());

        settings.page_size = 10;
        settings.scroll_keep_alive_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_clock_skew_is_bounded() {
        let mut settings = MigrationSettings {
            clock_skew_secs: MAX_CLOCK_SKEW_SECS,
            ..MigrationSettings::default()
        };
        assert!(settings.validate().is_ok());

        settings.clock_skew_secs = u64::MAX;
        let err = settings.validate().unwrap_err();
        assert!(err.contains("clock_skew_secs"));
        // Never panics, even unvalidated.
        assert_eq!(settings.clock_skew(), chrono::Duration::seconds(86_400));
    }
}
