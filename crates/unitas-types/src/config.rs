//! Configuration types for Unitas.
//!
//! `UnitasConfig` represents the top-level `config.toml`. Every field has a
//! default so an empty file is valid.

use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitasConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection pool settings.
///
/// The pool keeps `pool_size` connections warm and may open up to
/// `max_overflow` more under load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. `sqlite://data/app.db?mode=rwc`.
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    #[serde(default = "default_max_overflow")]
    pub max_overflow: u32,

    /// Log every statement sent to the store.
    #[serde(default)]
    pub echo: bool,

    /// Seconds a session waits for a free connection before giving up.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Log pool occupancy when a unit-of-work scope starts and ends.
    #[serde(default)]
    pub log_pool_status: bool,
}

fn default_url() -> String {
    "sqlite://unitas.db?mode=rwc".to_string()
}

fn default_pool_size() -> u32 {
    5
}

fn default_max_overflow() -> u32 {
    50
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            pool_size: default_pool_size(),
            max_overflow: default_max_overflow(),
            echo: false,
            acquire_timeout_secs: default_acquire_timeout_secs(),
            log_pool_status: false,
        }
    }
}

impl DatabaseConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Upper bound on simultaneously open connections.
    pub fn max_connections(&self) -> u32 {
        self.pool_size.saturating_add(self.max_overflow)
    }

    pub fn validate(&self) -> DataResult<()> {
        if self.max_connections() == 0 {
            return Err(DataError::connection(
                "pool_size and max_overflow are both zero; the pool could never lease a connection",
            ));
        }
        if self.url.trim().is_empty() {
            return Err(DataError::connection("database url is empty"));
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,

    /// Bridge spans to OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,

    /// Filter directive used when `RUST_LOG` is unset, e.g. `info,unitas_infra=debug`.
    #[serde(default)]
    pub filter: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_default_values() {
        let config = DatabaseConfig::default();
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.max_overflow, 50);
        assert_eq!(config.max_connections(), 55);
        assert!(!config.echo);
        assert_eq!(config.acquire_timeout_secs, 30);
    }

    #[test]
    fn test_config_deserialize_empty_uses_defaults() {
        let config: UnitasConfig = toml::from_str("").unwrap();
        assert_eq!(config.database, DatabaseConfig::default());
        assert!(!config.logging.json);
    }

    #[test]
    fn test_config_deserialize_with_values() {
        let toml_str = r#"
[database]
url = "sqlite://data/app.db"
pool_size = 2
max_overflow = 0
echo = true

[logging]
json = true
filter = "debug"
"#;
        let config: UnitasConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database.url, "sqlite://data/app.db");
        assert_eq!(config.database.max_connections(), 2);
        assert!(config.database.echo);
        assert_eq!(config.database.acquire_timeout_secs, 30);
        assert!(config.logging.json);
        assert_eq!(config.logging.filter.as_deref(), Some("debug"));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = DatabaseConfig {
            pool_size: 0,
            max_overflow: 0,
            ..DatabaseConfig::default()
        };
        assert!(matches!(config.validate(), Err(DataError::Connection { .. })));
        assert!(DatabaseConfig::default().validate().is_ok());
    }
}
