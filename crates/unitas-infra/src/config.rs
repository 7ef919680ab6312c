//! Configuration loader for Unitas.
//!
//! Reads a TOML file into [`UnitasConfig`] and layers `UNITAS_*` environment
//! variables on top. Falls back to defaults when the file is missing or
//! malformed.

use std::path::Path;

use unitas_types::config::UnitasConfig;

pub const ENV_DATABASE_URL: &str = "UNITAS_DATABASE_URL";
pub const ENV_POOL_SIZE: &str = "UNITAS_POOL_SIZE";
pub const ENV_MAX_OVERFLOW: &str = "UNITAS_MAX_OVERFLOW";
pub const ENV_DB_ECHO: &str = "UNITAS_DB_ECHO";

/// Load configuration from `path`.
///
/// - If the file does not exist, returns [`UnitasConfig::default()`].
/// - If the file cannot be read or parsed, logs a warning and returns the default.
pub async fn load_config(path: &Path) -> UnitasConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return UnitasConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return UnitasConfig::default();
        }
    };

    match toml::from_str::<UnitasConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            UnitasConfig::default()
        }
    }
}

/// Apply `UNITAS_*` overrides from the process environment.
pub fn apply_env_overrides(config: UnitasConfig) -> UnitasConfig {
    apply_overrides(config, |key| std::env::var(key).ok())
}

/// Apply overrides read through `lookup`. Values that fail to parse are
/// ignored with a warning.
pub fn apply_overrides(mut config: UnitasConfig, lookup: impl Fn(&str) -> Option<String>) -> UnitasConfig {
    if let Some(url) = lookup(ENV_DATABASE_URL).filter(|u| !u.trim().is_empty()) {
        config.database.url = url;
    }
    if let Some(size) = parse_var(&lookup, ENV_POOL_SIZE) {
        config.database.pool_size = size;
    }
    if let Some(overflow) = parse_var(&lookup, ENV_MAX_OVERFLOW) {
        config.database.max_overflow = overflow;
    }
    if let Some(raw) = lookup(ENV_DB_ECHO) {
        match parse_flag(&raw) {
            Some(echo) => config.database.echo = echo,
            None => tracing::warn!("Ignoring {ENV_DB_ECHO}={raw}: expected a boolean"),
        }
    }
    config
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u32> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("Ignoring {key}={raw}: {err}");
            None
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("config.toml")).await;
        assert_eq!(config.database.pool_size, 5);
        assert_eq!(config.database.max_overflow, 50);
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(
            &path,
            r#"
[database]
url = "sqlite://data/app.db?mode=rwc"
pool_size = 2
echo = true

[logging]
json = true
"#,
        )
        .await
        .unwrap();

        let config = load_config(&path).await;
        assert_eq!(config.database.url, "sqlite://data/app.db?mode=rwc");
        assert_eq!(config.database.pool_size, 2);
        assert_eq!(config.database.max_overflow, 50);
        assert!(config.database.echo);
        assert!(config.logging.json);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(&path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(&path).await;
        assert_eq!(config.database.pool_size, 5);
    }

    #[test]
    fn overrides_replace_file_values() {
        let config = apply_overrides(
            UnitasConfig::default(),
            env(&[
                (ENV_DATABASE_URL, "sqlite://override.db"),
                (ENV_POOL_SIZE, "8"),
                (ENV_MAX_OVERFLOW, "0"),
                (ENV_DB_ECHO, "true"),
            ]),
        );
        assert_eq!(config.database.url, "sqlite://override.db");
        assert_eq!(config.database.pool_size, 8);
        assert_eq!(config.database.max_overflow, 0);
        assert!(config.database.echo);
    }

    #[test]
    fn unparseable_overrides_are_ignored() {
        let config = apply_overrides(
            UnitasConfig::default(),
            env(&[
                (ENV_DATABASE_URL, "  "),
                (ENV_POOL_SIZE, "many"),
                (ENV_DB_ECHO, "sometimes"),
            ]),
        );
        assert_eq!(config.database.url, "sqlite://unitas.db?mode=rwc");
        assert_eq!(config.database.pool_size, 5);
        assert!(!config.database.echo);
    }

    #[test]
    fn no_overrides_keeps_config() {
        let config = apply_overrides(UnitasConfig::default(), |_| None);
        assert_eq!(config.database, UnitasConfig::default().database);
    }
}
