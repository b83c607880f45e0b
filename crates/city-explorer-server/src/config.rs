//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use thiserror::Error;

use city_explorer_db::{Credentials, DbRuntimeSettings, MigrationSource};

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding one SQLite file per schema.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Name of the application schema.
    #[serde(default = "default_schema_name")]
    pub name: String,

    /// Directory of `<ordinal>_<label>.sql` migration files.
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,

    /// Bootstrap script to use instead of the built-in one.
    #[serde(default)]
    pub bootstrap_script: Option<PathBuf>,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

impl DatabaseConfig {
    /// Connection credentials for the database layer.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.data_dir).with_settings(DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
        })
    }

    /// Where migrations are read from.
    pub fn migration_source(&self) -> MigrationSource {
        MigrationSource {
            dir: self.migrations_dir.clone(),
            bootstrap_script: self.bootstrap_script.clone(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "city_explorer_db=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    5050
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_schema_name() -> String {
    "city_explorer_app".to_string()
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_busy_timeout_ms() -> u64 {
    DbRuntimeSettings::default().busy_timeout_ms
}

fn default_pool_max_size() -> u32 {
    DbRuntimeSettings::default().pool_max_size
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            name: default_schema_name(),
            migrations_dir: default_migrations_dir(),
            bootstrap_script: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CITY_EXPLORER_HOST` overrides `server.host`
/// - `CITY_EXPLORER_PORT` overrides `server.port`
/// - `CITY_EXPLORER_DB_DIR` overrides `database.data_dir`
/// - `CITY_EXPLORER_DB_NAME` overrides `database.name`
/// - `CITY_EXPLORER_MIGRATIONS_DIR` overrides `database.migrations_dir`
/// - `CITY_EXPLORER_LOG_LEVEL` overrides `logging.level`
/// - `CITY_EXPLORER_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
}

fn apply_env_overrides(mut config: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(host) = var("CITY_EXPLORER_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("CITY_EXPLORER_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(dir) = var("CITY_EXPLORER_DB_DIR") {
        config.database.data_dir = PathBuf::from(dir);
    }
    if let Some(name) = var("CITY_EXPLORER_DB_NAME") {
        config.database.name = name;
    }
    if let Some(dir) = var("CITY_EXPLORER_MIGRATIONS_DIR") {
        config.database.migrations_dir = PathBuf::from(dir);
    }
    if let Some(level) = var("CITY_EXPLORER_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("CITY_EXPLORER_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).expect("missing file is not an error");

        assert_eq!(config.server.port, 5050);
        assert_eq!(config.database.name, "city_explorer_app");
        assert_eq!(config.database.migrations_dir, PathBuf::from("migrations"));
        assert_eq!(config.database.bootstrap_script, None);
    }

    #[test]
    fn parses_partial_file() {
        let config: Config = toml::from_str(
            r#"
            [database]
            data_dir = "/var/lib/city-explorer"
            name = "explorer_test"
            pool_max_size = 2

            [logging]
            json = true
            "#,
        )
        .expect("should parse");

        assert_eq!(config.database.data_dir, PathBuf::from("/var/lib/city-explorer"));
        assert_eq!(config.database.name, "explorer_test");
        assert_eq!(config.database.pool_max_size, 2);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");

        let credentials = config.database.credentials();
        assert_eq!(credentials.settings.pool_max_size, 2);
        assert_eq!(
            credentials.schema_path("explorer_test"),
            PathBuf::from("/var/lib/city-explorer/explorer_test.db")
        );
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[database\nname = 1").expect("should write config");

        let err = load_config(path.to_str()).expect_err("should fail to parse");
        assert!(matches!(err, ConfigError::Parse(_)), "got {err:?}");
    }

    #[test]
    fn env_overrides_win() {
        let vars: HashMap<&str, &str> = [
            ("CITY_EXPLORER_PORT", "8080"),
            ("CITY_EXPLORER_HOST", "not-an-ip"),
            ("CITY_EXPLORER_DB_NAME", "from_env"),
            ("CITY_EXPLORER_MIGRATIONS_DIR", "/opt/migrations"),
            ("CITY_EXPLORER_LOG_JSON", "1"),
        ]
        .into_iter()
        .collect();

        let config = apply_env_overrides(Config::default(), |key| {
            vars.get(key).map(|v| v.to_string())
        });

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, default_host(), "unparseable host is ignored");
        assert_eq!(config.database.name, "from_env");
        assert_eq!(config.database.migrations_dir, PathBuf::from("/opt/migrations"));
        assert!(config.logging.json);
    }
}
