use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scorer::ScoringWeights;

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub routing: RoutingConfig,
    pub sweeper: SweeperConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    /// How long a connection waits on a locked database before
    /// giving up. Milliseconds, applied per connection.
    pub busy_timeout_ms: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoutingConfig {
    pub weights: ScoringWeights,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SweeperConfig {
    pub interval_secs: u64,
    pub batch_limit: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub sweeper_interval_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    database: RawDatabase,
    #[serde(default)]
    routing: RawRouting,
    #[serde(default)]
    sweeper: RawSweeper,
    #[serde(default)]
    logging: RawLogging,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RawDatabase {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    busy_timeout_ms: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RawRouting {
    weights: Option<ScoringWeights>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RawSweeper {
    interval_secs: Option<u64>,
    batch_limit: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RawLogging {
    level: Option<String>,
    format: Option<String>,
}

const DEFAULT_DATABASE_URL: &str = "sqlite://leadpath.db";
const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5_000;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_SWEEP_BATCH_LIMIT: u32 = 200;

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let raw = match resolve_path(&options) {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(&path)
                    .map_err(|source| ConfigError::ReadFile { path: path.clone(), source })?;
                toml::from_str::<RawConfig>(&contents)
                    .map_err(|source| ConfigError::ParseFile { path, source })?
            }
            Some(path) if options.require_file => {
                return Err(ConfigError::MissingConfigFile(path));
            }
            _ => RawConfig::default(),
        };

        let mut config = AppConfig {
            database: DatabaseConfig {
                url: raw.database.url.unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
                max_connections: raw.database.max_connections.unwrap_or(5),
                timeout_secs: raw.database.timeout_secs.unwrap_or(30),
                busy_timeout_ms: raw.database.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
            },
            routing: RoutingConfig {
                weights: raw.routing.weights.unwrap_or_default(),
            },
            sweeper: SweeperConfig {
                interval_secs: raw.sweeper.interval_secs.unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
                batch_limit: raw.sweeper.batch_limit.unwrap_or(DEFAULT_SWEEP_BATCH_LIMIT),
            },
            logging: LoggingConfig {
                level: raw.logging.level.unwrap_or_else(|| "info".to_string()),
                format: match raw.logging.format.as_deref() {
                    Some(value) => LogFormat::parse(value).ok_or_else(|| {
                        ConfigError::Validation(format!("unknown logging.format `{value}`"))
                    })?,
                    None => LogFormat::default(),
                },
            },
        };

        apply_env_overrides(&mut config)?;
        apply_explicit_overrides(&mut config, &options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.sweeper.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "sweeper.interval_secs must be positive".to_string(),
            ));
        }
        let weights = &self.routing.weights;
        for (name, value) in [
            ("capacity", weights.capacity),
            ("geography", weights.geography),
            ("price_band", weights.price_band),
            ("performance", weights.performance),
        ] {
            if !(0.0..=10.0).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "routing.weights.{name} must be within [0, 10], got {value}"
                )));
            }
        }
        Ok(())
    }
}

fn resolve_path(options: &LoadOptions) -> Option<PathBuf> {
    options
        .config_path
        .clone()
        .or_else(|| env::var("LEADPATH_CONFIG").ok().map(PathBuf::from))
        .or_else(|| Some(PathBuf::from("leadpath.toml")))
}

fn apply_env_overrides(config: &mut AppConfig) -> Result<(), ConfigError> {
    if let Ok(url) = env::var("LEADPATH_DATABASE_URL") {
        config.database.url = url;
    }
    if let Ok(level) = env::var("LEADPATH_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(value) = env::var("LEADPATH_SWEEP_INTERVAL_SECS") {
        config.sweeper.interval_secs = value.parse().map_err(|_| {
            ConfigError::InvalidEnvOverride { key: "LEADPATH_SWEEP_INTERVAL_SECS".to_string(), value }
        })?;
    }
    Ok(())
}

fn apply_explicit_overrides(config: &mut AppConfig, overrides: &ConfigOverrides) {
    if let Some(url) = &overrides.database_url {
        config.database.url = url.clone();
    }
    if let Some(level) = &overrides.log_level {
        config.logging.level = level.clone();
    }
    if let Some(interval) = overrides.sweeper_interval_secs {
        config.sweeper.interval_secs = interval;
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    #[test]
    fn defaults_cover_every_section() {
        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("load defaults");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.sweeper.interval_secs, 60);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.routing.weights.capacity > 0.0);
    }

    #[test]
    fn zero_sweep_interval_fails_validation() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                sweeper_interval_secs: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("/nonexistent/leadpath.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        });

        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }
}
