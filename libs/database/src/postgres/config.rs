use sea_orm::ConnectOptions;
use std::time::Duration;
use tracing::log::LevelFilter;

#[cfg(feature = "config")]
use core_config::{ConfigError, FromEnv, env_parse_or_default, env_required};

/// PostgreSQL pool settings.
///
/// ```ignore
/// let config = PostgresConfig::from_env()?;          // DATABASE_URL + DB_*
/// let config = PostgresConfig::new("postgres://..."); // defaults
/// ```
#[derive(Clone, Debug)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    /// Log every statement through sqlx
    pub sqlx_logging: bool,
    pub sqlx_logging_level: LevelFilter,
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_pool_size(mut self, max_connections: u32, min_connections: u32) -> Self {
        self.max_connections = max_connections;
        self.min_connections = min_connections;
        self
    }

    pub fn into_connect_options(self) -> ConnectOptions {
        let mut opt = ConnectOptions::new(self.url);
        opt.max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(self.max_lifetime_secs))
            .sqlx_logging(self.sqlx_logging)
            .sqlx_logging_level(self.sqlx_logging_level);
        opt
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 20,
            min_connections: 2,
            connect_timeout_secs: 8,
            acquire_timeout_secs: 8,
            idle_timeout_secs: 300,
            max_lifetime_secs: 1800,
            sqlx_logging: false,
            sqlx_logging_level: LevelFilter::Debug,
        }
    }
}

/// Environment variables:
/// - `DATABASE_URL` (required)
/// - `DB_MAX_CONNECTIONS` (20), `DB_MIN_CONNECTIONS` (2)
/// - `DB_CONNECT_TIMEOUT_SECS` (8), `DB_ACQUIRE_TIMEOUT_SECS` (8)
/// - `DB_IDLE_TIMEOUT_SECS` (300), `DB_MAX_LIFETIME_SECS` (1800)
/// - `DB_SQLX_LOGGING` (false)
#[cfg(feature = "config")]
impl FromEnv for PostgresConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            url: env_required("DATABASE_URL")?,
            max_connections: env_parse_or_default(
                "DB_MAX_CONNECTIONS",
                &defaults.max_connections.to_string(),
            )?,
            min_connections: env_parse_or_default(
                "DB_MIN_CONNECTIONS",
                &defaults.min_connections.to_string(),
            )?,
            connect_timeout_secs: env_parse_or_default(
                "DB_CONNECT_TIMEOUT_SECS",
                &defaults.connect_timeout_secs.to_string(),
            )?,
            acquire_timeout_secs: env_parse_or_default(
                "DB_ACQUIRE_TIMEOUT_SECS",
                &defaults.acquire_timeout_secs.to_string(),
            )?,
            idle_timeout_secs: env_parse_or_default(
                "DB_IDLE_TIMEOUT_SECS",
                &defaults.idle_timeout_secs.to_string(),
            )?,
            max_lifetime_secs: env_parse_or_default(
                "DB_MAX_LIFETIME_SECS",
                &defaults.max_lifetime_secs.to_string(),
            )?,
            sqlx_logging: env_parse_or_default("DB_SQLX_LOGGING", "false")?,
            sqlx_logging_level: defaults.sqlx_logging_level,
        })
    }
}
