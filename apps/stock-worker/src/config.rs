use core_config::{AppInfo, ConfigError, Environment, FromEnv, app_info, broker::BrokerConfig};
use core_config::{env_parse_or_default, server::ServerConfig};
use database::postgres::PostgresConfig;

const DEFAULT_PORT: u16 = 8081;
pub const CONNECTION_NAME: &str = "StockConsumer";

/// Stock worker configuration, composed from the shared config components.
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub environment: Environment,
    /// Serves the products API, health and metrics
    pub server: ServerConfig,
    pub database: PostgresConfig,
    pub broker: BrokerConfig,
    /// `RUN_MIGRATIONS` (true)
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            app: app_info!(),
            environment: Environment::from_env(),
            server: ServerConfig::from_env_with_default_port(DEFAULT_PORT)?,
            database: PostgresConfig::from_env()?,
            broker: BrokerConfig::from_env()?.with_connection_name(CONNECTION_NAME),
            run_migrations: env_parse_or_default("RUN_MIGRATIONS", "true")?,
        })
    }
}
