use core_config::{AppInfo, ConfigError, Environment, FromEnv, app_info, broker::BrokerConfig};
use core_config::{env_parse_or_default, server::ServerConfig};
use database::postgres::PostgresConfig;
use domain_sales::StockServiceConfig;

const DEFAULT_PORT: u16 = 8080;
pub const CONNECTION_NAME: &str = "SalesPublisher";

/// Sales API configuration, composed from the shared config components.
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: PostgresConfig,
    pub broker: BrokerConfig,
    pub stock_service: StockServiceConfig,
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
            stock_service: StockServiceConfig::from_env()?,
            run_migrations: env_parse_or_default("RUN_MIGRATIONS", "true")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [(&str, Option<&str>); 2] = [
        ("DATABASE_URL", Some("postgres://localhost/sales")),
        ("STOCK_SERVICE_BASE_URL", Some("http://stock:8081")),
    ];

    #[test]
    fn test_from_env_defaults() {
        temp_env::with_vars(
            [
                REQUIRED[0],
                REQUIRED[1],
                ("PORT", None),
                ("RUN_MIGRATIONS", None),
            ],
            || {
                let config = Config::from_env().unwrap();

                assert_eq!(config.server.port, 8080);
                assert_eq!(config.broker.connection_name, "SalesPublisher");
                assert_eq!(config.stock_service.base_url, "http://stock:8081");
                assert!(config.run_migrations);
            },
        );
    }

    #[test]
    fn test_stock_service_url_is_required() {
        temp_env::with_vars(
            [REQUIRED[0], ("STOCK_SERVICE_BASE_URL", None)],
            || {
                assert!(matches!(
                    Config::from_env(),
                    Err(ConfigError::MissingEnvVar(key)) if key == "STOCK_SERVICE_BASE_URL"
                ));
            },
        );
    }

    #[test]
    fn test_invalid_migration_flag() {
        temp_env::with_vars(
            [REQUIRED[0], REQUIRED[1], ("RUN_MIGRATIONS", Some("sometimes"))],
            || {
                assert!(matches!(
                    Config::from_env(),
                    Err(ConfigError::ParseError { .. })
                ));
            },
        );
    }
}
