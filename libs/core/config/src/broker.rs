//! Message broker (AMQP) configuration.

use crate::{env_or_default, env_parse_or_default, ConfigError, FromEnv};

/// Connection settings and topology names for the message broker.
///
/// Queue, exchange and routing key are deployment configuration; the
/// publisher and the consumer of one deployment must agree on all three.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    /// Cap on unacknowledged deliveries held by one consumer channel
    pub prefetch_count: u16,
    /// Name reported to the broker for this client connection
    pub connection_name: String,
}

impl BrokerConfig {
    /// Build the `amqp://` URI for this configuration.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            urlencoding::encode(&self.vhost),
        )
    }

    /// Set the connection name reported to the broker.
    pub fn with_connection_name(mut self, name: impl Into<String>) -> Self {
        self.connection_name = name.into();
        self
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            queue: "sales.notifications".to_string(),
            exchange: "sales.exchange".to_string(),
            routing_key: "sales.created".to_string(),
            prefetch_count: 10,
            connection_name: "sales-pipeline".to_string(),
        }
    }
}

impl FromEnv for BrokerConfig {
    /// Environment variables (all optional, defaults in parentheses):
    /// - `RABBITMQ_HOST` (localhost), `RABBITMQ_PORT` (5672)
    /// - `RABBITMQ_USERNAME` / `RABBITMQ_PASSWORD` (guest / guest)
    /// - `RABBITMQ_VHOST` (/)
    /// - `RABBITMQ_QUEUE`, `RABBITMQ_EXCHANGE`, `RABBITMQ_ROUTING_KEY`
    /// - `RABBITMQ_PREFETCH_COUNT` (10)
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let prefetch_count: u16 = env_parse_or_default(
            "RABBITMQ_PREFETCH_COUNT",
            &defaults.prefetch_count.to_string(),
        )?;
        if prefetch_count == 0 {
            return Err(ConfigError::ParseError {
                key: "RABBITMQ_PREFETCH_COUNT".to_string(),
                details: "prefetch count must be at least 1".to_string(),
            });
        }

        Ok(Self {
            host: env_or_default("RABBITMQ_HOST", &defaults.host),
            port: env_parse_or_default("RABBITMQ_PORT", &defaults.port.to_string())?,
            username: env_or_default("RABBITMQ_USERNAME", &defaults.username),
            password: env_or_default("RABBITMQ_PASSWORD", &defaults.password),
            vhost: env_or_default("RABBITMQ_VHOST", &defaults.vhost),
            queue: env_or_default("RABBITMQ_QUEUE", &defaults.queue),
            exchange: env_or_default("RABBITMQ_EXCHANGE", &defaults.exchange),
            routing_key: env_or_default("RABBITMQ_ROUTING_KEY", &defaults.routing_key),
            prefetch_count,
            connection_name: defaults.connection_name,
        })
    }
}
