//! RabbitMQ test infrastructure

use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::rabbitmq::RabbitMq;

/// RabbitMQ container with the default `guest` account.
///
/// ```rust,ignore
/// use test_utils::TestRabbitMq;
///
/// let rabbit = TestRabbitMq::new().await;
/// let connector = AmqpConnector::new(&rabbit.amqp_url, "integration-test");
/// ```
pub struct TestRabbitMq {
    #[allow(dead_code)]
    container: ContainerAsync<RabbitMq>,
    pub host: String,
    pub port: u16,
    pub amqp_url: String,
}

impl TestRabbitMq {
    pub async fn new() -> Self {
        let container = RabbitMq::default()
            .with_tag("4-management-alpine")
            .start()
            .await
            .expect("Failed to start RabbitMQ container");

        let port = container
            .get_host_port_ipv4(5672)
            .await
            .expect("Failed to get AMQP port");
        let host = "127.0.0.1".to_string();
        let amqp_url = format!("amqp://guest:guest@{}:{}/%2f", host, port);

        tracing::info!(port, "Test RabbitMQ ready");

        Self {
            container,
            host,
            port,
            amqp_url,
        }
    }
}

impl Drop for TestRabbitMq {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test RabbitMQ container");
    }
}
