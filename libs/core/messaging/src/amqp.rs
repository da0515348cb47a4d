//! AMQP 0-9-1 backend (RabbitMQ) on top of `lapin`.

use crate::broker::{
    Acknowledger, BrokerSession, Connector, Delivery, DeliveryStream, MessageProperties,
};
use crate::error::{BrokerError, BrokerResult};
use crate::topology::Topology;
use async_trait::async_trait;
use core_config::broker::BrokerConfig;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::sync::Arc;
use tracing::{debug, info};

/// Delivery mode marking a message as persistent.
const PERSISTENT: u8 = 2;

/// Opens connections to one broker under one client-provided name.
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    uri: String,
    connection_name: String,
}

impl AmqpConnector {
    pub fn new(uri: impl Into<String>, connection_name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            connection_name: connection_name.into(),
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(config.uri(), &config.connection_name)
    }
}

#[async_trait]
impl Connector for AmqpConnector {
    type Session = AmqpSession;

    async fn connect(&self) -> BrokerResult<AmqpSession> {
        let properties = ConnectionProperties::default()
            .with_connection_name(self.connection_name.clone().into());

        let connection = Connection::connect(&self.uri, properties)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connection(format!("channel: {}", e)))?;

        info!(
            connection_name = %self.connection_name,
            channel_id = channel.id(),
            "Connected to broker"
        );

        Ok(AmqpSession {
            connection: Arc::new(connection),
            channel,
        })
    }
}

/// A lapin connection with the single channel opened on it.
#[derive(Clone)]
pub struct AmqpSession {
    connection: Arc<Connection>,
    channel: Channel,
}

#[async_trait]
impl BrokerSession for AmqpSession {
    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn declare_topology(&self, topology: &Topology) -> BrokerResult<()> {
        let declare = async {
            self.channel
                .queue_declare(
                    &topology.queue,
                    QueueDeclareOptions {
                        durable: true,
                        exclusive: false,
                        auto_delete: false,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;

            self.channel
                .exchange_declare(
                    &topology.exchange,
                    ExchangeKind::Direct,
                    ExchangeDeclareOptions {
                        durable: true,
                        auto_delete: false,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;

            self.channel
                .queue_bind(
                    &topology.queue,
                    &topology.exchange,
                    &topology.routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;

            Ok::<(), lapin::Error>(())
        };

        declare
            .await
            .map_err(|e| BrokerError::Topology(e.to_string()))
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: &MessageProperties,
    ) -> BrokerResult<()> {
        let mut amqp_properties =
            BasicProperties::default().with_content_type(properties.content_type.as_str().into());
        if properties.persistent {
            amqp_properties = amqp_properties.with_delivery_mode(PERSISTENT);
        }

        // No publisher confirms: completing the call is enough.
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                amqp_properties,
            )
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn set_prefetch(&self, prefetch_count: u16) -> BrokerResult<()> {
        self.channel
            .basic_qos(prefetch_count, BasicQosOptions::default())
            .await?;
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> BrokerResult<DeliveryStream> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Consume(e.to_string()))?;

        let stream = consumer.map(|result| {
            result
                .map(|delivery| {
                    Delivery::new(
                        delivery.delivery_tag,
                        delivery.redelivered,
                        delivery.data,
                        Box::new(AmqpAcker(delivery.acker)),
                    )
                })
                .map_err(|e| BrokerError::Consume(e.to_string()))
        });
        Ok(stream.boxed())
    }

    async fn close(&self) -> BrokerResult<()> {
        if self.channel.status().connected() {
            self.channel.close(200, "OK").await?;
            debug!("Channel closed");
        }
        if self.connection.status().connected() {
            self.connection.close(200, "OK").await?;
            debug!("Connection closed");
        }
        Ok(())
    }
}

struct AmqpAcker(Acker);

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(&self) -> BrokerResult<()> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Consume(format!("ack: {}", e)))
    }

    async fn nack(&self, requeue: bool) -> BrokerResult<()> {
        self.0
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Consume(format!("nack: {}", e)))
    }
}
