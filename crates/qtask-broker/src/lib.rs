//! # qtask-broker
//!
//! A durable-queue RabbitMQ client for the quantum task queue (spec §4.2).
//! Wraps `lapin` the way the system this was distilled from wraps
//! `aio_pika`: a process-wide connection established with retrying
//! exponential backoff, a single channel reused for publish, and a
//! dedicated consumer channel with `prefetch = 1` for fair dispatch.

pub mod error;
#[cfg(feature = "fake")]
pub mod fake;
pub mod message;

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use uuid::Uuid;

pub use error::BrokerError;
pub use message::{Delivery, TaskMessage};

/// Name of the durable queue every task is published to (spec §4.2).
pub const QUEUE_NAME: &str = "quantum_tasks";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const BACKOFF_FACTOR: u32 = 2;
const MAX_CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Acknowledges or rejects a single delivery. Implemented for the real
/// `lapin` acker and, behind the `fake` feature, for an in-memory stand-in
/// — lets `qtask-worker` be tested without a live broker.
#[async_trait]
pub trait Ackable: Send + Sync {
    async fn ack(&self) -> Result<(), BrokerError>;
    async fn nack(&self, requeue: bool) -> Result<(), BrokerError>;
}

struct LapinAcker(lapin::acker::Acker);

#[async_trait]
impl Ackable for LapinAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.0.ack(BasicAckOptions::default()).await.map_err(BrokerError::from)
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.0
            .nack(BasicNackOptions { requeue, ..Default::default() })
            .await
            .map_err(BrokerError::from)
    }
}

/// A delivered message plus the handle needed to ack/nack it.
pub struct RawDelivery {
    pub delivery: Delivery,
    acker: Box<dyn Ackable>,
}

impl RawDelivery {
    pub fn new(delivery: Delivery, acker: Box<dyn Ackable>) -> Self {
        Self { delivery, acker }
    }

    /// Acknowledge successful handling (spec §4.2: "on handler success the
    /// message is acknowledged").
    pub async fn ack(&self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }

    /// Negatively acknowledge, optionally requeuing. The worker uses
    /// `requeue = false` for poison messages (malformed payload) and
    /// `requeue = true` (default broker behavior) otherwise (spec §7).
    pub async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.acker.nack(requeue).await
    }
}

/// The broker contract `qtask-coordinator` and `qtask-worker` depend on.
/// A trait (rather than a bare `BrokerClient`) so both can be tested
/// against [`fake::FakeBroker`] without a live RabbitMQ instance.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish a task message with persistent delivery mode (spec §4.2).
    async fn publish(
        &self,
        task_id: Uuid,
        circuit: &str,
        correlation_id: &str,
    ) -> Result<(), BrokerError>;

    /// Open a consumer with `prefetch = 1`, yielding deliveries one at a
    /// time (spec §4.2).
    async fn consume(&self, consumer_tag: &str) -> Result<BoxStream<'static, Result<RawDelivery, BrokerError>>, BrokerError>;

    /// Connection open AND a test channel can be opened and closed
    /// (spec §4.2).
    async fn health(&self) -> bool;
}

/// The `lapin`-backed [`Broker`] implementation: a process-wide connection
/// and a channel reused for publishing.
pub struct BrokerClient {
    connection: Connection,
    publish_channel: Channel,
}

impl BrokerClient {
    /// Establish a connection with exponential backoff: initial 1s,
    /// factor 2, cap 60s, up to 5 attempts (spec §4.2). Declares the
    /// topology and opens the publish channel before returning.
    pub async fn connect(amqp_url: &str) -> Result<Self, BrokerError> {
        let connection = Self::connect_with_retry(amqp_url).await?;
        let publish_channel = connection.create_channel().await?;
        Self::declare_topology(&publish_channel).await?;
        Ok(Self { connection, publish_channel })
    }

    async fn connect_with_retry(amqp_url: &str) -> Result<Connection, BrokerError> {
        let mut delay = INITIAL_BACKOFF;
        let mut last_err = None;

        for attempt in 1..=MAX_CONNECT_ATTEMPTS {
            tracing::info!(attempt, max_attempts = MAX_CONNECT_ATTEMPTS, "connecting to broker");
            let outcome = tokio::time::timeout(
                CONNECT_TIMEOUT,
                Connection::connect(amqp_url, ConnectionProperties::default()),
            )
            .await;

            match outcome {
                Ok(Ok(conn)) => {
                    tracing::info!("broker connection established");
                    return Ok(conn);
                }
                Ok(Err(e)) => {
                    tracing::warn!(attempt, error = %e, "broker connect attempt failed");
                    last_err = Some(e);
                }
                Err(_) => {
                    tracing::warn!(attempt, "broker connect attempt timed out");
                    last_err = Some(lapin::Error::InvalidConnectionState(
                        lapin::ConnectionState::Closed,
                    ));
                }
            }

            if attempt < MAX_CONNECT_ATTEMPTS {
                tokio::time::sleep(delay).await;
                delay = (delay * BACKOFF_FACTOR).min(MAX_BACKOFF);
            }
        }

        Err(BrokerError::ConnectFailed {
            attempts: MAX_CONNECT_ATTEMPTS,
            source: last_err.expect("at least one attempt was made"),
        })
    }

    /// Durable, non-auto-delete, no special arguments — idempotent across
    /// restarts (spec §4.2).
    async fn declare_topology(channel: &Channel) -> Result<(), BrokerError> {
        channel
            .queue_declare(
                QUEUE_NAME,
                QueueDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    pub async fn close(&self) -> Result<(), BrokerError> {
        self.publish_channel.close(200, "normal shutdown").await?;
        self.connection.close(200, "normal shutdown").await?;
        Ok(())
    }
}

#[async_trait]
impl Broker for BrokerClient {
    async fn publish(
        &self,
        task_id: Uuid,
        circuit: &str,
        correlation_id: &str,
    ) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(&TaskMessage { task_id, circuit: circuit.to_string() })
            .expect("TaskMessage always serializes");

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2) // persistent
            .with_message_id(Uuid::new_v4().to_string().into())
            .with_correlation_id(correlation_id.to_string().into())
            .with_timestamp(chrono::Utc::now().timestamp() as u64);

        self.publish_channel
            .basic_publish(
                "",
                QUEUE_NAME,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await?
            .await?;

        Ok(())
    }

    async fn consume(&self, consumer_tag: &str) -> Result<BoxStream<'static, Result<RawDelivery, BrokerError>>, BrokerError> {
        let channel = self.connection.create_channel().await?;
        channel.basic_qos(1, Default::default()).await?;
        Self::declare_topology(&channel).await?;

        let consumer = channel
            .basic_consume(
                QUEUE_NAME,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let stream = consumer.map(|result| {
            let delivery = result?;
            let correlation_id = delivery
                .properties
                .correlation_id()
                .as_ref()
                .map(|s| s.to_string())
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let message_id = delivery.properties.message_id().as_ref().map(|s| s.to_string());
            let acker = Box::new(LapinAcker(delivery.acker.clone()));

            Ok(RawDelivery::new(
                Delivery { body: delivery.data, correlation_id, message_id },
                acker,
            ))
        });

        Ok(Box::pin(stream))
    }

    async fn health(&self) -> bool {
        if !self.connection.status().connected() {
            return false;
        }
        match self.connection.create_channel().await {
            Ok(ch) => ch.close(200, "health check").await.is_ok(),
            Err(_) => false,
        }
    }
}
