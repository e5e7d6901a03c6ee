//! An in-memory [`Broker`] for tests that don't want a live RabbitMQ
//! instance. Published messages are handed straight to the consumer side
//! through an unbounded channel, with no real durability or redelivery —
//! callers that need to exercise redelivery semantics should construct a
//! [`RawDelivery`] directly and re-publish it via [`FakeBroker::requeue`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::{Ackable, Broker, BrokerError, Delivery, RawDelivery, TaskMessage};

/// What happened to a single delivery, recorded for test assertions —
/// `qtask-worker`'s tests use this to check it acks poison messages
/// without requeue and nacks storage faults with requeue (spec §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckEvent {
    Ack { message_id: Option<String> },
    Nack { message_id: Option<String>, requeue: bool },
}

struct FakeAcker {
    message_id: Option<String>,
    log: Arc<Mutex<Vec<AckEvent>>>,
}

#[async_trait]
impl Ackable for FakeAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.log.lock().await.push(AckEvent::Ack { message_id: self.message_id.clone() });
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.log.lock().await.push(AckEvent::Nack { message_id: self.message_id.clone(), requeue });
        Ok(())
    }
}

/// An in-memory stand-in for [`crate::BrokerClient`].
pub struct FakeBroker {
    sender: mpsc::UnboundedSender<Delivery>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Delivery>>>,
    healthy: AtomicBool,
    ack_log: Arc<Mutex<Vec<AckEvent>>>,
}

impl Default for FakeBroker {
    fn default() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            healthy: AtomicBool::new(true),
            ack_log: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: `publish`/`health` fail until cleared.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Push a delivery directly onto the consume stream, bypassing
    /// `publish` — used to simulate a redelivered message.
    pub fn push(&self, delivery: Delivery) {
        let _ = self.sender.send(delivery);
    }

    /// Every ack/nack recorded so far, in order.
    pub async fn ack_events(&self) -> Vec<AckEvent> {
        self.ack_log.lock().await.clone()
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn publish(&self, task_id: Uuid, circuit: &str, correlation_id: &str) -> Result<(), BrokerError> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(BrokerError::NotConnected);
        }
        let body = serde_json::to_vec(&TaskMessage { task_id, circuit: circuit.to_string() })
            .expect("TaskMessage always serializes");
        let delivery = Delivery {
            body,
            correlation_id: correlation_id.to_string(),
            message_id: Some(Uuid::new_v4().to_string()),
        };
        let _ = self.sender.send(delivery);
        Ok(())
    }

    async fn consume(&self, _consumer_tag: &str) -> Result<BoxStream<'static, Result<RawDelivery, BrokerError>>, BrokerError> {
        let receiver = self
            .receiver
            .lock()
            .await
            .take()
            .expect("FakeBroker::consume called more than once");

        let ack_log = self.ack_log.clone();
        let stream = UnboundedReceiverStream::new(receiver).map(move |delivery| {
            let message_id = delivery.message_id.clone();
            let acker = Box::new(FakeAcker { message_id, log: ack_log.clone() });
            Ok(RawDelivery::new(delivery, acker))
        });

        Ok(Box::pin(stream))
    }

    async fn health(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}
