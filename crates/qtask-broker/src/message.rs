//! Wire shape of a published task message (spec §4.2).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of a message published to the `quantum_tasks` queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskMessage {
    pub task_id: Uuid,
    pub circuit: String,
}

/// A delivered message, raw body plus the broker properties the worker
/// needs to correlate logs and ack/nack.
///
/// The body is handed over undecoded: decoding — and classifying a
/// malformed body as a poison message to ack-without-requeue rather than
/// a broker fault — is the consumer's job (spec §4.5 step a), not this
/// crate's. A broker that ate decode errors itself would have nowhere to
/// return the acker needed to drop the poison message safely.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub body: Vec<u8>,
    pub correlation_id: String,
    pub message_id: Option<String>,
}

impl Delivery {
    /// Convenience for consumers: decode the body as a [`TaskMessage`].
    pub fn parse(&self) -> Result<TaskMessage, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}
