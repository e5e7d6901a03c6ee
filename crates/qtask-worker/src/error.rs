//! Worker-layer error taxonomy (spec §7).

use thiserror::Error;

/// Fatal faults that stop the consume loop: a broker outage (spec §7:
/// "worker treats as fatal for the loop and exits to let the supervisor
/// restart") or a failed simulator self-check at startup. Task-level
/// failures (parse/execution/unexpected errors, claim contention,
/// malformed messages) never surface here — they're handled inline by
/// [`crate::Worker::handle_delivery`] and always end in an ack or nack.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("broker error: {0}")]
    Broker(#[from] qtask_broker::BrokerError),

    #[error("simulator self-check failed: {0}")]
    SimulatorUnavailable(#[from] qtask_sim::SimError),
}
