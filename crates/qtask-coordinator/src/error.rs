//! Coordinator-layer error taxonomy (spec §4.4, §7).

use qtask_core::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("database unavailable: {0}")]
    StorageUnavailable(#[from] qtask_store::StoreError),

    /// Publish failed after the task was already persisted as `PENDING`
    /// (spec §4.4: "persist first, publish second" — not rolled back).
    #[error("queue unavailable: {0}")]
    BrokerUnavailable(#[from] qtask_broker::BrokerError),
}
