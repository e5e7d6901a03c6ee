//! Broker-layer error taxonomy.

use thiserror::Error;

/// A connect/publish/consume fault (spec §7: "BrokerUnavailable"). Every
/// variant is surfaced as a `503` from the HTTP layer and treated as
/// fatal by the worker's consume loop — see `qtask-worker`.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("could not establish RabbitMQ connection after {attempts} attempts: {source}")]
    ConnectFailed {
        attempts: u32,
        #[source]
        source: lapin::Error,
    },

    #[error("broker operation failed: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("no connection established; call connect() first")]
    NotConnected,
}
