//! Store-layer error taxonomy.

use thiserror::Error;

/// An I/O or connection fault surfaced by the store (spec §7:
/// "StorageUnavailable"). Every variant maps to a `503` from the HTTP
/// layer and a negative-ack/redeliver from the worker's consume loop.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    #[error("database migration failed: {0}")]
    MigrationFailed(#[from] sqlx::migrate::MigrateError),
}
