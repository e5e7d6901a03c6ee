//! # qtask-coordinator
//!
//! Ties the store and broker together on the submission path (spec §4.4):
//! validate, persist, publish, in that order. Persist-first-publish-second
//! is deliberate — see [`submit`]'s doc comment.

pub mod error;

use std::sync::Arc;

use qtask_core::task::Task;
use qtask_broker::Broker;
use qtask_store::Store;

pub use error::CoordinatorError;

/// Wires a [`Store`] and a [`Broker`] together behind the single
/// `submit` operation the HTTP layer calls.
pub struct Coordinator {
    store: Arc<dyn Store>,
    broker: Arc<dyn Broker>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn Store>, broker: Arc<dyn Broker>) -> Self {
        Self { store, broker }
    }

    /// 1. Validate `circuit`/`shots`. 2. Persist the task as `PENDING`.
    /// 3. Publish it. 4. Return the task.
    ///
    /// Ordering is deliberate: **persist first, publish second**. If the
    /// publish fails, the task remains in the store as `PENDING` rather
    /// than being rolled back — reporting a 503 to the caller while
    /// leaving the row in place yields at-least-once delivery (a later
    /// reconciliation pass, out of scope here, could re-enqueue orphaned
    /// pending tasks). Publishing before persisting would risk a message
    /// referencing a task that doesn't exist yet.
    #[tracing::instrument(skip(self, circuit), fields(correlation_id = %correlation_id))]
    pub async fn submit(
        &self,
        circuit: &str,
        shots: Option<i32>,
        correlation_id: &str,
    ) -> Result<Task, CoordinatorError> {
        let (circuit, shots) = qtask_core::validation::validate_submission(circuit, shots)?;

        let task = self.store.create_task(&circuit, shots).await?;
        tracing::info!(task_id = %task.task_id, "task_created_in_database");

        match self.broker.publish(task.task_id, &circuit, correlation_id).await {
            Ok(()) => {
                tracing::info!(task_id = %task.task_id, "task_published_to_queue");
            }
            Err(err) => {
                tracing::error!(task_id = %task.task_id, error = %err, "queue_publish_failed");
                return Err(CoordinatorError::BrokerUnavailable(err));
            }
        }

        tracing::info!(task_id = %task.task_id, "task_submitted_successfully");
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qtask_broker::fake::FakeBroker;
    use qtask_store::fake::FakeStore;

    fn coordinator() -> (Coordinator, Arc<FakeStore>, Arc<FakeBroker>) {
        let store = Arc::new(FakeStore::new());
        let broker = Arc::new(FakeBroker::new());
        let coordinator = Coordinator::new(store.clone(), broker.clone());
        (coordinator, store, broker)
    }

    #[tokio::test]
    async fn submit_persists_then_publishes() {
        let (coordinator, store, _broker) = coordinator();
        let task = coordinator
            .submit("OPENQASM 3; qubit q;", Some(50), "corr-1")
            .await
            .unwrap();

        assert_eq!(task.shots, 50);
        let stored = store.get_task(task.task_id).await.unwrap().unwrap();
        assert_eq!(stored.task_id, task.task_id);
    }

    #[tokio::test]
    async fn submit_rejects_empty_circuit_without_touching_the_store() {
        let (coordinator, store, _broker) = coordinator();
        let err = coordinator.submit("", None, "corr-2").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Validation(_)));
        assert!(store.task_ids().await.is_empty());
    }

    #[tokio::test]
    async fn submit_rejects_out_of_range_shots() {
        let (coordinator, _store, _broker) = coordinator();
        let err = coordinator.submit("OPENQASM 3; qubit q;", Some(0), "corr-3").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Validation(_)));
    }

    #[tokio::test]
    async fn submit_leaves_task_pending_when_publish_fails() {
        let (coordinator, store, broker) = coordinator();
        broker.set_healthy(false);

        let err = coordinator
            .submit("OPENQASM 3; qubit q;", Some(10), "corr-4")
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::BrokerUnavailable(_)));

        // Spec §4.4: task is not rolled back on publish failure.
        let ids = store.task_ids().await;
        assert_eq!(ids.len(), 1);
        let task = store.get_task(ids[0]).await.unwrap().unwrap();
        assert_eq!(task.current_status, qtask_core::TaskStatus::Pending);
    }
}
