//! # qtask-worker
//!
//! The consume loop: claim, execute off the async runtime, commit, ack
//! (spec §4.5). [`Worker::run`] drives a single consumer; horizontal
//! scaling is just running more worker processes against the same
//! durable queue (spec §5).

pub mod error;

use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use qtask_broker::{Broker, RawDelivery};
use qtask_core::task::TaskStatus;
use qtask_core::validation::validate_counts;
use qtask_sim::{SimError, SimulatorBackend};
use qtask_store::{Store, TransitionOutcome};

pub use error::WorkerError;

/// Consumer tag the worker registers with the broker, mostly useful for
/// broker-side diagnostics (it has no bearing on prefetch or ordering).
pub const CONSUMER_TAG: &str = "qtask-worker";

pub struct Worker {
    store: Arc<dyn Store>,
    broker: Arc<dyn Broker>,
    simulator: Arc<dyn SimulatorBackend>,
    consumer_tag: String,
}

impl Worker {
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<dyn Broker>,
        simulator: Arc<dyn SimulatorBackend>,
    ) -> Self {
        Self { store, broker, simulator, consumer_tag: CONSUMER_TAG.to_string() }
    }

    /// Startup validation (spec §4.5 step 1): verify the simulator is
    /// usable before the loop consumes any messages.
    pub fn self_check(&self) -> Result<(), WorkerError> {
        self.simulator.self_check().map_err(WorkerError::from)
    }

    /// Drive the consume loop until `shutdown` resolves. A message
    /// already being handled when `shutdown` fires is allowed to run to
    /// completion and commit before the loop exits (spec §4.5 step 3):
    /// `shutdown` only ever races against the *wait* for the next
    /// delivery, never against an in-progress [`Worker::handle_delivery`].
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<(), WorkerError> {
        let mut stream = self.broker.consume(&self.consumer_tag).await?;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("shutdown_signal_received_stopping_consume_loop");
                    break;
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(delivery)) => self.handle_delivery(delivery).await,
                        Some(Err(err)) => {
                            tracing::error!(error = %err, "broker_consume_fatal_error");
                            return Err(WorkerError::Broker(err));
                        }
                        None => {
                            tracing::warn!("broker_consumer_stream_closed");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Spec §4.5 steps a-f for a single delivery.
    async fn handle_delivery(&self, raw: RawDelivery) {
        let correlation_id = raw.delivery.correlation_id.clone();

        // a. parse body, extract task_id. Malformed payload is a poison
        // message: log and ack without requeue (spec §7: MalformedMessage).
        let message = match raw.delivery.parse() {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(%correlation_id, error = %err, "malformed_message_dropping_without_requeue");
                let _ = raw.nack(false).await;
                return;
            }
        };
        let task_id = message.task_id;

        // b. idempotency guard.
        let existing = match self.store.get_task(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                tracing::warn!(%task_id, %correlation_id, "orphan_message_task_not_found");
                let _ = raw.ack().await;
                return;
            }
            Err(err) => {
                tracing::error!(%task_id, %correlation_id, error = %err, "store_unavailable_during_idempotency_check");
                let _ = raw.nack(true).await;
                return;
            }
        };

        if existing.current_status != TaskStatus::Pending {
            tracing::info!(
                %task_id, %correlation_id, status = %existing.current_status,
                "skipping_already_progressed_task"
            );
            let _ = raw.ack().await;
            return;
        }

        // c. claim.
        let claimed = match self
            .store
            .transition(
                task_id,
                TaskStatus::Pending,
                TaskStatus::Processing,
                TransitionOutcome::notes("Worker started processing"),
            )
            .await
        {
            Ok(claimed) => claimed,
            Err(err) => {
                tracing::error!(%task_id, %correlation_id, error = %err, "store_unavailable_during_claim");
                let _ = raw.nack(true).await;
                return;
            }
        };

        if !claimed {
            tracing::info!(%task_id, %correlation_id, "claim_lost_to_another_worker");
            let _ = raw.ack().await;
            return;
        }

        tracing::info!(%task_id, %correlation_id, "task_claimed");

        // d. execute off the async runtime: CPU-bound and synchronous.
        let simulator = self.simulator.clone();
        let circuit = message.circuit.clone();
        let shots = existing.shots;
        let outcome = tokio::task::spawn_blocking(move || simulator.execute(&circuit, shots))
            .await
            .unwrap_or_else(|join_err| {
                Err(SimError::Unexpected(format!("executor task panicked: {join_err}")))
            })
            .and_then(|counts| {
                validate_counts(&counts)
                    .map(|()| counts)
                    .map_err(SimError::Unexpected)
            });

        // e. commit.
        let committed = match outcome {
            Ok(counts) => {
                tracing::info!(%task_id, %correlation_id, "execution_succeeded");
                self.store
                    .transition(
                        task_id,
                        TaskStatus::Processing,
                        TaskStatus::Completed,
                        TransitionOutcome::completed(&counts, "Task completed successfully"),
                    )
                    .await
            }
            Err(err) => {
                let classified = err.classified_message();
                tracing::error!(%task_id, %correlation_id, error = %classified, "execution_failed");
                self.store
                    .transition(
                        task_id,
                        TaskStatus::Processing,
                        TaskStatus::Failed,
                        TransitionOutcome::failed(&classified, &classified),
                    )
                    .await
            }
        };

        // f. acknowledge. A commit that lost the race (`Ok(false)`) still
        // acks — the winning transition already wrote its own history
        // entry, so the record stays correct (spec §4.5 step e). A store
        // fault while committing negatively acknowledges so the broker
        // redelivers; the task is left in `PROCESSING` until a retry
        // lands or an operator intervenes (spec §9's accepted trade-off).
        match committed {
            Ok(true) => {
                tracing::info!(%task_id, %correlation_id, "task_commit_succeeded");
                let _ = raw.ack().await;
            }
            Ok(false) => {
                tracing::warn!(%task_id, %correlation_id, "task_commit_lost_race_acking_anyway");
                let _ = raw.ack().await;
            }
            Err(err) => {
                tracing::error!(%task_id, %correlation_id, error = %err, "store_unavailable_during_commit");
                let _ = raw.nack(true).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use qtask_broker::fake::{AckEvent, FakeBroker};
    use qtask_broker::message::Delivery;
    use qtask_broker::Broker;
    use qtask_core::task::TaskStatus;
    use qtask_sim::SimulatorBackend;
    use qtask_store::fake::FakeStore;
    use qtask_store::Store;
    use uuid::Uuid;

    use super::*;

    struct AlwaysFailsSimulator;

    impl SimulatorBackend for AlwaysFailsSimulator {
        fn self_check(&self) -> Result<(), SimError> {
            Err(SimError::Unexpected("backend not importable".into()))
        }

        fn execute(&self, _circuit: &str, _shots: i32) -> Result<qtask_core::task::Counts, SimError> {
            unreachable!("self_check fails first")
        }
    }

    fn worker(store: Arc<FakeStore>, broker: Arc<FakeBroker>) -> Worker {
        Worker::new(store, broker, Arc::new(qtask_sim::MockSimulator))
    }

    // Drives `run()` long enough to pick up whatever was already published,
    // then lets the shutdown signal win the next `select!` iteration.
    async fn run_one(w: &Worker) {
        let shutdown = tokio::time::sleep(Duration::from_millis(50));
        let _ = w.run(shutdown).await;
    }

    #[test]
    fn self_check_surfaces_simulator_failure() {
        let store = Arc::new(FakeStore::new());
        let broker = Arc::new(FakeBroker::new());
        let w = Worker::new(store, broker, Arc::new(AlwaysFailsSimulator));
        assert!(w.self_check().is_err());
    }

    #[tokio::test]
    async fn happy_path_completes_and_acks() {
        let store = Arc::new(FakeStore::new());
        let broker = Arc::new(FakeBroker::new());
        let task = store.create_task("OPENQASM 3; qubit q;", 10).await.unwrap();
        broker.publish(task.task_id, &task.circuit, "corr-1").await.unwrap();

        run_one(&worker(store.clone(), broker.clone())).await;

        let stored = store.get_task(task.task_id).await.unwrap().unwrap();
        assert_eq!(stored.current_status, TaskStatus::Completed);
        assert!(stored.result.is_some());

        let events = broker.ack_events().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AckEvent::Ack { .. }));
    }

    #[tokio::test]
    async fn execution_failure_transitions_to_failed_and_still_acks() {
        let store = Arc::new(FakeStore::new());
        let broker = Arc::new(FakeBroker::new());
        let task = store
            .create_task("OPENQASM 3; qubit q; FORCE_EXECUTION_ERROR", 10)
            .await
            .unwrap();
        broker.publish(task.task_id, &task.circuit, "corr-2").await.unwrap();

        run_one(&worker(store.clone(), broker.clone())).await;

        let stored = store.get_task(task.task_id).await.unwrap().unwrap();
        assert_eq!(stored.current_status, TaskStatus::Failed);
        assert!(stored.error_message.is_some());
        assert!(matches!(broker.ack_events().await[0], AckEvent::Ack { .. }));
    }

    #[tokio::test]
    async fn malformed_message_is_acked_without_requeue() {
        let store = Arc::new(FakeStore::new());
        let broker = Arc::new(FakeBroker::new());
        broker.push(Delivery {
            body: b"not json".to_vec(),
            correlation_id: "corr-3".to_string(),
            message_id: Some("m-1".to_string()),
        });

        run_one(&worker(store.clone(), broker.clone())).await;

        let events = broker.ack_events().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AckEvent::Ack { .. }));
    }

    #[tokio::test]
    async fn orphan_message_for_unknown_task_is_acked() {
        let store = Arc::new(FakeStore::new());
        let broker = Arc::new(FakeBroker::new());
        broker.publish(Uuid::new_v4(), "OPENQASM 3; qubit q;", "corr-4").await.unwrap();

        run_one(&worker(store.clone(), broker.clone())).await;

        assert!(matches!(broker.ack_events().await[0], AckEvent::Ack { .. }));
    }

    #[tokio::test]
    async fn redelivery_of_already_completed_task_is_acked_without_reexecuting() {
        let store = Arc::new(FakeStore::new());
        let broker = Arc::new(FakeBroker::new());
        let task = store.create_task("OPENQASM 3; qubit q;", 10).await.unwrap();
        store
            .transition(
                task.task_id,
                TaskStatus::Pending,
                TaskStatus::Processing,
                qtask_store::TransitionOutcome::notes("claimed"),
            )
            .await
            .unwrap();
        store
            .transition(
                task.task_id,
                TaskStatus::Processing,
                TaskStatus::Completed,
                qtask_store::TransitionOutcome::notes("already done"),
            )
            .await
            .unwrap();

        broker.publish(task.task_id, &task.circuit, "corr-5").await.unwrap();
        run_one(&worker(store.clone(), broker.clone())).await;

        let stored = store.get_task(task.task_id).await.unwrap().unwrap();
        assert_eq!(stored.current_status, TaskStatus::Completed);
        assert!(matches!(broker.ack_events().await[0], AckEvent::Ack { .. }));
    }

    #[tokio::test]
    async fn lost_claim_race_is_acked_without_reexecuting() {
        let store = Arc::new(FakeStore::new());
        let broker = Arc::new(FakeBroker::new());
        let task = store.create_task("OPENQASM 3; qubit q;", 10).await.unwrap();
        // Another worker already claimed it between the idempotency read
        // and this worker's own CAS attempt.
        store
            .transition(
                task.task_id,
                TaskStatus::Pending,
                TaskStatus::Processing,
                qtask_store::TransitionOutcome::notes("claimed by another worker"),
            )
            .await
            .unwrap();

        broker.publish(task.task_id, &task.circuit, "corr-6").await.unwrap();
        run_one(&worker(store.clone(), broker.clone())).await;

        let stored = store.get_task(task.task_id).await.unwrap().unwrap();
        assert_eq!(stored.current_status, TaskStatus::Processing);
        assert!(matches!(broker.ack_events().await[0], AckEvent::Ack { .. }));
    }
}
