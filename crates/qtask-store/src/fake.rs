//! An in-memory [`Store`] for tests that don't want a live Postgres
//! instance. Mirrors [`PgStore`](crate::PgStore)'s transaction semantics
//! (guarded CAS + paired history append) without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use qtask_core::task::{StatusHistoryEntry, Task, TaskStatus};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{StoreError, TransitionOutcome};

#[derive(Default)]
struct Inner {
    tasks: HashMap<Uuid, Task>,
    history: HashMap<Uuid, Vec<StatusHistoryEntry>>,
    next_history_id: i64,
}

/// An in-memory stand-in for [`crate::PgStore`].
#[derive(Default)]
pub struct FakeStore {
    inner: Mutex<Inner>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All task ids currently held, for tests that need to assert on the
    /// store's contents without a SQL `SELECT`.
    pub async fn task_ids(&self) -> Vec<Uuid> {
        self.inner.lock().await.tasks.keys().copied().collect()
    }
}

#[async_trait]
impl crate::Store for FakeStore {
    async fn create_task(&self, circuit: &str, shots: i32) -> Result<Task, StoreError> {
        let mut inner = self.inner.lock().await;
        let task = Task {
            task_id: Uuid::new_v4(),
            circuit: circuit.to_string(),
            shots,
            submitted_at: chrono::Utc::now(),
            current_status: TaskStatus::Pending,
            completed_at: None,
            result: None,
            error_message: None,
        };
        let history_id = inner.next_history_id;
        inner.next_history_id += 1;
        inner.history.insert(
            task.task_id,
            vec![StatusHistoryEntry {
                id: history_id,
                task_id: task.task_id,
                status: TaskStatus::Pending,
                transitioned_at: task.submitted_at,
                notes: Some("Task created".to_string()),
            }],
        );
        inner.tasks.insert(task.task_id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.inner.lock().await.tasks.get(&task_id).cloned())
    }

    async fn get_task_with_history(
        &self,
        task_id: Uuid,
    ) -> Result<Option<(Task, Vec<StatusHistoryEntry>)>, StoreError> {
        let inner = self.inner.lock().await;
        let Some(task) = inner.tasks.get(&task_id).cloned() else {
            return Ok(None);
        };
        let history = inner.history.get(&task_id).cloned().unwrap_or_default();
        Ok(Some((task, history)))
    }

    async fn transition(
        &self,
        task_id: Uuid,
        expected_from: TaskStatus,
        to: TaskStatus,
        outcome: TransitionOutcome<'_>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(task) = inner.tasks.get_mut(&task_id) else {
            return Ok(false);
        };
        if task.current_status != expected_from {
            return Ok(false);
        }

        let now = chrono::Utc::now();
        task.current_status = to;
        if to.is_terminal() {
            task.completed_at = Some(now);
        }
        if let Some(result) = outcome.result {
            task.result = Some(result.clone());
        }
        if let Some(msg) = outcome.error_message {
            task.error_message = Some(msg.to_string());
        }

        let history_id = inner.next_history_id;
        inner.next_history_id += 1;
        inner.history.entry(task_id).or_default().push(StatusHistoryEntry {
            id: history_id,
            task_id,
            status: to,
            transitioned_at: now,
            notes: Some(outcome.notes.to_string()),
        });

        Ok(true)
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[tokio::test]
    async fn create_then_transition_round_trips() {
        let store = FakeStore::new();
        let task = store.create_task("OPENQASM 3; qubit q;", 10).await.unwrap();
        assert_eq!(task.current_status, TaskStatus::Pending);

        let ok = store
            .transition(
                task.task_id,
                TaskStatus::Pending,
                TaskStatus::Processing,
                TransitionOutcome::notes("worker picked up task"),
            )
            .await
            .unwrap();
        assert!(ok);

        let (task, history) = store.get_task_with_history(task.task_id).await.unwrap().unwrap();
        assert_eq!(task.current_status, TaskStatus::Processing);
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn guarded_transition_rejects_stale_expectation() {
        let store = FakeStore::new();
        let task = store.create_task("OPENQASM 3; qubit q;", 10).await.unwrap();
        store
            .transition(
                task.task_id,
                TaskStatus::Pending,
                TaskStatus::Processing,
                TransitionOutcome::notes("claimed"),
            )
            .await
            .unwrap();

        // Simulate a redelivered message retrying the same PENDING->PROCESSING claim.
        let ok = store
            .transition(
                task.task_id,
                TaskStatus::Pending,
                TaskStatus::Processing,
                TransitionOutcome::notes("claimed again"),
            )
            .await
            .unwrap();
        assert!(!ok, "second claim attempt must be rejected by the CAS guard");
    }

    #[tokio::test]
    async fn missing_task_transition_returns_false() {
        let store = FakeStore::new();
        let ok = store
            .transition(
                Uuid::new_v4(),
                TaskStatus::Pending,
                TaskStatus::Processing,
                TransitionOutcome::notes("n/a"),
            )
            .await
            .unwrap();
        assert!(!ok);
    }
}
