//! # qtask-store
//!
//! Postgres persistence for tasks and their status history (spec §4.1).
//! The guarded [`Store::transition`] compare-and-set is the system's sole
//! concurrency primitive for task ownership: it updates `current_status`
//! only when it still matches the caller's expectation, and atomically
//! appends the corresponding history entry in the same transaction. That
//! is what lets redelivered messages be handled safely — see
//! `qtask-worker`'s idempotency guard.

pub mod error;
#[cfg(feature = "fake")]
pub mod fake;

use async_trait::async_trait;
use qtask_core::task::{Counts, StatusHistoryEntry, Task, TaskStatus};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

pub use error::StoreError;

/// Fields attached to a guarded transition; only the ones relevant to the
/// target state need be set (spec §4.1).
#[derive(Debug, Default, Clone)]
pub struct TransitionOutcome<'a> {
    pub result: Option<&'a Counts>,
    pub error_message: Option<&'a str>,
    pub notes: &'a str,
}

impl<'a> TransitionOutcome<'a> {
    pub fn notes(notes: &'a str) -> Self {
        Self { notes, ..Default::default() }
    }

    pub fn completed(result: &'a Counts, notes: &'a str) -> Self {
        Self { result: Some(result), notes, ..Default::default() }
    }

    pub fn failed(error_message: &'a str, notes: &'a str) -> Self {
        Self { error_message: Some(error_message), notes, ..Default::default() }
    }
}

/// The persistence contract every task-owning component depends on.
///
/// Defined as a trait (rather than a concrete `PgStore` everywhere) so
/// `qtask-coordinator` and `qtask-http` can be tested against
/// [`fake::FakeStore`] without a live Postgres instance.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new task as `PENDING` plus its initial history entry, in
    /// one transaction (invariant 1, spec §3).
    async fn create_task(&self, circuit: &str, shots: i32) -> Result<Task, StoreError>;

    /// Point read.
    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>, StoreError>;

    /// Task plus its history, ascending by `transitioned_at`.
    async fn get_task_with_history(
        &self,
        task_id: Uuid,
    ) -> Result<Option<(Task, Vec<StatusHistoryEntry>)>, StoreError>;

    /// Guarded compare-and-set: update `current_status` from
    /// `expected_from` to `to` and append a history entry, iff the row's
    /// `current_status` still equals `expected_from`. Returns whether the
    /// update took effect.
    async fn transition(
        &self,
        task_id: Uuid,
        expected_from: TaskStatus,
        to: TaskStatus,
        outcome: TransitionOutcome<'_>,
    ) -> Result<bool, StoreError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> bool;
}

/// The Postgres-backed [`Store`] implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect with a bounded pool (spec §5: "default 10 + 20 overflow").
    /// sqlx's pool doesn't distinguish a base size from overflow the way
    /// SQLAlchemy's `QueuePool` does, so the combined ceiling is used as
    /// `max_connections` — see DESIGN.md.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(30)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Apply the embedded migrations (spec §6's schema).
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wrap an already-connected, already-migrated pool (used by
    /// `#[sqlx::test]` fixtures).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Raw row shape, mapped 1:1 onto the `tasks` table.
#[derive(sqlx::FromRow)]
struct TaskRow {
    task_id: Uuid,
    circuit: String,
    shots: i32,
    submitted_at: chrono::DateTime<chrono::Utc>,
    current_status: TaskStatus,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    result: Option<serde_json::Value>,
    error_message: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let result = match row.result {
            Some(v) => Some(serde_json::from_value(v).map_err(|e| {
                StoreError::StorageUnavailable(sqlx::Error::Decode(Box::new(e)))
            })?),
            None => None,
        };
        Ok(Task {
            task_id: row.task_id,
            circuit: row.circuit,
            shots: row.shots,
            submitted_at: row.submitted_at,
            current_status: row.current_status,
            completed_at: row.completed_at,
            result,
            error_message: row.error_message,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    task_id: Uuid,
    status: TaskStatus,
    transitioned_at: chrono::DateTime<chrono::Utc>,
    notes: Option<String>,
}

impl From<HistoryRow> for StatusHistoryEntry {
    fn from(row: HistoryRow) -> Self {
        StatusHistoryEntry {
            id: row.id,
            task_id: row.task_id,
            status: row.status,
            transitioned_at: row.transitioned_at,
            notes: row.notes,
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_task(&self, circuit: &str, shots: i32) -> Result<Task, StoreError> {
        let task_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        let row: TaskRow = sqlx::query_as(
            "INSERT INTO tasks (task_id, circuit, shots) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(task_id)
        .bind(circuit)
        .bind(shots)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO status_history (task_id, status, transitioned_at, notes) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(row.task_id)
        .bind(row.current_status)
        .bind(row.submitted_at)
        .bind("Task created")
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE task_id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn get_task_with_history(
        &self,
        task_id: Uuid,
    ) -> Result<Option<(Task, Vec<StatusHistoryEntry>)>, StoreError> {
        let Some(task) = self.get_task(task_id).await? else {
            return Ok(None);
        };

        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT * FROM status_history WHERE task_id = $1 ORDER BY transitioned_at ASC, id ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some((task, rows.into_iter().map(Into::into).collect())))
    }

    async fn transition(
        &self,
        task_id: Uuid,
        expected_from: TaskStatus,
        to: TaskStatus,
        outcome: TransitionOutcome<'_>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let is_terminal = to.is_terminal();
        let result_json = outcome.result.map(|c| serde_json::to_value(c).expect("counts always serialize"));

        let row: Option<TaskRow> = sqlx::query_as(
            "UPDATE tasks \
             SET current_status = $3, \
                 completed_at = CASE WHEN $4 THEN now() ELSE completed_at END, \
                 result = COALESCE($5, result), \
                 error_message = COALESCE($6, error_message) \
             WHERE task_id = $1 AND current_status = $2 \
             RETURNING *",
        )
        .bind(task_id)
        .bind(expected_from)
        .bind(to)
        .bind(is_terminal)
        .bind(result_json)
        .bind(outcome.error_message)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            // Another caller already won the race, or the task doesn't
            // exist / isn't in `expected_from`. No-op by design.
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query(
            "INSERT INTO status_history (task_id, status, transitioned_at, notes) \
             VALUES ($1, $2, now(), $3)",
        )
        .bind(task_id)
        .bind(to)
        .bind(outcome.notes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        let _ = row; // row is consumed only to confirm the CAS matched
        Ok(true)
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
