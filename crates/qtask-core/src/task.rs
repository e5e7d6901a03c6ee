//! Task — the stateful unit of work submitted to the quantum task queue.
//!
//! A task moves through a small lifecycle with well-defined transitions:
//!
//! ```text
//! PENDING → PROCESSING → COMPLETED (terminal)
//!                      → FAILED (terminal)
//! PENDING → FAILED (terminal, pre-execution rejection)
//! ```
//!
//! No transition leaves a terminal state. The state machine here only
//! decides which edges are *legal*; enforcing that a transition actually
//! happens exactly once is the store's job (see `qtask-store`'s guarded
//! `transition`).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Measurement counts: bitstring (over `{'0','1'}`) → occurrence count.
///
/// A `BTreeMap` keeps serialized output in a stable key order, which makes
/// fixture-based tests deterministic without needing to sort on read.
pub type Counts = BTreeMap<String, u64>;

/// The lifecycle state of a [`Task`].
///
/// The `sqlx` feature derives `sqlx::Type` so `qtask-store` can bind/read
/// this enum directly against the Postgres `task_status` enum type without
/// qtask-core depending on sqlx for anything else.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "task_status", rename_all = "lowercase")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// All four wire values, lowercase, in the order they appear in spec §6.
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    /// Whether this status is terminal (no further transitions are legal).
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether `to` is a legal transition target from `self`.
    ///
    /// Encodes exactly the four edges in the design's transition table:
    /// PENDING→PROCESSING, PROCESSING→COMPLETED, PROCESSING→FAILED,
    /// PENDING→FAILED. Every other pair, including any edge out of a
    /// terminal state, is illegal.
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed) | (Pending, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A submitted unit of work: a circuit and shot count, tracked through
/// [`TaskStatus`] to a terminal result or classified failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub circuit: String,
    pub shots: i32,
    pub submitted_at: DateTime<Utc>,
    pub current_status: TaskStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Counts>,
    pub error_message: Option<String>,
}

impl Task {
    /// Invariant 4 (data model §3): result/error_message/completed_at are
    /// present exactly when `current_status` says they should be.
    pub fn satisfies_terminal_invariants(&self) -> bool {
        let result_ok = self.result.is_some() == (self.current_status == TaskStatus::Completed);
        let error_ok = self.error_message.is_some() == (self.current_status == TaskStatus::Failed);
        let completed_at_ok = self.completed_at.is_some() == self.current_status.is_terminal();
        result_ok && error_ok && completed_at_ok
    }
}

/// One append-only entry in a task's status history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: i64,
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub transitioned_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Default shot count when a submission omits `shots` (spec §3, §9).
pub const DEFAULT_SHOTS: i32 = 1024;

/// Inclusive bounds on `shots` (spec §3, frozen per the Open Question in §9).
pub const MIN_SHOTS: i32 = 1;
pub const MAX_SHOTS: i32 = 100_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_edges_match_the_design_table() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Processing));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for from in [TaskStatus::Completed, TaskStatus::Failed] {
            for to in TaskStatus::ALL {
                assert!(!from.can_transition_to(to), "{from:?} -> {to:?} must be illegal");
            }
        }
    }

    #[test]
    fn no_direct_pending_to_completed() {
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn no_self_transitions() {
        for s in TaskStatus::ALL {
            assert!(!s.can_transition_to(s));
        }
    }

    #[test]
    fn wire_values_are_lowercase() {
        for s in TaskStatus::ALL {
            let v = serde_json::to_value(s).unwrap();
            assert_eq!(v.as_str().unwrap(), s.as_str());
        }
    }

    #[test]
    fn terminal_invariants_catch_mismatches() {
        let mut t = Task {
            task_id: Uuid::nil(),
            circuit: "x".into(),
            shots: 1024,
            submitted_at: Utc::now(),
            current_status: TaskStatus::Completed,
            completed_at: Some(Utc::now()),
            result: Some(Counts::new()),
            error_message: None,
        };
        assert!(t.satisfies_terminal_invariants());
        t.result = None;
        assert!(!t.satisfies_terminal_invariants());
    }
}
