//! Integration tests against a real Postgres instance, migrated fresh per
//! test by `sqlx::test`'s pool fixture.

use qtask_core::task::TaskStatus;
use qtask_store::{PgStore, Store, TransitionOutcome};

fn store_from(pool: sqlx::PgPool) -> PgStore {
    PgStore::from_pool(pool)
}

#[sqlx::test(migrations = "./migrations")]
async fn create_task_persists_pending_with_history(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let store = store_from(pool);
    let task = store.create_task("OPENQASM 3; qubit q;", 256).await.unwrap();

    assert_eq!(task.current_status, TaskStatus::Pending);
    assert_eq!(task.shots, 256);
    assert!(task.completed_at.is_none());

    let (fetched, history) = store.get_task_with_history(task.task_id).await.unwrap().unwrap();
    assert_eq!(fetched.task_id, task.task_id);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TaskStatus::Pending);
    assert_eq!(history[0].transitioned_at, fetched.submitted_at);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn get_task_returns_none_for_unknown_id(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let store = store_from(pool);
    let found = store.get_task(uuid::Uuid::new_v4()).await.unwrap();
    assert!(found.is_none());
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn transition_moves_task_and_appends_history(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let store = store_from(pool);
    let task = store.create_task("OPENQASM 3; qubit q;", 10).await.unwrap();

    let moved = store
        .transition(
            task.task_id,
            TaskStatus::Pending,
            TaskStatus::Processing,
            TransitionOutcome::notes("worker claimed task"),
        )
        .await
        .unwrap();
    assert!(moved);

    let mut counts = qtask_core::task::Counts::new();
    counts.insert("00".into(), 10);
    let completed = store
        .transition(
            task.task_id,
            TaskStatus::Processing,
            TaskStatus::Completed,
            TransitionOutcome::completed(&counts, "execution finished"),
        )
        .await
        .unwrap();
    assert!(completed);

    let (task, history) = store.get_task_with_history(task.task_id).await.unwrap().unwrap();
    assert_eq!(task.current_status, TaskStatus::Completed);
    assert_eq!(task.result, Some(counts));
    assert!(task.completed_at.is_some());
    assert_eq!(task.completed_at.unwrap(), history.last().unwrap().transitioned_at);
    assert_eq!(history.len(), 3);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn guarded_transition_is_idempotent_under_redelivery(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let store = store_from(pool);
    let task = store.create_task("OPENQASM 3; qubit q;", 10).await.unwrap();

    let first = store
        .transition(
            task.task_id,
            TaskStatus::Pending,
            TaskStatus::Processing,
            TransitionOutcome::notes("first delivery"),
        )
        .await
        .unwrap();
    assert!(first);

    // A redelivered copy of the same message retries the identical claim.
    let second = store
        .transition(
            task.task_id,
            TaskStatus::Pending,
            TaskStatus::Processing,
            TransitionOutcome::notes("redelivered"),
        )
        .await
        .unwrap();
    assert!(!second, "redelivered claim must not win the guarded transition twice");

    let (_, history) = store.get_task_with_history(task.task_id).await.unwrap().unwrap();
    assert_eq!(history.len(), 2, "no extra history row for the rejected transition");
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn ping_reports_true_for_a_live_pool(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let store = store_from(pool);
    assert!(store.ping().await);
    Ok(())
}
