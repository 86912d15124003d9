//! Query functions for the `tasks` and `task_beads` tables.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{Task, TaskBead, TaskKind, TaskStatus};

/// Insert the next task for a work, assigning it `seq = max(seq)+1`.
///
/// `auto_workflow` mirrors the marker stored on the task: `None` (absent)
/// means orchestrator-chained, `Some(false)` means a human requested it
/// explicitly and follow-on auto-chaining should stop after it completes.
pub async fn insert_next_task(
    pool: &SqlitePool,
    work_id: &str,
    kind: TaskKind,
    complexity_budget: Option<i64>,
    auto_workflow: Option<bool>,
) -> Result<Task> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let next_seq: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) + 1 FROM tasks WHERE work_id = ?")
        .bind(work_id)
        .fetch_one(&mut *tx)
        .await
        .context("failed to compute next task seq")?;

    let id = format!("{work_id}.{next_seq}");
    let auto_workflow_marker = auto_workflow.map(|b| if b { "true" } else { "false" }.to_string());

    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO tasks \
            (id, work_id, seq, kind, status, complexity_budget, metadata, auto_workflow, created_at) \
         VALUES (?, ?, ?, ?, 'pending', ?, '{}', ?, ?) \
         RETURNING *",
    )
    .bind(&id)
    .bind(work_id)
    .bind(next_seq)
    .bind(kind)
    .bind(complexity_budget)
    .bind(auto_workflow_marker)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert task")?;

    tx.commit().await.context("failed to commit task insert")?;
    Ok(task)
}

/// Fetch a single task by ID.
pub async fn get_task(pool: &SqlitePool, id: &str) -> Result<Option<Task>> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch task")
}

/// List all tasks for a work, in sequence order.
pub async fn list_tasks_for_work(pool: &SqlitePool, work_id: &str) -> Result<Vec<Task>> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE work_id = ? ORDER BY seq ASC")
        .bind(work_id)
        .fetch_all(pool)
        .await
        .context("failed to list tasks for work")
}

/// Fetch the most recently created task for a work, if any.
pub async fn latest_task_for_work(pool: &SqlitePool, work_id: &str) -> Result<Option<Task>> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE work_id = ? ORDER BY seq DESC LIMIT 1")
        .bind(work_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch latest task for work")
}

/// Attempt an optimistic-lock transition of a task's status.
pub async fn transition_task_status(
    pool: &SqlitePool,
    id: &str,
    from: TaskStatus,
    to: TaskStatus,
) -> Result<bool> {
    let result = sqlx::query("UPDATE tasks SET status = ? WHERE id = ? AND status = ?")
        .bind(to)
        .bind(id)
        .bind(from)
        .execute(pool)
        .await
        .context("failed to transition task status")?;

    Ok(result.rows_affected() == 1)
}

/// Mark a task as started.
pub async fn mark_task_started(pool: &SqlitePool, id: &str) -> Result<()> {
    let now = Utc::now();
    sqlx::query("UPDATE tasks SET started_at = COALESCE(started_at, ?) WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to mark task started")?;
    Ok(())
}

/// Mark a task completed.
pub async fn mark_task_completed(pool: &SqlitePool, id: &str) -> Result<()> {
    let now = Utc::now();
    sqlx::query("UPDATE tasks SET status = 'completed', completed_at = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to mark task completed")?;
    Ok(())
}

/// Record a task failure.
pub async fn fail_task(pool: &SqlitePool, id: &str, error_message: &str) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "UPDATE tasks SET status = 'failed', error_message = ?, completed_at = ? WHERE id = ?",
    )
    .bind(error_message)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to mark task failed")?;
    Ok(())
}

/// Merge additional keys into a task's metadata JSON object.
pub async fn merge_task_metadata(
    pool: &SqlitePool,
    id: &str,
    patch: serde_json::Value,
) -> Result<()> {
    let task = get_task(pool, id)
        .await?
        .with_context(|| format!("task {id} not found"))?;

    let mut metadata = task.metadata;
    if let (Some(existing), Some(incoming)) = (metadata.as_object_mut(), patch.as_object()) {
        for (k, v) in incoming {
            existing.insert(k.clone(), v.clone());
        }
    }

    sqlx::query("UPDATE tasks SET metadata = ? WHERE id = ?")
        .bind(metadata)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update task metadata")?;
    Ok(())
}

/// Assign a bead to a task at a given position in the task's ordered bead list.
pub async fn add_task_bead(pool: &SqlitePool, task_id: &str, bead_id: &str, position: i64) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO task_beads (task_id, bead_id, position) VALUES (?, ?, ?)",
    )
    .bind(task_id)
    .bind(bead_id)
    .bind(position)
    .execute(pool)
    .await
    .context("failed to add task bead")?;
    Ok(())
}

/// List a task's beads, in assigned order.
pub async fn list_task_beads(pool: &SqlitePool, task_id: &str) -> Result<Vec<TaskBead>> {
    sqlx::query_as::<_, TaskBead>(
        "SELECT * FROM task_beads WHERE task_id = ? ORDER BY position ASC",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .context("failed to list task beads")
}

/// Reset tasks stuck in `processing` back to `pending`.
///
/// Called at control-plane startup to recover from a crash that left tasks
/// mid-flight with no process actually driving them.
pub async fn reset_orphaned_tasks(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("UPDATE tasks SET status = 'pending' WHERE status = 'processing'")
        .execute(pool)
        .await
        .context("failed to reset orphaned tasks")?;
    Ok(result.rows_affected())
}
