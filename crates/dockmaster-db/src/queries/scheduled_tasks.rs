//! Query functions for the `scheduled_tasks` durable queue.
//!
//! These back the single-threaded dispatcher: `claim_due_scheduled_task`
//! picks work in strict `(scheduled_at, id)` order and flips it to
//! `executing` in the same statement so two dispatcher instances (or a
//! dispatcher racing its own lease sweep) never double-claim a row.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::models::{ScheduledTask, ScheduledTaskKind, ScheduledTaskStatus};

/// Enqueue a scheduled task. If `idempotency_key` collides with an existing
/// non-terminal row for the same work (enforced by the partial unique
/// index), returns that existing row instead of erroring -- callers that
/// want at-most-once scheduling get back the same id whether they were
/// first or not.
pub async fn enqueue(
    pool: &SqlitePool,
    work_id: &str,
    kind: ScheduledTaskKind,
    scheduled_at: DateTime<Utc>,
    metadata: serde_json::Value,
    idempotency_key: Option<&str>,
) -> Result<Option<ScheduledTask>> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();

    let result = sqlx::query_as::<_, ScheduledTask>(
        "INSERT INTO scheduled_tasks \
            (id, work_id, kind, scheduled_at, status, metadata, idempotency_key, created_at) \
         VALUES (?, ?, ?, ?, 'pending', ?, ?, ?) \
         RETURNING *",
    )
    .bind(&id)
    .bind(work_id)
    .bind(kind)
    .bind(scheduled_at)
    .bind(metadata)
    .bind(idempotency_key)
    .bind(now)
    .fetch_one(pool)
    .await;

    match result {
        Ok(task) => Ok(Some(task)),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            sqlx::query_as::<_, ScheduledTask>(
                "SELECT * FROM scheduled_tasks WHERE work_id = ? AND idempotency_key = ? \
                    AND status IN ('pending', 'executing')",
            )
            .bind(work_id)
            .bind(idempotency_key)
            .fetch_optional(pool)
            .await
            .context("failed to fetch existing scheduled task after idempotency collision")
        }
        Err(e) => Err(e).context("failed to enqueue scheduled task"),
    }
}

/// Claim the single next due scheduled task, if any, flipping it to
/// `executing` and stamping `executing_since`.
///
/// Due means `status = 'pending' AND scheduled_at <= now`. Ties are broken
/// by `id` to give the dispatcher a total, reproducible order.
pub async fn claim_due_scheduled_task(pool: &SqlitePool) -> Result<Option<ScheduledTask>> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let candidate: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM scheduled_tasks \
         WHERE status = 'pending' AND scheduled_at <= ? \
         ORDER BY scheduled_at ASC, id ASC LIMIT 1",
    )
    .bind(now)
    .fetch_optional(&mut *tx)
    .await
    .context("failed to find due scheduled task")?;

    let Some((id,)) = candidate else {
        tx.commit().await.ok();
        return Ok(None);
    };

    let task = sqlx::query_as::<_, ScheduledTask>(
        "UPDATE scheduled_tasks SET status = 'executing', executing_since = ?, \
            attempt_count = attempt_count + 1 \
         WHERE id = ? AND status = 'pending' \
         RETURNING *",
    )
    .bind(now)
    .bind(&id)
    .fetch_optional(&mut *tx)
    .await
    .context("failed to claim scheduled task")?;

    tx.commit().await.context("failed to commit scheduled task claim")?;
    Ok(task)
}

/// Mark a scheduled task completed.
pub async fn complete(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("UPDATE scheduled_tasks SET status = 'completed' WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to complete scheduled task")?;
    Ok(())
}

/// Record a failed attempt. If the task has attempts remaining, reschedule
/// it with exponential backoff (base 30s, doubling, capped at 1 hour);
/// otherwise mark it permanently failed.
pub async fn fail_attempt(pool: &SqlitePool, id: &str, error_message: &str) -> Result<()> {
    let task = sqlx::query_as::<_, ScheduledTask>("SELECT * FROM scheduled_tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch scheduled task")?
        .with_context(|| format!("scheduled task {id} not found"))?;

    if task.attempt_count >= task.max_attempts {
        sqlx::query(
            "UPDATE scheduled_tasks SET status = 'failed', error_message = ? WHERE id = ?",
        )
        .bind(error_message)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to mark scheduled task failed")?;
        return Ok(());
    }

    let backoff_secs = 30i64.saturating_mul(1i64 << (task.attempt_count.min(7) - 1));
    let backoff_secs = backoff_secs.min(3600);
    let next_attempt_at = Utc::now() + Duration::seconds(backoff_secs);

    sqlx::query(
        "UPDATE scheduled_tasks SET status = 'pending', scheduled_at = ?, \
            executing_since = NULL, error_message = ? WHERE id = ?",
    )
    .bind(next_attempt_at)
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to reschedule scheduled task")?;

    Ok(())
}

/// Mark a scheduled task permanently failed without going through the
/// backoff schedule -- used for errors the handler has classified as
/// non-retryable, where attempting again would waste the backoff window on
/// a failure that can't self-heal.
pub async fn fail_permanently(pool: &SqlitePool, id: &str, error_message: &str) -> Result<()> {
    sqlx::query("UPDATE scheduled_tasks SET status = 'failed', error_message = ? WHERE id = ?")
        .bind(error_message)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to mark scheduled task permanently failed")?;
    Ok(())
}

/// Sweep tasks whose lease has expired (`executing` for longer than
/// `lease_timeout`) back to `pending` so a crashed dispatcher doesn't strand
/// them forever.
pub async fn sweep_expired_leases(pool: &SqlitePool, lease_timeout: Duration) -> Result<u64> {
    let cutoff = Utc::now() - lease_timeout;
    let result = sqlx::query(
        "UPDATE scheduled_tasks SET status = 'pending', executing_since = NULL \
         WHERE status = 'executing' AND executing_since <= ?",
    )
    .bind(cutoff)
    .execute(pool)
    .await
    .context("failed to sweep expired scheduled-task leases")?;

    Ok(result.rows_affected())
}

/// Fetch a scheduled task by ID.
pub async fn get(pool: &SqlitePool, id: &str) -> Result<Option<ScheduledTask>> {
    sqlx::query_as::<_, ScheduledTask>("SELECT * FROM scheduled_tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch scheduled task")
}

/// List all scheduled tasks for a work, most recent first.
pub async fn list_for_work(pool: &SqlitePool, work_id: &str) -> Result<Vec<ScheduledTask>> {
    sqlx::query_as::<_, ScheduledTask>(
        "SELECT * FROM scheduled_tasks WHERE work_id = ? ORDER BY created_at DESC",
    )
    .bind(work_id)
    .fetch_all(pool)
    .await
    .context("failed to list scheduled tasks for work")
}

/// List scheduled tasks in a given status, oldest first.
pub async fn list_by_status(
    pool: &SqlitePool,
    status: ScheduledTaskStatus,
) -> Result<Vec<ScheduledTask>> {
    sqlx::query_as::<_, ScheduledTask>(
        "SELECT * FROM scheduled_tasks WHERE status = ? ORDER BY scheduled_at ASC, id ASC",
    )
    .bind(status)
    .fetch_all(pool)
    .await
    .context("failed to list scheduled tasks by status")
}

/// Cancel all non-terminal scheduled tasks for a work (used when a work is
/// destroyed or restarted).
pub async fn cancel_pending_for_work(pool: &SqlitePool, work_id: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE scheduled_tasks SET status = 'failed', error_message = 'cancelled' \
         WHERE work_id = ? AND status IN ('pending', 'executing')",
    )
    .bind(work_id)
    .execute(pool)
    .await
    .context("failed to cancel pending scheduled tasks")?;

    Ok(result.rows_affected())
}
