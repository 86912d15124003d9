//! Query functions for the `works` and `work_beads` tables.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{Work, WorkBead, WorkStatus};

/// Insert a new work row in `pending` status.
#[allow(clippy::too_many_arguments)]
pub async fn insert_work(
    pool: &SqlitePool,
    id: &str,
    worker_name: &str,
    root_issue_id: &str,
    branch_name: &str,
    base_branch: &str,
    auto_workflow: bool,
) -> Result<Work> {
    let now = Utc::now();
    sqlx::query_as::<_, Work>(
        "INSERT INTO works \
            (id, worker_name, root_issue_id, branch_name, base_branch, status, auto_workflow, created_at) \
         VALUES (?, ?, ?, ?, ?, 'pending', ?, ?) \
         RETURNING *",
    )
    .bind(id)
    .bind(worker_name)
    .bind(root_issue_id)
    .bind(branch_name)
    .bind(base_branch)
    .bind(auto_workflow)
    .bind(now)
    .fetch_one(pool)
    .await
    .context("failed to insert work")
}

/// Fetch a single work by ID.
pub async fn get_work(pool: &SqlitePool, id: &str) -> Result<Option<Work>> {
    sqlx::query_as::<_, Work>("SELECT * FROM works WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch work")
}

/// Fetch a work by its branch name (branch names are unique).
pub async fn get_work_by_branch(pool: &SqlitePool, branch_name: &str) -> Result<Option<Work>> {
    sqlx::query_as::<_, Work>("SELECT * FROM works WHERE branch_name = ?")
        .bind(branch_name)
        .fetch_optional(pool)
        .await
        .context("failed to fetch work by branch")
}

/// List all works, most recently created first.
pub async fn list_works(pool: &SqlitePool) -> Result<Vec<Work>> {
    sqlx::query_as::<_, Work>("SELECT * FROM works ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
        .context("failed to list works")
}

/// List works currently in the given status.
pub async fn list_works_by_status(pool: &SqlitePool, status: WorkStatus) -> Result<Vec<Work>> {
    sqlx::query_as::<_, Work>("SELECT * FROM works WHERE status = ? ORDER BY created_at ASC")
        .bind(status)
        .fetch_all(pool)
        .await
        .context("failed to list works by status")
}

/// Attempt an optimistic-lock transition of a work's status.
///
/// Returns `true` if the row was updated (i.e. it was still in `from` at the
/// time of the write), `false` if a concurrent writer already moved it.
pub async fn transition_work_status(
    pool: &SqlitePool,
    id: &str,
    from: WorkStatus,
    to: WorkStatus,
) -> Result<bool> {
    let result = sqlx::query("UPDATE works SET status = ? WHERE id = ? AND status = ?")
        .bind(to)
        .bind(id)
        .bind(from)
        .execute(pool)
        .await
        .context("failed to transition work status")?;

    Ok(result.rows_affected() == 1)
}

/// Force a work's status without checking the prior state. Used for
/// terminal failure transitions that can happen from any in-flight state.
pub async fn set_work_status(pool: &SqlitePool, id: &str, status: WorkStatus) -> Result<()> {
    let result = sqlx::query("UPDATE works SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to set work status")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("work {id} not found");
    }
    Ok(())
}

/// Record the worktree path assigned to a work.
pub async fn set_worktree_path(pool: &SqlitePool, id: &str, worktree_path: &str) -> Result<()> {
    sqlx::query("UPDATE works SET worktree_path = ? WHERE id = ?")
        .bind(worktree_path)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to set worktree path")?;
    Ok(())
}

/// Record the PR URL once a `pr` task opens one.
pub async fn set_pr_url(pool: &SqlitePool, id: &str, pr_url: &str) -> Result<()> {
    sqlx::query("UPDATE works SET pr_url = ? WHERE id = ?")
        .bind(pr_url)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to set pr url")?;
    Ok(())
}

/// Update the PR/CI/approval status fields reported by the polling loop.
pub async fn update_pr_status(
    pool: &SqlitePool,
    id: &str,
    pr_state: Option<&str>,
    ci_status: Option<&str>,
    approval_status: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE works SET pr_state = ?, ci_status = ?, approval_status = ? WHERE id = ?",
    )
    .bind(pr_state)
    .bind(ci_status)
    .bind(approval_status)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to update pr status")?;
    Ok(())
}

/// Record a terminal failure with its error message.
pub async fn fail_work(pool: &SqlitePool, id: &str, error_message: &str) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "UPDATE works SET status = 'failed', error_message = ?, completed_at = ? WHERE id = ?",
    )
    .bind(error_message)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to mark work failed")?;
    Ok(())
}

/// Mark a work as started (first transition out of `pending`).
pub async fn mark_started(pool: &SqlitePool, id: &str) -> Result<()> {
    let now = Utc::now();
    sqlx::query("UPDATE works SET started_at = COALESCE(started_at, ?) WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to mark work started")?;
    Ok(())
}

/// Mark a work completed.
pub async fn mark_completed(pool: &SqlitePool, id: &str) -> Result<()> {
    let now = Utc::now();
    sqlx::query("UPDATE works SET status = 'completed', completed_at = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to mark work completed")?;
    Ok(())
}

/// Delete a work row (cascades to work_beads, tasks, task_beads, scheduled_tasks).
pub async fn delete_work(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM works WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete work")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("work {id} not found");
    }
    Ok(())
}

/// Associate a bead id with a work. Idempotent.
pub async fn add_work_bead(pool: &SqlitePool, work_id: &str, bead_id: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO work_beads (work_id, bead_id) VALUES (?, ?)")
        .bind(work_id)
        .bind(bead_id)
        .execute(pool)
        .await
        .context("failed to add work bead")?;
    Ok(())
}

/// Remove a bead association from a work.
pub async fn remove_work_bead(pool: &SqlitePool, work_id: &str, bead_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM work_beads WHERE work_id = ? AND bead_id = ?")
        .bind(work_id)
        .bind(bead_id)
        .execute(pool)
        .await
        .context("failed to remove work bead")?;
    Ok(())
}

/// List all bead ids assigned to a work.
pub async fn list_work_beads(pool: &SqlitePool, work_id: &str) -> Result<Vec<WorkBead>> {
    sqlx::query_as::<_, WorkBead>("SELECT * FROM work_beads WHERE work_id = ?")
        .bind(work_id)
        .fetch_all(pool)
        .await
        .context("failed to list work beads")
}
