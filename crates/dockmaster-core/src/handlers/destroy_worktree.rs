//! `destroy-worktree` handler.
//!
//! Tears a Work down completely: kills its multiplexer tab, closes the
//! root issue (non-fatal), removes the git worktree (tolerating one that
//! was never registered), removes the work directory on disk, then
//! deletes the Work row, cascading to its tasks and bead relationships.
//! Callers always schedule this with idempotency-key
//! `destroy-worktree-<work-id>` so a spammed `work destroy` can't run it
//! twice.

use crate::error::HandlerError;

use super::{load_work, session_name, work_tab_name, HandlerContext};

pub(super) async fn handle(
    ctx: &HandlerContext,
    task: &dockmaster_db::models::ScheduledTask,
) -> Result<(), HandlerError> {
    let work = match load_work(ctx, task).await {
        Ok(w) => w,
        Err(HandlerError::WorkNotFound) => return Ok(()),
        Err(e) => return Err(e),
    };

    let session = session_name(&ctx.project_root);
    let tab = work_tab_name(&work.id);
    let _ = ctx.multiplexer.terminate_and_close_tab(&session, &tab).await;

    let _ = ctx.issue_tracker.close(&work.root_issue_id).await;

    if let Some(worktree_path) = &work.worktree_path {
        ctx.vcs.remove_worktree(std::path::Path::new(worktree_path)).await?;
    }

    let work_dir = ctx.project_root.join(&work.id);
    if work_dir.exists() {
        let _ = std::fs::remove_dir_all(&work_dir);
    }

    dockmaster_db::queries::works::delete_work(&ctx.pool, &work.id)
        .await
        .map_err(HandlerError::Transient)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_context;
    use dockmaster_db::models::ScheduledTaskKind;
    use dockmaster_test_utils::create_in_memory_db;

    #[tokio::test]
    async fn deletes_the_work_row_and_everything_under_it() {
        let pool = create_in_memory_db().await;
        dockmaster_db::queries::works::insert_work(&pool, "w-1", "worker", "bead-1", "feat/x", "main", true)
            .await
            .unwrap();
        dockmaster_db::queries::works::set_worktree_path(&pool, "w-1", "/tmp/w-1/tree")
            .await
            .unwrap();
        dockmaster_db::queries::tasks::insert_next_task(&pool, "w-1", dockmaster_db::models::TaskKind::Implement, None, None)
            .await
            .unwrap();

        let ctx = test_context(pool.clone());
        let scheduled = ctx
            .scheduler
            .schedule_now(
                &pool,
                "w-1",
                ScheduledTaskKind::DestroyWorktree,
                serde_json::json!({}),
                Some("destroy-worktree-w-1"),
            )
            .await
            .unwrap()
            .unwrap();

        handle(&ctx, &scheduled).await.unwrap();

        assert!(dockmaster_db::queries::works::get_work(&pool, "w-1").await.unwrap().is_none());
        assert!(dockmaster_db::queries::tasks::list_tasks_for_work(&pool, "w-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn already_deleted_work_is_a_silent_success() {
        let pool = create_in_memory_db().await;
        let ctx = test_context(pool.clone());

        let fake_task = dockmaster_db::models::ScheduledTask {
            id: "missing".into(),
            work_id: "w-ghost".into(),
            kind: ScheduledTaskKind::DestroyWorktree,
            scheduled_at: chrono::Utc::now(),
            attempt_count: 1,
            max_attempts: 5,
            status: dockmaster_db::models::ScheduledTaskStatus::Executing,
            metadata: serde_json::json!({}),
            idempotency_key: None,
            error_message: None,
            created_at: chrono::Utc::now(),
            executing_since: Some(chrono::Utc::now()),
        };

        handle(&ctx, &fake_task).await.unwrap();
    }
}
