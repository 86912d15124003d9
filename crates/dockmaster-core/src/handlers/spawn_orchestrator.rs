//! `spawn-orchestrator` handler.
//!
//! Precondition: `worktree_path` is set (always true by the time this runs,
//! since `create-worktree` only schedules it after persisting the path).
//! Launches the per-work orchestrator (C7) into a dedicated multiplexer
//! tab and returns as soon as the tab exists -- the orchestrator itself
//! runs out-of-process and is never awaited here.

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

    if work.worktree_path.is_none() {
        return Err(HandlerError::InvariantViolation(format!(
            "spawn-orchestrator for {} with no worktree-path",
            work.id
        )));
    }

    let session = session_name(&ctx.project_root);
    let tab = work_tab_name(&work.id);

    ctx.multiplexer.ensure_session(&session).await.map_err(HandlerError::Transient)?;

    if ctx.multiplexer.tab_exists(&session, &tab).await.map_err(HandlerError::Transient)? {
        return Ok(());
    }

    let command = format!("dock orchestrate --root {} --work {}", ctx.project_root.display(), work.id);

    ctx.multiplexer
        .create_tab(&session, &tab, &command)
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
    async fn launches_tab_for_worktree_backed_work() {
        let pool = create_in_memory_db().await;
        dockmaster_db::queries::works::insert_work(&pool, "w-1", "worker", "bead-1", "feat/x", "main", true)
            .await
            .unwrap();
        dockmaster_db::queries::works::set_worktree_path(&pool, "w-1", "/tmp/w-1/tree")
            .await
            .unwrap();

        let ctx = test_context(pool.clone());
        let scheduled = ctx
            .scheduler
            .schedule_now(&pool, "w-1", ScheduledTaskKind::SpawnOrchestrator, serde_json::json!({}), None)
            .await
            .unwrap()
            .unwrap();

        handle(&ctx, &scheduled).await.unwrap();
    }

    #[tokio::test]
    async fn missing_worktree_path_is_an_invariant_violation() {
        let pool = create_in_memory_db().await;
        dockmaster_db::queries::works::insert_work(&pool, "w-1", "worker", "bead-1", "feat/x", "main", true)
            .await
            .unwrap();

        let ctx = test_context(pool.clone());
        let scheduled = ctx
            .scheduler
            .schedule_now(&pool, "w-1", ScheduledTaskKind::SpawnOrchestrator, serde_json::json!({}), None)
            .await
            .unwrap()
            .unwrap();

        let err = handle(&ctx, &scheduled).await.unwrap_err();
        assert!(matches!(err, HandlerError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn deleted_work_is_a_silent_success() {
        let pool = create_in_memory_db().await;
        let ctx = test_context(pool.clone());
        let fake_task = dockmaster_db::models::ScheduledTask {
            id: "missing".into(),
            work_id: "w-ghost".into(),
            kind: ScheduledTaskKind::SpawnOrchestrator,
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
