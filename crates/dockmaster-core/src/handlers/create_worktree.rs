//! `create-worktree` handler.
//!
//! Metadata: `branch`, `base_branch`, `worker_name`, optional
//! `use_existing_branch`. If the Work already has a worktree-path, skip
//! straight to the push step (idempotent re-run after a crash). Otherwise
//! create the worktree and initialize its toolchain (non-fatal on
//! failure). On success, pushes with upstream set and schedules
//! `spawn-orchestrator`.

use dockmaster_db::models::ScheduledTaskKind;

use crate::error::HandlerError;
use crate::state_machine::WorkStateMachine;

use super::{load_work, HandlerContext};

pub(super) async fn handle(
    ctx: &HandlerContext,
    task: &dockmaster_db::models::ScheduledTask,
) -> Result<(), HandlerError> {
    let work = match load_work(ctx, task).await {
        Ok(w) => w,
        Err(HandlerError::WorkNotFound) => return Ok(()),
        Err(e) => return Err(e),
    };

    let branch = task
        .meta_str("branch")
        .ok_or_else(|| HandlerError::InvariantViolation("create-worktree missing 'branch'".into()))?;
    let base_branch = task
        .meta_str("base_branch")
        .ok_or_else(|| HandlerError::InvariantViolation("create-worktree missing 'base_branch'".into()))?;
    let use_existing_branch = task
        .metadata
        .get("use_existing_branch")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let worktree_path = if let Some(existing) = &work.worktree_path {
        std::path::PathBuf::from(existing)
    } else {
        let path = ctx.vcs.create_worktree(&work.id, branch, base_branch, use_existing_branch).await?;

        if let Err(err) = ctx.vcs.init_toolchain(&path).await {
            tracing::warn!(work_id = %work.id, %err, "toolchain init failed, continuing");
        }

        dockmaster_db::queries::works::set_worktree_path(&ctx.pool, &work.id, &path.to_string_lossy())
            .await
            .map_err(HandlerError::Transient)?;

        path
    };

    ctx.vcs.push_set_upstream(&worktree_path, branch).await?;

    if work.status == dockmaster_db::models::WorkStatus::Pending {
        WorkStateMachine::start_processing(&ctx.pool, &work.id)
            .await
            .map_err(HandlerError::Permanent)?;
    }

    ctx.scheduler
        .schedule_now(
            &ctx.pool,
            &work.id,
            ScheduledTaskKind::SpawnOrchestrator,
            serde_json::json!({ "worker_name": work.worker_name }),
            Some(&format!("spawn-orchestrator-{}", work.id)),
        )
        .await
        .map_err(HandlerError::Transient)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_context;
    use dockmaster_db::models::ScheduledTaskStatus;
    use dockmaster_test_utils::create_in_memory_db;

    #[tokio::test]
    async fn provisions_worktree_and_schedules_spawn() {
        let pool = create_in_memory_db().await;
        dockmaster_db::queries::works::insert_work(&pool, "w-1", "worker", "bead-1", "feat/x", "main", true)
            .await
            .unwrap();

        let ctx = test_context(pool.clone());
        let scheduled = ctx
            .scheduler
            .schedule_now(
                &pool,
                "w-1",
                ScheduledTaskKind::CreateWorktree,
                serde_json::json!({"branch": "feat/x", "base_branch": "main", "worker_name": "worker"}),
                None,
            )
            .await
            .unwrap()
            .unwrap();

        handle(&ctx, &scheduled).await.unwrap();

        let work = dockmaster_db::queries::works::get_work(&pool, "w-1").await.unwrap().unwrap();
        assert_eq!(work.worktree_path.as_deref(), Some("/tmp/w-1/tree"));
        assert_eq!(work.status, dockmaster_db::models::WorkStatus::Processing);

        let pending = ctx
            .scheduler
            .list_by_status(&pool, ScheduledTaskStatus::Pending)
            .await
            .unwrap();
        assert!(pending.iter().any(|t| t.kind == ScheduledTaskKind::SpawnOrchestrator));
    }

    #[tokio::test]
    async fn rerun_after_worktree_path_already_set_skips_creation() {
        let pool = create_in_memory_db().await;
        dockmaster_db::queries::works::insert_work(&pool, "w-1", "worker", "bead-1", "feat/x", "main", true)
            .await
            .unwrap();
        dockmaster_db::queries::works::set_worktree_path(&pool, "w-1", "/already/there")
            .await
            .unwrap();

        let ctx = test_context(pool.clone());
        let scheduled = ctx
            .scheduler
            .schedule_now(
                &pool,
                "w-1",
                ScheduledTaskKind::CreateWorktree,
                serde_json::json!({"branch": "feat/x", "base_branch": "main"}),
                None,
            )
            .await
            .unwrap()
            .unwrap();

        handle(&ctx, &scheduled).await.unwrap();

        let work = dockmaster_db::queries::works::get_work(&pool, "w-1").await.unwrap().unwrap();
        assert_eq!(work.worktree_path.as_deref(), Some("/already/there"));
    }

    #[tokio::test]
    async fn deleted_work_is_a_silent_success() {
        let pool = create_in_memory_db().await;
        let ctx = test_context(pool.clone());

        let fake_task = dockmaster_db::models::ScheduledTask {
            id: "missing".into(),
            work_id: "w-ghost".into(),
            kind: ScheduledTaskKind::CreateWorktree,
            scheduled_at: chrono::Utc::now(),
            attempt_count: 1,
            max_attempts: 5,
            status: ScheduledTaskStatus::Executing,
            metadata: serde_json::json!({"branch": "x", "base_branch": "main"}),
            idempotency_key: None,
            error_message: None,
            created_at: chrono::Utc::now(),
            executing_since: Some(chrono::Utc::now()),
        };

        handle(&ctx, &fake_task).await.unwrap();
    }

    #[tokio::test]
    async fn missing_metadata_is_an_invariant_violation() {
        let pool = create_in_memory_db().await;
        dockmaster_db::queries::works::insert_work(&pool, "w-1", "worker", "bead-1", "feat/x", "main", true)
            .await
            .unwrap();
        let ctx = test_context(pool.clone());
        let scheduled = ctx
            .scheduler
            .schedule_now(&pool, "w-1", ScheduledTaskKind::CreateWorktree, serde_json::json!({}), None)
            .await
            .unwrap()
            .unwrap();

        let err = handle(&ctx, &scheduled).await.unwrap_err();
        assert!(matches!(err, HandlerError::InvariantViolation(_)));
    }

    struct RecordingVcs {
        toolchain_init_calls: std::sync::Mutex<Vec<std::path::PathBuf>>,
    }

    #[async_trait::async_trait]
    impl crate::collaborators::Vcs for RecordingVcs {
        async fn create_worktree(
            &self,
            work_id: &str,
            _branch: &str,
            _base_branch: &str,
            _use_existing_branch: bool,
        ) -> crate::collaborators::vcs::Result<std::path::PathBuf> {
            Ok(std::path::PathBuf::from(format!("/tmp/{work_id}/tree")))
        }
        async fn remove_worktree(&self, _path: &std::path::Path) -> crate::collaborators::vcs::Result<()> {
            Ok(())
        }
        async fn push_set_upstream(&self, _worktree_path: &std::path::Path, _branch: &str) -> crate::collaborators::vcs::Result<()> {
            Ok(())
        }
        async fn validate_existing_branch(&self, _branch: &str) -> crate::collaborators::vcs::Result<bool> {
            Ok(true)
        }
        async fn has_commits_ahead(&self, _branch: &str, _base_branch: &str) -> crate::collaborators::vcs::Result<bool> {
            Ok(false)
        }
        async fn merge_branch(&self, _branch: &str) -> crate::collaborators::vcs::Result<crate::collaborators::vcs::MergeOutcome> {
            Ok(crate::collaborators::vcs::MergeOutcome::Success)
        }
        async fn delete_branch(&self, _branch: &str) -> crate::collaborators::vcs::Result<()> {
            Ok(())
        }
        async fn init_toolchain(&self, worktree_path: &std::path::Path) -> crate::collaborators::vcs::Result<()> {
            self.toolchain_init_calls.lock().unwrap().push(worktree_path.to_path_buf());
            Ok(())
        }
    }

    #[tokio::test]
    async fn fresh_worktree_creation_initializes_toolchain() {
        let pool = create_in_memory_db().await;
        dockmaster_db::queries::works::insert_work(&pool, "w-1", "worker", "bead-1", "feat/x", "main", true)
            .await
            .unwrap();

        let mut ctx = test_context(pool.clone());
        let vcs = std::sync::Arc::new(RecordingVcs { toolchain_init_calls: std::sync::Mutex::new(vec![]) });
        ctx.vcs = vcs.clone();

        let scheduled = ctx
            .scheduler
            .schedule_now(
                &pool,
                "w-1",
                ScheduledTaskKind::CreateWorktree,
                serde_json::json!({"branch": "feat/x", "base_branch": "main", "worker_name": "worker"}),
                None,
            )
            .await
            .unwrap()
            .unwrap();

        handle(&ctx, &scheduled).await.unwrap();

        assert_eq!(vcs.toolchain_init_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rerun_with_existing_worktree_path_skips_toolchain_init() {
        let pool = create_in_memory_db().await;
        dockmaster_db::queries::works::insert_work(&pool, "w-1", "worker", "bead-1", "feat/x", "main", true)
            .await
            .unwrap();
        dockmaster_db::queries::works::set_worktree_path(&pool, "w-1", "/already/there")
            .await
            .unwrap();

        let mut ctx = test_context(pool.clone());
        let vcs = std::sync::Arc::new(RecordingVcs { toolchain_init_calls: std::sync::Mutex::new(vec![]) });
        ctx.vcs = vcs.clone();

        let scheduled = ctx
            .scheduler
            .schedule_now(
                &pool,
                "w-1",
                ScheduledTaskKind::CreateWorktree,
                serde_json::json!({"branch": "feat/x", "base_branch": "main"}),
                None,
            )
            .await
            .unwrap()
            .unwrap();

        handle(&ctx, &scheduled).await.unwrap();

        assert!(vcs.toolchain_init_calls.lock().unwrap().is_empty());
    }
}
