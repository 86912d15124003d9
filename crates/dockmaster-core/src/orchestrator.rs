//! Orchestrator driver (C7).
//!
//! Runs once per invocation of the per-work orchestrator process spawned by
//! the `spawn-orchestrator` handler. Not part of the control plane's own
//! event loop -- it is launched out-of-process and talks to the store the
//! same way any other client does.
//!
//! Loop: plan tasks from the work's beads if none exist yet, then drive
//! pending tasks to completion in dependency order, chaining
//! implement -> review -> (more implement, if the reviewer filed fix
//! beads) -> pr. Any task failure halts the loop and leaves the Work
//! `failed` for an operator to inspect. A task inserted with
//! `auto_workflow=false` (an operator-requested review or pr, not one the
//! orchestrator planned itself) still runs, but its completion does not
//! trigger the next stage -- the loop halts and leaves the Work `idle`.

use dockmaster_db::models::{Task, TaskKind, TaskStatus, WorkStatus};

use crate::collaborators::issue_tracker::Bead;
use crate::dag::{sort_groups_by_dependencies, DagError, TaskGroup};
use crate::error::HandlerError;
use crate::handlers::HandlerContext;
use crate::state_machine::WorkStateMachine;

/// Drive one work's orchestrator loop to completion (or to a halt on
/// failure). Returns once the work has reached `idle` or `failed`.
pub async fn run(ctx: &HandlerContext, work_id: &str) -> Result<(), HandlerError> {
    let work = dockmaster_db::queries::works::get_work(&ctx.pool, work_id)
        .await
        .map_err(HandlerError::Transient)?
        .ok_or(HandlerError::WorkNotFound)?;

    let existing = dockmaster_db::queries::tasks::list_tasks_for_work(&ctx.pool, work_id)
        .await
        .map_err(HandlerError::Transient)?;

    if existing.is_empty() {
        plan_tasks(ctx, &work.id, &work.root_issue_id).await?;
    }

    drive_pending_tasks(ctx, &work.id).await?;

    if matches!(
        dockmaster_db::queries::works::get_work(&ctx.pool, &work.id)
            .await
            .map_err(HandlerError::Transient)?
            .map(|w| w.status),
        Some(WorkStatus::Processing)
    ) {
        WorkStateMachine::go_idle(&ctx.pool, &work.id)
            .await
            .map_err(HandlerError::Permanent)?;
    }

    Ok(())
}

/// Split a work's assigned beads into one `implement` task group per bead,
/// respecting dependency order, and persist them.
async fn plan_tasks(ctx: &HandlerContext, work_id: &str, root_issue_id: &str) -> Result<(), HandlerError> {
    let assigned = dockmaster_db::queries::works::list_work_beads(&ctx.pool, work_id)
        .await
        .map_err(HandlerError::Transient)?;

    let bead_ids: Vec<String> = if assigned.is_empty() {
        vec![root_issue_id.to_string()]
    } else {
        assigned.into_iter().map(|b| b.bead_id).collect()
    };

    let beads = ctx
        .issue_tracker
        .get_beads_with_deps(&bead_ids)
        .await
        .map_err(HandlerError::Transient)?;

    let groups: Vec<TaskGroup> = bead_ids
        .iter()
        .enumerate()
        .map(|(index, id)| TaskGroup { index, bead_ids: vec![id.clone()] })
        .collect();

    let edges: Vec<(String, String)> = beads
        .iter()
        .flat_map(|b| b.depends_on.iter().map(move |dep| (b.id.clone(), dep.clone())))
        .collect();

    let ordered = sort_groups_by_dependencies(&groups, &edges).map_err(|e| match e {
        DagError::Cycle(members) => {
            HandlerError::InvariantViolation(format!("task-group dependency cycle among groups {members:?}"))
        }
    })?;

    for group in ordered {
        let task = dockmaster_db::queries::tasks::insert_next_task(&ctx.pool, work_id, TaskKind::Implement, None, None)
            .await
            .map_err(HandlerError::Transient)?;
        for (position, bead_id) in group.bead_ids.iter().enumerate() {
            dockmaster_db::queries::tasks::add_task_bead(&ctx.pool, &task.id, bead_id, position as i64)
                .await
                .map_err(HandlerError::Transient)?;
        }
    }

    Ok(())
}

/// Drive every pending task for a work in sequence order, chaining on a
/// clean review into `pr`, or on a dirty review into more `implement`
/// tasks, bounded by `max_review_iterations`.
async fn drive_pending_tasks(ctx: &HandlerContext, work_id: &str) -> Result<(), HandlerError> {
    let mut review_iterations = 0u32;

    loop {
        let tasks = dockmaster_db::queries::tasks::list_tasks_for_work(&ctx.pool, work_id)
            .await
            .map_err(HandlerError::Transient)?;

        let Some(next) = tasks.into_iter().find(|t| t.status == TaskStatus::Pending) else {
            break;
        };

        if run_task(ctx, &next).await.is_err() {
            // `run_task` already recorded the failure on the Task row; fail
            // the Work and stop driving it.
            dockmaster_db::queries::works::fail_work(
                &ctx.pool,
                work_id,
                &format!("task {} failed", next.id),
            )
            .await
            .map_err(HandlerError::Permanent)?;
            return Ok(());
        }

        if next.kind == TaskKind::Review {
            if !next.is_auto_workflow() {
                tracing::info!(work_id, task_id = %next.id, "manual review task completed; orchestrator does not auto-chain");
                break;
            }

            review_iterations += 1;
            if review_iterations > ctx.config.max_review_iterations {
                tracing::warn!(work_id, review_iterations, "max review iterations exceeded, giving up");
                break;
            }

            let fix_beads = find_review_fix_beads(ctx, work_id, &next).await?;
            if fix_beads.is_empty() {
                create_pr_task(ctx, work_id).await?;
                break;
            }

            create_implement_tasks_for(ctx, work_id, &fix_beads).await?;
            continue;
        }

        let all_implements_done = next.is_auto_workflow() && {
            let tasks = dockmaster_db::queries::tasks::list_tasks_for_work(&ctx.pool, work_id)
                .await
                .map_err(HandlerError::Transient)?;
            // Re-review is warranted once every `implement` task opened after
            // the last review (or, if none yet, any implement task at all)
            // has completed -- not merely "no review has ever run", which
            // would block the fix-implement -> re-review -> pr chain after
            // the first dirty review.
            let last_review_seq = tasks.iter().filter(|t| t.kind == TaskKind::Review).map(|t| t.seq).max();
            let implements_since_last_review: Vec<&Task> = tasks
                .iter()
                .filter(|t| t.kind == TaskKind::Implement && last_review_seq.is_none_or(|seq| t.seq > seq))
                .collect();
            !implements_since_last_review.is_empty()
                && implements_since_last_review.iter().all(|t| t.status == TaskStatus::Completed)
        };
        if all_implements_done {
            dockmaster_db::queries::tasks::insert_next_task(&ctx.pool, work_id, TaskKind::Review, None, None)
                .await
                .map_err(HandlerError::Transient)?;
        }
    }

    Ok(())
}

async fn run_task(ctx: &HandlerContext, task: &Task) -> Result<(), HandlerError> {
    let work = dockmaster_db::queries::works::get_work(&ctx.pool, &task.work_id)
        .await
        .map_err(HandlerError::Transient)?
        .ok_or(HandlerError::WorkNotFound)?;

    let worktree_path = work
        .worktree_path
        .ok_or_else(|| HandlerError::InvariantViolation(format!("task {} run with no worktree-path", task.id)))?;

    dockmaster_db::queries::tasks::mark_task_started(&ctx.pool, &task.id)
        .await
        .map_err(HandlerError::Transient)?;

    let prompt = build_prompt(task);

    let outcome = ctx
        .agent_runner
        .run(&task.id, &prompt, std::path::Path::new(&worktree_path))
        .await
        .map_err(HandlerError::Transient)?;

    match outcome {
        crate::collaborators::AgentOutcome::Success => {
            dockmaster_db::queries::tasks::mark_task_completed(&ctx.pool, &task.id)
                .await
                .map_err(HandlerError::Transient)?;
            Ok(())
        }
        crate::collaborators::AgentOutcome::Failure { reason } => {
            dockmaster_db::queries::tasks::fail_task(&ctx.pool, &task.id, &reason)
                .await
                .map_err(HandlerError::Transient)?;
            Err(HandlerError::Permanent(anyhow::anyhow!(reason)))
        }
    }
}

fn build_prompt(task: &Task) -> String {
    match task.kind {
        TaskKind::Estimate => format!("Estimate the complexity of task {}.", task.id),
        TaskKind::Implement => format!("Implement the work described by task {}.", task.id),
        TaskKind::Review => format!("Review the changes made for task {} and file any fix beads needed.", task.id),
        TaskKind::Pr => format!("Open a pull request for the work covered by task {}.", task.id),
        TaskKind::UpdatePrDescription => format!("Update the pull request description for task {}.", task.id),
    }
}

/// Child beads the reviewer filed under the root issue for this review
/// task, that are workable and tagged as coming from it.
async fn find_review_fix_beads(ctx: &HandlerContext, work_id: &str, review_task: &Task) -> Result<Vec<Bead>, HandlerError> {
    let work = dockmaster_db::queries::works::get_work(&ctx.pool, work_id)
        .await
        .map_err(HandlerError::Transient)?
        .ok_or(HandlerError::WorkNotFound)?;

    ctx.issue_tracker.flush_cache().await.map_err(HandlerError::Transient)?;

    let children = ctx
        .issue_tracker
        .get_bead_with_children(&work.root_issue_id)
        .await
        .map_err(HandlerError::Transient)?;

    let tag = format!("review-{}", review_task.id);
    Ok(children
        .into_iter()
        .filter(|b| b.external_ref.as_deref() == Some(tag.as_str()) && ctx.issue_tracker.is_workable_status(b.status))
        .collect())
}

async fn create_implement_tasks_for(ctx: &HandlerContext, work_id: &str, beads: &[Bead]) -> Result<(), HandlerError> {
    for bead in beads {
        let task = dockmaster_db::queries::tasks::insert_next_task(&ctx.pool, work_id, TaskKind::Implement, None, None)
            .await
            .map_err(HandlerError::Transient)?;
        dockmaster_db::queries::tasks::add_task_bead(&ctx.pool, &task.id, &bead.id, 0)
            .await
            .map_err(HandlerError::Transient)?;
    }
    Ok(())
}

async fn create_pr_task(ctx: &HandlerContext, work_id: &str) -> Result<(), HandlerError> {
    let task = dockmaster_db::queries::tasks::insert_next_task(&ctx.pool, work_id, TaskKind::Pr, None, None)
        .await
        .map_err(HandlerError::Transient)?;

    let work = dockmaster_db::queries::works::get_work(&ctx.pool, work_id)
        .await
        .map_err(HandlerError::Transient)?
        .ok_or(HandlerError::WorkNotFound)?;
    let worktree_path = work
        .worktree_path
        .ok_or_else(|| HandlerError::InvariantViolation(format!("pr task for {work_id} with no worktree-path")))?;

    dockmaster_db::queries::tasks::mark_task_started(&ctx.pool, &task.id)
        .await
        .map_err(HandlerError::Transient)?;

    let pr_url = ctx
        .pr_host
        .create_pr_in_dir(
            std::path::Path::new(&worktree_path),
            &format!("{work_id}"),
            "Automated PR opened by the orchestrator.",
        )
        .await?;

    dockmaster_db::queries::works::set_pr_url(&ctx.pool, work_id, &pr_url)
        .await
        .map_err(HandlerError::Transient)?;
    dockmaster_db::queries::tasks::mark_task_completed(&ctx.pool, &task.id)
        .await
        .map_err(HandlerError::Transient)?;

    ctx.scheduler
        .schedule_now(
            &ctx.pool,
            work_id,
            dockmaster_db::models::ScheduledTaskKind::PrFeedback,
            serde_json::json!({}),
            None,
        )
        .await
        .map_err(HandlerError::Transient)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::issue_tracker::BeadStatus;
    use crate::collaborators::{AgentOutcome, AgentRunner, IssueTracker};
    use crate::test_support::test_context;
    use dockmaster_test_utils::create_in_memory_db;

    struct AlwaysSucceeds;
    #[async_trait::async_trait]
    impl AgentRunner for AlwaysSucceeds {
        async fn run(&self, _task_id: &str, _prompt: &str, _cwd: &std::path::Path) -> anyhow::Result<AgentOutcome> {
            Ok(AgentOutcome::Success)
        }
    }

    struct CleanReviewTracker;
    #[async_trait::async_trait]
    impl IssueTracker for CleanReviewTracker {
        async fn get_bead(&self, _id: &str) -> anyhow::Result<Option<Bead>> {
            Ok(None)
        }
        async fn get_bead_with_children(&self, _id: &str) -> anyhow::Result<Vec<Bead>> {
            Ok(vec![])
        }
        async fn get_beads_with_deps(&self, ids: &[String]) -> anyhow::Result<Vec<Bead>> {
            Ok(ids
                .iter()
                .map(|id| Bead { id: id.clone(), title: id.clone(), status: BeadStatus::Open, depends_on: vec![], external_ref: None })
                .collect())
        }
        async fn close(&self, _id: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn create_child_bead(&self, parent_id: &str, title: &str, external_ref: Option<&str>) -> anyhow::Result<Bead> {
            Ok(Bead { id: format!("{parent_id}-child"), title: title.to_string(), status: BeadStatus::Open, depends_on: vec![], external_ref: external_ref.map(str::to_string) })
        }
        async fn flush_cache(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn happy_path_single_bead_reaches_idle_with_pr_url() {
        let pool = create_in_memory_db().await;
        dockmaster_db::queries::works::insert_work(&pool, "w-1", "worker", "bead-1", "feat/x", "main", true)
            .await
            .unwrap();
        dockmaster_db::queries::works::set_worktree_path(&pool, "w-1", "/tmp/w-1/tree")
            .await
            .unwrap();
        dockmaster_db::queries::works::add_work_bead(&pool, "w-1", "bead-1").await.unwrap();
        WorkStateMachine::start_processing(&pool, "w-1").await.unwrap();

        let mut ctx = test_context(pool.clone());
        ctx.agent_runner = std::sync::Arc::new(AlwaysSucceeds);
        ctx.issue_tracker = std::sync::Arc::new(CleanReviewTracker);

        run(&ctx, "w-1").await.unwrap();

        let work = dockmaster_db::queries::works::get_work(&pool, "w-1").await.unwrap().unwrap();
        assert_eq!(work.status, WorkStatus::Idle);
        assert!(work.pr_url.is_some());

        let tasks = dockmaster_db::queries::tasks::list_tasks_for_work(&pool, "w-1").await.unwrap();
        let kinds: Vec<TaskKind> = tasks.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TaskKind::Implement, TaskKind::Review, TaskKind::Pr]);
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
    }

    struct FailsOnce;
    #[async_trait::async_trait]
    impl AgentRunner for FailsOnce {
        async fn run(&self, _task_id: &str, _prompt: &str, _cwd: &std::path::Path) -> anyhow::Result<AgentOutcome> {
            Ok(AgentOutcome::Failure { reason: "agent crashed".into() })
        }
    }

    #[tokio::test]
    async fn task_failure_halts_the_loop_and_fails_the_work() {
        let pool = create_in_memory_db().await;
        dockmaster_db::queries::works::insert_work(&pool, "w-1", "worker", "bead-1", "feat/x", "main", true)
            .await
            .unwrap();
        dockmaster_db::queries::works::set_worktree_path(&pool, "w-1", "/tmp/w-1/tree")
            .await
            .unwrap();
        dockmaster_db::queries::works::add_work_bead(&pool, "w-1", "bead-1").await.unwrap();
        WorkStateMachine::start_processing(&pool, "w-1").await.unwrap();

        let mut ctx = test_context(pool.clone());
        ctx.agent_runner = std::sync::Arc::new(FailsOnce);
        ctx.issue_tracker = std::sync::Arc::new(CleanReviewTracker);

        run(&ctx, "w-1").await.unwrap();

        let work = dockmaster_db::queries::works::get_work(&pool, "w-1").await.unwrap().unwrap();
        assert_eq!(work.status, WorkStatus::Failed);
    }

    /// Reports a fix bead tagged to the *first* `review` task this work
    /// ever gets (found by querying `pool` directly, since the tracker
    /// can't predict the uuid the orchestrator will assign it), then
    /// reports no children on every later call. Models a reviewer that
    /// files exactly one round of fix-up work.
    struct DirtyOnceThenCleanTracker {
        pool: sqlx::SqlitePool,
        work_id: String,
    }
    #[async_trait::async_trait]
    impl IssueTracker for DirtyOnceThenCleanTracker {
        async fn get_bead(&self, _id: &str) -> anyhow::Result<Option<Bead>> {
            Ok(None)
        }
        async fn get_bead_with_children(&self, _id: &str) -> anyhow::Result<Vec<Bead>> {
            let tasks = dockmaster_db::queries::tasks::list_tasks_for_work(&self.pool, &self.work_id).await?;
            let Some(first_review) = tasks.iter().find(|t| t.kind == TaskKind::Review) else {
                return Ok(vec![]);
            };
            let already_fixed = tasks.iter().any(|t| t.kind == TaskKind::Implement && t.seq > first_review.seq);
            if already_fixed {
                return Ok(vec![]);
            }
            Ok(vec![Bead {
                id: "fix-1".into(),
                title: "address review feedback".into(),
                status: BeadStatus::Open,
                depends_on: vec![],
                external_ref: Some(format!("review-{}", first_review.id)),
            }])
        }
        async fn get_beads_with_deps(&self, ids: &[String]) -> anyhow::Result<Vec<Bead>> {
            Ok(ids
                .iter()
                .map(|id| Bead { id: id.clone(), title: id.clone(), status: BeadStatus::Open, depends_on: vec![], external_ref: None })
                .collect())
        }
        async fn close(&self, _id: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn create_child_bead(&self, parent_id: &str, title: &str, external_ref: Option<&str>) -> anyhow::Result<Bead> {
            Ok(Bead { id: format!("{parent_id}-child"), title: title.to_string(), status: BeadStatus::Open, depends_on: vec![], external_ref: external_ref.map(str::to_string) })
        }
        async fn flush_cache(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn dirty_review_chains_into_fix_implement_then_second_review_then_pr() {
        let pool = create_in_memory_db().await;
        dockmaster_db::queries::works::insert_work(&pool, "w-1", "worker", "bead-1", "feat/x", "main", true)
            .await
            .unwrap();
        dockmaster_db::queries::works::set_worktree_path(&pool, "w-1", "/tmp/w-1/tree")
            .await
            .unwrap();
        dockmaster_db::queries::works::add_work_bead(&pool, "w-1", "bead-1").await.unwrap();
        WorkStateMachine::start_processing(&pool, "w-1").await.unwrap();

        let mut ctx = test_context(pool.clone());
        ctx.agent_runner = std::sync::Arc::new(AlwaysSucceeds);
        ctx.issue_tracker = std::sync::Arc::new(DirtyOnceThenCleanTracker { pool: pool.clone(), work_id: "w-1".into() });

        run(&ctx, "w-1").await.unwrap();

        let work = dockmaster_db::queries::works::get_work(&pool, "w-1").await.unwrap().unwrap();
        assert_eq!(work.status, WorkStatus::Idle);
        assert!(work.pr_url.is_some(), "convergence loop must reach pr after a dirty review is fixed");

        let tasks = dockmaster_db::queries::tasks::list_tasks_for_work(&pool, "w-1").await.unwrap();
        let kinds: Vec<TaskKind> = tasks.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TaskKind::Implement, TaskKind::Review, TaskKind::Implement, TaskKind::Review, TaskKind::Pr]);
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
    }

    #[tokio::test]
    async fn manual_review_without_auto_does_not_chain_into_pr() {
        let pool = create_in_memory_db().await;
        dockmaster_db::queries::works::insert_work(&pool, "w-1", "worker", "bead-1", "feat/x", "main", true)
            .await
            .unwrap();
        dockmaster_db::queries::works::set_worktree_path(&pool, "w-1", "/tmp/w-1/tree")
            .await
            .unwrap();
        WorkStateMachine::start_processing(&pool, "w-1").await.unwrap();
        dockmaster_db::queries::tasks::insert_next_task(&pool, "w-1", TaskKind::Review, None, Some(false))
            .await
            .unwrap();

        let mut ctx = test_context(pool.clone());
        ctx.agent_runner = std::sync::Arc::new(AlwaysSucceeds);
        ctx.issue_tracker = std::sync::Arc::new(CleanReviewTracker);

        run(&ctx, "w-1").await.unwrap();

        let tasks = dockmaster_db::queries::tasks::list_tasks_for_work(&pool, "w-1").await.unwrap();
        assert_eq!(tasks.len(), 1, "orchestrator must not auto-chain off a manual review task");
        assert!(tasks[0].status == TaskStatus::Completed);

        let work = dockmaster_db::queries::works::get_work(&pool, "w-1").await.unwrap().unwrap();
        assert_eq!(work.status, WorkStatus::Idle);
    }
}
