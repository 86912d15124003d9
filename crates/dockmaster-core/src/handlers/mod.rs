//! Task handlers (C5): one per scheduled-task kind.
//!
//! Each handler is a function of `(ctx, scheduled_task)` that performs
//! I/O against external collaborators and returns a [`HandlerError`]
//! classifying the failure for C4/C3. Handlers never mutate Work status
//! directly -- they request transitions through [`crate::state_machine`].
//!
//! Cross-cutting rule: every handler must tolerate the Work row having
//! been deleted between scheduling and execution, treating it as benign
//! completion rather than an error.

mod comment_resolution;
mod create_worktree;
mod destroy_worktree;
mod git_push;
mod github_comment;
mod github_resolve_thread;
mod pr_feedback;
mod spawn_orchestrator;

use std::sync::Arc;

use sqlx::SqlitePool;

use dockmaster_db::models::{ScheduledTask, ScheduledTaskKind};

use crate::collaborators::{AgentRunner, IssueTracker, Multiplexer, PrHost, Vcs};
use crate::config::CoreConfig;
use crate::error::HandlerError;
use crate::scheduler::Scheduler;

/// Everything a handler needs: the store, the policy layer, tuning
/// knobs, and the external collaborators, all shareable across the
/// concurrently-dispatched handler calls the orchestrator and dispatcher
/// make.
#[derive(Clone)]
pub struct HandlerContext {
    pub pool: SqlitePool,
    pub scheduler: Arc<Scheduler>,
    pub config: CoreConfig,
    pub issue_tracker: Arc<dyn IssueTracker>,
    pub vcs: Arc<dyn Vcs>,
    pub pr_host: Arc<dyn PrHost>,
    pub multiplexer: Arc<dyn Multiplexer>,
    pub agent_runner: Arc<dyn AgentRunner>,
    /// Absolute path to the project root (`<project>/`).
    pub project_root: std::path::PathBuf,
}

/// Dispatch a scheduled task to its handler.
///
/// The source models scheduled-task kinds as a tagged variant with a
/// dispatch table mapping kind -> handler function; an unknown kind is
/// an invariant violation the control plane must refuse rather than
/// silently ignore. Since [`ScheduledTaskKind`] is already an exhaustive
/// enum, the compiler enforces that every kind has a handler here -- the
/// "unknown kind" case can only arise if this match itself is incomplete.
pub async fn dispatch(ctx: &HandlerContext, task: &ScheduledTask) -> Result<(), HandlerError> {
    match task.kind {
        ScheduledTaskKind::CreateWorktree => create_worktree::handle(ctx, task).await,
        ScheduledTaskKind::SpawnOrchestrator => spawn_orchestrator::handle(ctx, task).await,
        ScheduledTaskKind::GitPush => git_push::handle(ctx, task).await,
        ScheduledTaskKind::GithubComment => github_comment::handle(ctx, task).await,
        ScheduledTaskKind::GithubResolveThread => github_resolve_thread::handle(ctx, task).await,
        ScheduledTaskKind::PrFeedback => pr_feedback::handle(ctx, task).await,
        ScheduledTaskKind::CommentResolution => comment_resolution::handle(ctx, task).await,
        ScheduledTaskKind::DestroyWorktree => destroy_worktree::handle(ctx, task).await,
    }
}

/// Shared "tolerate a deleted Work" lookup used by every handler before it
/// does anything else.
async fn load_work_or_complete(
    ctx: &HandlerContext,
    task: &ScheduledTask,
) -> Result<dockmaster_db::models::Work, HandlerError> {
    let work = dockmaster_db::queries::works::get_work(&ctx.pool, &task.work_id)
        .await
        .map_err(HandlerError::Transient)?;

    work.ok_or(HandlerError::WorkNotFound)
}

pub(crate) use load_work_or_complete as load_work;

/// Multiplexer session name for a project: the project root's final path
/// component, so two different projects never collide in one multiplexer.
pub(crate) fn session_name(project_root: &std::path::Path) -> String {
    project_root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "dockmaster".to_string())
}

/// Multiplexer tab name for a work's orchestrator process.
pub(crate) fn work_tab_name(work_id: &str) -> String {
    format!("work-{work_id}")
}
