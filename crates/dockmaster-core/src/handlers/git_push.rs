//! `git-push` handler.
//!
//! Thin retriable wrapper over [`crate::collaborators::Vcs::push_set_upstream`].
//! Metadata: `branch`. Classifying the underlying failure into transient
//! vs. permanent is the collaborator's job -- it returns a
//! [`crate::error::CollaboratorError`] rather than a bare `anyhow::Error`,
//! so this handler just propagates it with `?` and lets `From` turn it
//! into the matching `HandlerError` variant.

use crate::error::HandlerError;

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
        .ok_or_else(|| HandlerError::InvariantViolation("git-push missing 'branch'".into()))?;

    let worktree_path = work
        .worktree_path
        .as_deref()
        .ok_or_else(|| HandlerError::InvariantViolation(format!("git-push for {} with no worktree-path", work.id)))?;

    Ok(ctx.vcs.push_set_upstream(std::path::Path::new(worktree_path), branch).await?)
}
