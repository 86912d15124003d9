//! `github-comment` handler.
//!
//! Thin retriable wrapper over [`crate::collaborators::PrHost::comment`].
//! Metadata: `pr_url`, `body`. Classifying the underlying failure into
//! transient vs. permanent is the collaborator's job -- it returns a
//! [`crate::error::CollaboratorError`] rather than a bare `anyhow::Error`,
//! so this handler just propagates it with `?` and lets `From` turn it
//! into the matching `HandlerError` variant.

use crate::error::HandlerError;

use super::{load_work, HandlerContext};

pub(super) async fn handle(
    ctx: &HandlerContext,
    task: &dockmaster_db::models::ScheduledTask,
) -> Result<(), HandlerError> {
    match load_work(ctx, task).await {
        Ok(_) => {}
        Err(HandlerError::WorkNotFound) => return Ok(()),
        Err(e) => return Err(e),
    };

    let pr_url = task
        .meta_str("pr_url")
        .ok_or_else(|| HandlerError::InvariantViolation("github-comment missing 'pr_url'".into()))?;
    let body = task
        .meta_str("body")
        .ok_or_else(|| HandlerError::InvariantViolation("github-comment missing 'body'".into()))?;

    Ok(ctx.pr_host.comment(pr_url, body).await?)
}
