//! `github-resolve-thread` handler.
//!
//! Thin retriable wrapper over [`crate::collaborators::PrHost::resolve_thread`].
//! Metadata: `pr_url`, `thread_id`. Scheduled by `comment-resolution` once a
//! workable response bead exists for a thread. Classifying the underlying
//! failure into transient vs. permanent is the collaborator's job -- it
//! returns a [`crate::error::CollaboratorError`] rather than a bare
//! `anyhow::Error`, so this handler just propagates it with `?` and lets
//! `From` turn it into the matching `HandlerError` variant.

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
        .ok_or_else(|| HandlerError::InvariantViolation("github-resolve-thread missing 'pr_url'".into()))?;
    let thread_id = task
        .meta_str("thread_id")
        .ok_or_else(|| HandlerError::InvariantViolation("github-resolve-thread missing 'thread_id'".into()))?;

    Ok(ctx.pr_host.resolve_thread(pr_url, thread_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_context;
    use dockmaster_db::models::ScheduledTaskKind;
    use dockmaster_test_utils::create_in_memory_db;

    #[tokio::test]
    async fn resolves_a_thread() {
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
                ScheduledTaskKind::GithubResolveThread,
                serde_json::json!({"pr_url": "https://example.invalid/pr/1", "thread_id": "t-1"}),
                None,
            )
            .await
            .unwrap()
            .unwrap();

        handle(&ctx, &scheduled).await.unwrap();
    }
}
