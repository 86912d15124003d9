//! `comment-resolution` handler (periodic).
//!
//! For every unresolved review thread on the Work's PR: if a child bead
//! tagged `comment-<thread-id>` already exists and is workable, assume the
//! agent has produced (or is producing) a fix and schedule
//! `github-resolve-thread`. Otherwise file a fresh child bead under the
//! root issue so the orchestrator picks it up as a follow-on `implement`
//! task.

use dockmaster_db::models::ScheduledTaskKind;

use crate::error::HandlerError;

use super::{load_work, HandlerContext};

fn thread_tag(thread_id: &str) -> String {
    format!("comment-{thread_id}")
}

fn resolve_thread_key(work_id: &str, thread_id: &str) -> String {
    format!("github-resolve-thread-{work_id}-{thread_id}")
}

pub(super) async fn handle(
    ctx: &HandlerContext,
    task: &dockmaster_db::models::ScheduledTask,
) -> Result<(), HandlerError> {
    let work = match load_work(ctx, task).await {
        Ok(w) => w,
        Err(HandlerError::WorkNotFound) => return Ok(()),
        Err(e) => return Err(e),
    };

    let pr_url = work
        .pr_url
        .clone()
        .ok_or_else(|| HandlerError::InvariantViolation(format!("comment-resolution for {} with no pr-url", work.id)))?;

    let snapshot = ctx.pr_host.fetch_snapshot(&pr_url).await?;

    let children = ctx
        .issue_tracker
        .get_bead_with_children(&work.root_issue_id)
        .await
        .map_err(HandlerError::Transient)?;

    for thread in &snapshot.unresolved_threads {
        let tag = thread_tag(&thread.id);
        let has_response = children.iter().any(|b| {
            b.external_ref.as_deref() == Some(tag.as_str()) && ctx.issue_tracker.is_workable_status(b.status)
        });

        if has_response {
            ctx.scheduler
                .schedule_now(
                    &ctx.pool,
                    &work.id,
                    ScheduledTaskKind::GithubResolveThread,
                    serde_json::json!({ "thread_id": thread.id, "pr_url": pr_url }),
                    Some(&resolve_thread_key(&work.id, &thread.id)),
                )
                .await
                .map_err(HandlerError::Transient)?;
        } else {
            ctx.issue_tracker
                .create_child_bead(&work.root_issue_id, &format!("address review comment: {}", thread.body), Some(&tag))
                .await
                .map_err(HandlerError::Transient)?;
        }
    }

    Ok(())
}
