//! `pr-feedback` handler (periodic).
//!
//! Polls the PR host for review/CI state, writes it onto the Work, and
//! schedules `comment-resolution` when threads need attention. Always
//! reschedules itself at `now + pr_feedback_interval` unless the Work has
//! reached a terminal status -- that's the only way this chain stops.

use chrono::Utc;
use dockmaster_db::models::{ScheduledTaskKind, WorkStatus};

use crate::error::HandlerError;

use super::{load_work, HandlerContext};

fn comment_resolution_key(work_id: &str) -> String {
    format!("comment-resolution-{work_id}")
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
        .ok_or_else(|| HandlerError::InvariantViolation(format!("pr-feedback for {} with no pr-url", work.id)))?;

    let snapshot = ctx.pr_host.fetch_snapshot(&pr_url).await?;

    dockmaster_db::queries::works::update_pr_status(
        &ctx.pool,
        &work.id,
        Some(&snapshot.pr_state),
        snapshot.ci_status.as_deref(),
        snapshot.approval_status.as_deref(),
    )
    .await
    .map_err(HandlerError::Transient)?;

    if !snapshot.unresolved_threads.is_empty() {
        ctx.scheduler
            .schedule_now(
                &ctx.pool,
                &work.id,
                ScheduledTaskKind::CommentResolution,
                serde_json::json!({}),
                Some(&comment_resolution_key(&work.id)),
            )
            .await
            .map_err(HandlerError::Transient)?;
    }

    if !matches!(work.status, WorkStatus::Completed | WorkStatus::Failed) {
        ctx.scheduler
            .schedule(
                &ctx.pool,
                &work.id,
                ScheduledTaskKind::PrFeedback,
                Utc::now() + chrono::Duration::from_std(ctx.config.pr_feedback_interval).unwrap_or(chrono::Duration::seconds(300)),
                serde_json::json!({}),
                None,
            )
            .await
            .map_err(HandlerError::Transient)?;
    }

    Ok(())
}
