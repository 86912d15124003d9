//! Dispatcher loop (C4): the control plane's single-threaded event loop.
//!
//! One OS thread drives dispatch; handlers run synchronously and to
//! completion before the next iteration. Grounded on `gator-core`'s
//! `run_orchestrator` loop (`tokio::select!` over a results channel and a
//! `CancellationToken`), adapted to select over {cancel, DB-change event,
//! safety-net timer} instead of {lifecycle results, cancel}.

use tokio_util::sync::CancellationToken;

use dockmaster_db::models::ScheduledTaskStatus;

use crate::broker::{ChangeBroker, ChangeEvent};
use crate::handlers::{self, HandlerContext};

/// Run the dispatcher loop until `cancel` fires.
///
/// Each wakeup (event, timer, or loop start) drains every currently-due
/// scheduled task before going back to sleep, so a burst of work
/// discovered by one event is fully processed without waiting for the next
/// tick.
pub async fn run(ctx: HandlerContext, broker: &ChangeBroker, cancel: CancellationToken) {
    let mut sub = broker.subscribe();
    let tick = ctx.config.dispatcher_tick;
    let lease_sweep_interval = ctx.config.lease_sweep_interval;

    let mut lease_timer = tokio::time::interval(lease_sweep_interval);
    lease_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    process_all_due_tasks(&ctx).await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("dispatcher loop cancelled, draining in-flight work");
                return;
            }
            event = sub.recv() => {
                match event {
                    Some(ChangeEvent::DbChanged) | Some(ChangeEvent::WatcherError) => {
                        process_all_due_tasks(&ctx).await;
                    }
                    None => {
                        // Broker dropped; fall back to the safety-net timer only.
                        tokio::time::sleep(tick).await;
                        process_all_due_tasks(&ctx).await;
                    }
                }
            }
            _ = tokio::time::sleep(tick) => {
                process_all_due_tasks(&ctx).await;
            }
            _ = lease_timer.tick() => {
                if let Ok(swept) = ctx.scheduler.sweep_expired_leases(&ctx.pool).await {
                    if swept > 0 {
                        tracing::warn!(swept, "lease sweep returned stuck tasks to pending");
                    }
                }
            }
        }
    }
}

/// Pop and run every currently-claimable task, one at a time, until the
/// queue has nothing left to claim.
async fn process_all_due_tasks(ctx: &HandlerContext) {
    loop {
        let claimed = match ctx.scheduler.claim_next(&ctx.pool).await {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(err) => {
                tracing::error!(?err, "failed to claim next scheduled task");
                return;
            }
        };

        let task_id = claimed.id.clone();
        match handlers::dispatch(ctx, &claimed).await {
            Ok(()) => {
                if let Err(err) = ctx.scheduler.complete(&ctx.pool, &task_id).await {
                    tracing::error!(?err, task_id, "failed to mark scheduled task completed");
                }
            }
            Err(err) => {
                tracing::error!(?err, task_id, kind = %claimed.kind, "handler failed");
                if err.is_retryable() {
                    if let Err(inner) = ctx.scheduler.fail_attempt(&ctx.pool, &task_id, &err.to_string()).await {
                        tracing::error!(?inner, task_id, "failed to record retry attempt");
                    }
                } else if let Err(inner) = ctx.scheduler.fail_permanently(&ctx.pool, &task_id, &err.to_string()).await {
                    tracing::error!(?inner, task_id, "failed to record permanent failure");
                }
            }
        }
    }
}

/// Reset tasks left `processing` by a crashed control plane back to
/// `pending`, and return the count for the caller to log.
pub async fn recover_orphaned_tasks(pool: &sqlx::SqlitePool) -> anyhow::Result<u64> {
    dockmaster_db::queries::tasks::reset_orphaned_tasks(pool).await
}

/// Convenience for callers (the CLI entry point) that want a bounded
/// "drain and exit" run rather than an indefinite loop -- used by tests
/// and by `control --root` itself before entering the long-lived loop.
pub async fn drain_once(ctx: &HandlerContext) {
    process_all_due_tasks(ctx).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_context;
    use dockmaster_db::models::ScheduledTaskKind;
    use dockmaster_test_utils::create_in_memory_db;

    #[tokio::test]
    async fn drains_a_single_due_task_to_completion() {
        let pool = create_in_memory_db().await;
        dockmaster_db::queries::works::insert_work(&pool, "w-1", "worker", "bead-1", "feat/x", "main", true)
            .await
            .unwrap();

        let ctx = test_context(pool.clone());
        ctx.scheduler
            .schedule_now(&pool, "w-1", ScheduledTaskKind::GithubComment, serde_json::json!({"pr_url": "u", "body": "b"}), None)
            .await
            .unwrap();

        drain_once(&ctx).await;

        let pending = ctx.scheduler.list_by_status(&pool, ScheduledTaskStatus::Pending).await.unwrap();
        assert!(pending.is_empty());
        let completed = ctx.scheduler.list_by_status(&pool, ScheduledTaskStatus::Completed).await.unwrap();
        assert_eq!(completed.len(), 1);
    }

    #[tokio::test]
    async fn invariant_violation_exhausts_attempts_without_retry_delay() {
        let pool = create_in_memory_db().await;
        dockmaster_db::queries::works::insert_work(&pool, "w-1", "worker", "bead-1", "feat/x", "main", true)
            .await
            .unwrap();

        let ctx = test_context(pool.clone());
        ctx.scheduler
            .schedule_now(&pool, "w-1", ScheduledTaskKind::GithubComment, serde_json::json!({}), None)
            .await
            .unwrap();

        drain_once(&ctx).await;

        let failed = ctx.scheduler.list_by_status(&pool, ScheduledTaskStatus::Failed).await.unwrap();
        assert_eq!(failed.len(), 1);
    }
}
