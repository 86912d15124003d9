//! Scheduler (C3): policy layer above the durable queue's raw ops.
//!
//! `dockmaster_db::queries::scheduled_tasks` already implements the
//! mechanical pieces (atomic claim, backoff math, lease sweep); this
//! module is the thin policy wrapper C4 and C5 call through, so retry and
//! lease behavior are configured in one place ([`CoreConfig`]) instead of
//! scattered across callers. Grounded on `gator-core`'s `state::dispatch`
//! module, which plays the same "semantic wrapper over raw transitions"
//! role for its tasks.

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;

use dockmaster_db::models::{ScheduledTask, ScheduledTaskKind, ScheduledTaskStatus};
use dockmaster_db::queries::scheduled_tasks as db;

use crate::config::CoreConfig;

/// Policy layer above the scheduled-task queue.
pub struct Scheduler {
    config: CoreConfig,
}

impl Scheduler {
    pub fn new(config: CoreConfig) -> Self {
        Self { config }
    }

    /// Schedule a task to run at `scheduled_at`, deduping on
    /// `idempotency_key` when present.
    pub async fn schedule(
        &self,
        pool: &SqlitePool,
        work_id: &str,
        kind: ScheduledTaskKind,
        scheduled_at: DateTime<Utc>,
        metadata: serde_json::Value,
        idempotency_key: Option<&str>,
    ) -> Result<Option<ScheduledTask>> {
        db::enqueue(pool, work_id, kind, scheduled_at, metadata, idempotency_key).await
    }

    /// Schedule a task to run immediately.
    pub async fn schedule_now(
        &self,
        pool: &SqlitePool,
        work_id: &str,
        kind: ScheduledTaskKind,
        metadata: serde_json::Value,
        idempotency_key: Option<&str>,
    ) -> Result<Option<ScheduledTask>> {
        self.schedule(pool, work_id, kind, Utc::now(), metadata, idempotency_key).await
    }

    /// Claim the next due task, atomically flipping it to `executing`.
    pub async fn claim_next(&self, pool: &SqlitePool) -> Result<Option<ScheduledTask>> {
        db::claim_due_scheduled_task(pool).await
    }

    /// Mark a claimed task completed.
    pub async fn complete(&self, pool: &SqlitePool, id: &str) -> Result<()> {
        db::complete(pool, id).await
    }

    /// Record a handler failure. Reschedules with exponential backoff
    /// while attempts remain, otherwise marks permanently failed.
    ///
    /// `dockmaster_db`'s `fail_attempt` already owns the backoff formula
    /// (base 30s, doubling, capped at 1h) to keep it colocated with the
    /// row it mutates; this wrapper exists so callers go through one
    /// `Scheduler` API regardless of which layer owns the arithmetic.
    pub async fn fail_attempt(&self, pool: &SqlitePool, id: &str, error_message: &str) -> Result<()> {
        db::fail_attempt(pool, id, error_message).await
    }

    /// Mark a scheduled task permanently failed, skipping the backoff
    /// schedule. Used when the handler classified its error as
    /// non-retryable -- retrying would just waste a backoff window.
    pub async fn fail_permanently(&self, pool: &SqlitePool, id: &str, error_message: &str) -> Result<()> {
        db::fail_permanently(pool, id, error_message).await
    }

    /// Sweep leases that have been `executing` longer than the configured
    /// timeout back to `pending`.
    pub async fn sweep_expired_leases(&self, pool: &SqlitePool) -> Result<u64> {
        let timeout = ChronoDuration::from_std(self.config.lease_timeout)
            .unwrap_or_else(|_| ChronoDuration::seconds(60));
        db::sweep_expired_leases(pool, timeout).await
    }

    pub async fn get(&self, pool: &SqlitePool, id: &str) -> Result<Option<ScheduledTask>> {
        db::get(pool, id).await
    }

    pub async fn list_for_work(&self, pool: &SqlitePool, work_id: &str) -> Result<Vec<ScheduledTask>> {
        db::list_for_work(pool, work_id).await
    }

    pub async fn list_by_status(&self, pool: &SqlitePool, status: ScheduledTaskStatus) -> Result<Vec<ScheduledTask>> {
        db::list_by_status(pool, status).await
    }

    /// Cancel all non-terminal scheduled tasks for a work (destroy/restart).
    pub async fn cancel_pending_for_work(&self, pool: &SqlitePool, work_id: &str) -> Result<u64> {
        db::cancel_pending_for_work(pool, work_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockmaster_test_utils::create_in_memory_db;

    async fn seed_work(pool: &SqlitePool, id: &str) {
        dockmaster_db::queries::works::insert_work(pool, id, "worker", "bead-1", "feat/x", "main", true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn schedule_now_is_immediately_claimable() {
        let pool = create_in_memory_db().await;
        seed_work(&pool, "w-1").await;
        let scheduler = Scheduler::new(CoreConfig::default());

        scheduler
            .schedule_now(&pool, "w-1", ScheduledTaskKind::CreateWorktree, serde_json::json!({}), None)
            .await
            .unwrap();

        let claimed = scheduler.claim_next(&pool).await.unwrap();
        assert!(claimed.is_some());
        assert_eq!(claimed.unwrap().status, ScheduledTaskStatus::Executing);
    }

    #[tokio::test]
    async fn idempotency_key_dedupes_while_pending() {
        let pool = create_in_memory_db().await;
        seed_work(&pool, "w-1").await;
        let scheduler = Scheduler::new(CoreConfig::default());

        let first = scheduler
            .schedule_now(
                &pool,
                "w-1",
                ScheduledTaskKind::DestroyWorktree,
                serde_json::json!({}),
                Some("destroy-worktree-w-1"),
            )
            .await
            .unwrap()
            .unwrap();

        let second = scheduler
            .schedule_now(
                &pool,
                "w-1",
                ScheduledTaskKind::DestroyWorktree,
                serde_json::json!({}),
                Some("destroy-worktree-w-1"),
            )
            .await
            .unwrap();

        let second = second.expect("idempotency collision should return the existing row, not None");
        assert_eq!(second.id, first.id, "duplicate schedule must yield the existing row's id");
        assert_eq!(
            scheduler.list_for_work(&pool, "w-1").await.unwrap().len(),
            1,
            "duplicate schedule must not create a second row"
        );
    }

    #[tokio::test]
    async fn fail_attempt_reschedules_with_backoff_then_gives_up() {
        let pool = create_in_memory_db().await;
        seed_work(&pool, "w-1").await;
        let scheduler = Scheduler::new(CoreConfig::default());

        let task = scheduler
            .schedule_now(&pool, "w-1", ScheduledTaskKind::GitPush, serde_json::json!({}), None)
            .await
            .unwrap()
            .unwrap();

        // max_attempts defaults to 5 in the schema; drive it to exhaustion.
        for _ in 0..5 {
            let claimed = scheduler.claim_next(&pool).await.unwrap().unwrap();
            scheduler.fail_attempt(&pool, &claimed.id, "transient").await.unwrap();
        }

        let final_row = scheduler.get(&pool, &task.id).await.unwrap().unwrap();
        assert_eq!(final_row.status, ScheduledTaskStatus::Failed);
    }

    #[tokio::test]
    async fn sweep_returns_stuck_executing_rows_to_pending() {
        let pool = create_in_memory_db().await;
        seed_work(&pool, "w-1").await;
        let mut config = CoreConfig::default();
        config.lease_timeout = std::time::Duration::from_secs(0);
        let scheduler = Scheduler::new(config);

        scheduler
            .schedule_now(&pool, "w-1", ScheduledTaskKind::PrFeedback, serde_json::json!({}), None)
            .await
            .unwrap();
        scheduler.claim_next(&pool).await.unwrap();

        let swept = scheduler.sweep_expired_leases(&pool).await.unwrap();
        assert_eq!(swept, 1);

        let rows = scheduler.list_by_status(&pool, ScheduledTaskStatus::Pending).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
