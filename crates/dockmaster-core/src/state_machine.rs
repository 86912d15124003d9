//! Work state machine (C6): validates and executes Work status transitions.
//!
//! Grounded on `gator-core`'s `TaskStateMachine`, adapted from task-level
//! transitions (assigned/running/checking) to the work-level graph:
//!
//! ```text
//! pending    -> processing
//! processing -> idle
//! processing -> failed
//! idle       -> processing
//! idle       -> completed
//! failed     -> pending    (explicit restart)
//! ```
//!
//! `C6` is the sole writer of Work status; handlers and the orchestrator
//! request transitions through here rather than writing `works.status`
//! directly.

use anyhow::{bail, Context, Result};
use sqlx::SqlitePool;

use dockmaster_db::models::WorkStatus;
use dockmaster_db::queries::works as db;

/// The work state machine.
pub struct WorkStateMachine;

impl WorkStateMachine {
    /// Whether `from -> to` is a legal edge in the work status graph.
    pub fn is_valid_transition(from: WorkStatus, to: WorkStatus) -> bool {
        matches!(
            (from, to),
            (WorkStatus::Pending, WorkStatus::Processing)
                | (WorkStatus::Processing, WorkStatus::Idle)
                | (WorkStatus::Processing, WorkStatus::Failed)
                | (WorkStatus::Idle, WorkStatus::Processing)
                | (WorkStatus::Idle, WorkStatus::Completed)
                | (WorkStatus::Failed, WorkStatus::Pending)
        )
    }

    /// Execute a transition with optimistic locking.
    ///
    /// Returns an error if the edge is invalid, the work doesn't exist, or
    /// a concurrent writer already moved it out of `from`.
    pub async fn transition(pool: &SqlitePool, work_id: &str, from: WorkStatus, to: WorkStatus) -> Result<()> {
        if !Self::is_valid_transition(from, to) {
            bail!("invalid work status transition: {from} -> {to} for work {work_id}");
        }

        let ok = db::transition_work_status(pool, work_id, from, to)
            .await
            .with_context(|| format!("failed to transition work {work_id} from {from} to {to}"))?;

        if !ok {
            let work = db::get_work(pool, work_id).await?;
            match work {
                None => bail!("work {work_id} not found"),
                Some(w) => bail!(
                    "optimistic lock failed: work {work_id} has status {}, expected {from}",
                    w.status
                ),
            }
        }

        if to == WorkStatus::Processing && from == WorkStatus::Pending {
            db::mark_started(pool, work_id).await?;
        }
        if to == WorkStatus::Completed {
            db::mark_completed(pool, work_id).await?;
        }

        Ok(())
    }

    /// `pending -> processing`: the first task has been handed to the
    /// orchestrator.
    pub async fn start_processing(pool: &SqlitePool, work_id: &str) -> Result<()> {
        Self::transition(pool, work_id, WorkStatus::Pending, WorkStatus::Processing).await
    }

    /// `processing -> idle`: observed an empty pending-task set after the
    /// mutation that produced it settled. Callers must re-check the
    /// pending set at call time -- a task completing concurrently with a
    /// new task being added must leave the work `processing`.
    pub async fn go_idle(pool: &SqlitePool, work_id: &str) -> Result<()> {
        Self::transition(pool, work_id, WorkStatus::Processing, WorkStatus::Idle).await
    }

    /// `idle -> processing`: new tasks were planned for an idle work
    /// (reviewer found issues, user added beads).
    pub async fn resume_processing(pool: &SqlitePool, work_id: &str) -> Result<()> {
        Self::transition(pool, work_id, WorkStatus::Idle, WorkStatus::Processing).await
    }

    /// `processing -> failed`: any task failed; the orchestrator halts.
    /// Unlike the other edges this also records the error message, so it
    /// bypasses the plain optimistic-lock transition in favor of
    /// `fail_work`, which sets status and message together.
    pub async fn fail(pool: &SqlitePool, work_id: &str, error_message: &str) -> Result<()> {
        let work = db::get_work(pool, work_id)
            .await?
            .with_context(|| format!("work {work_id} not found"))?;
        if !Self::is_valid_transition(work.status, WorkStatus::Failed) {
            bail!("invalid work status transition: {} -> failed for work {work_id}", work.status);
        }
        db::fail_work(pool, work_id, error_message).await
    }

    /// `failed -> pending`: explicit operator restart.
    pub async fn restart(pool: &SqlitePool, work_id: &str) -> Result<()> {
        Self::transition(pool, work_id, WorkStatus::Failed, WorkStatus::Pending).await
    }

    /// `idle -> completed`: explicit complete, used after PR merge.
    pub async fn complete(pool: &SqlitePool, work_id: &str) -> Result<()> {
        Self::transition(pool, work_id, WorkStatus::Idle, WorkStatus::Completed).await
    }
}
