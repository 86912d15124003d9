//! Issue-tracker client interface.
//!
//! The external issue tracker (a separate `beads.db` inside the project's
//! `main/` checkout) is the source of truth for bead content and
//! dependency edges. This system only ever reads it, except for creating
//! child beads when a reviewer files findings.

use anyhow::Result;
use async_trait::async_trait;

/// Workability of a bead, as reported by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeadStatus {
    Open,
    InProgress,
    Blocked,
    Done,
    WontDo,
}

/// A tracked issue.
#[derive(Debug, Clone)]
pub struct Bead {
    pub id: String,
    pub title: String,
    pub status: BeadStatus,
    /// Ids of beads this bead depends on (must complete first).
    pub depends_on: Vec<String>,
    /// If this bead was filed by a reviewer, the review task it came from,
    /// formatted as `review-<task_id>`.
    pub external_ref: Option<String>,
}

/// Client interface for the external issue tracker.
///
/// Object-safe by construction: every method returns an owned value or a
/// boxed future via `async_trait`, so callers can hold `Arc<dyn
/// IssueTracker>`.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Fetch a single bead by id.
    async fn get_bead(&self, id: &str) -> Result<Option<Bead>>;

    /// Fetch a bead along with all of its descendant (child) beads.
    async fn get_bead_with_children(&self, id: &str) -> Result<Vec<Bead>>;

    /// Fetch several beads along with their dependency edges in one call.
    async fn get_beads_with_deps(&self, ids: &[String]) -> Result<Vec<Bead>>;

    /// Mark a bead closed (used after its owning work completes).
    async fn close(&self, id: &str) -> Result<()>;

    /// File a new child bead under `parent_id`, tagged with `external_ref`
    /// (e.g. `review-<task_id>` or `comment-<thread_id>`) so the
    /// orchestrator can later recognize which task produced it.
    async fn create_child_bead(&self, parent_id: &str, title: &str, external_ref: Option<&str>) -> Result<Bead>;

    /// Whether a status represents a bead the orchestrator can act on.
    fn is_workable_status(&self, status: BeadStatus) -> bool {
        matches!(status, BeadStatus::Open | BeadStatus::InProgress)
    }

    /// Invalidate any local cache so the next read reflects recent writes
    /// made by another process (e.g. the agent filing a child bead).
    async fn flush_cache(&self) -> Result<()>;
}
