//! Shared fakes for handler/orchestrator unit tests.
//!
//! Every collaborator trait gets one "does nothing, returns a benign
//! default" implementation here so individual tests only need to
//! override the one collaborator they actually care about, the way
//! `gator-core`'s `NoopHarness` stands in for a real agent harness.

#![cfg(test)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::collaborators::issue_tracker::Bead;
use crate::collaborators::pr_host::PrSnapshot;
use crate::collaborators::vcs::MergeOutcome;
use crate::collaborators::{AgentOutcome, AgentRunner, IssueTracker, Multiplexer, PrHost, Vcs};
use crate::config::CoreConfig;
use crate::handlers::HandlerContext;
use crate::scheduler::Scheduler;

pub struct NoopVcs;

#[async_trait]
impl Vcs for NoopVcs {
    async fn create_worktree(
        &self,
        work_id: &str,
        _branch: &str,
        _base_branch: &str,
        _use_existing_branch: bool,
    ) -> crate::collaborators::vcs::Result<PathBuf> {
        Ok(PathBuf::from(format!("/tmp/{work_id}/tree")))
    }
    async fn remove_worktree(&self, _path: &Path) -> crate::collaborators::vcs::Result<()> {
        Ok(())
    }
    async fn push_set_upstream(&self, _worktree_path: &Path, _branch: &str) -> crate::collaborators::vcs::Result<()> {
        Ok(())
    }
    async fn validate_existing_branch(&self, _branch: &str) -> crate::collaborators::vcs::Result<bool> {
        Ok(true)
    }
    async fn has_commits_ahead(&self, _branch: &str, _base_branch: &str) -> crate::collaborators::vcs::Result<bool> {
        Ok(false)
    }
    async fn merge_branch(&self, _branch: &str) -> crate::collaborators::vcs::Result<MergeOutcome> {
        Ok(MergeOutcome::Success)
    }
    async fn delete_branch(&self, _branch: &str) -> crate::collaborators::vcs::Result<()> {
        Ok(())
    }
}

pub struct NoopIssueTracker;

#[async_trait]
impl IssueTracker for NoopIssueTracker {
    async fn get_bead(&self, _id: &str) -> anyhow::Result<Option<Bead>> {
        Ok(None)
    }
    async fn get_bead_with_children(&self, _id: &str) -> anyhow::Result<Vec<Bead>> {
        Ok(vec![])
    }
    async fn get_beads_with_deps(&self, _ids: &[String]) -> anyhow::Result<Vec<Bead>> {
        Ok(vec![])
    }
    async fn close(&self, _id: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn create_child_bead(&self, parent_id: &str, title: &str, external_ref: Option<&str>) -> anyhow::Result<Bead> {
        Ok(Bead {
            id: format!("{parent_id}-child"),
            title: title.to_string(),
            status: crate::collaborators::issue_tracker::BeadStatus::Open,
            depends_on: vec![],
            external_ref: external_ref.map(|s| s.to_string()),
        })
    }
    async fn flush_cache(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct NoopPrHost;

#[async_trait]
impl PrHost for NoopPrHost {
    async fn create_pr_in_dir(&self, _worktree_path: &Path, _title: &str, _body: &str) -> crate::collaborators::pr_host::Result<String> {
        Ok("https://example.invalid/pr/1".to_string())
    }
    async fn merge_pr_in_dir(&self, _worktree_path: &Path) -> crate::collaborators::pr_host::Result<()> {
        Ok(())
    }
    async fn fetch_snapshot(&self, _pr_url: &str) -> crate::collaborators::pr_host::Result<PrSnapshot> {
        Ok(PrSnapshot {
            pr_state: "open".to_string(),
            ci_status: Some("success".to_string()),
            approval_status: Some("approved".to_string()),
            unresolved_threads: vec![],
        })
    }
    async fn comment(&self, _pr_url: &str, _body: &str) -> crate::collaborators::pr_host::Result<()> {
        Ok(())
    }
    async fn resolve_thread(&self, _pr_url: &str, _thread_id: &str) -> crate::collaborators::pr_host::Result<()> {
        Ok(())
    }
}

pub struct NoopMultiplexer;

#[async_trait]
impl Multiplexer for NoopMultiplexer {
    async fn ensure_session(&self, _session: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn create_tab(&self, _session: &str, _tab: &str, _command: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn switch_to_tab(&self, _session: &str, _tab: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn tab_exists(&self, _session: &str, _tab: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
    async fn execute_command(&self, _session: &str, _tab: &str, _command: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn terminate_and_close_tab(&self, _session: &str, _tab: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn send_ctrl_c(&self, _session: &str, _tab: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct NoopAgentRunner;

#[async_trait]
impl AgentRunner for NoopAgentRunner {
    async fn run(&self, _task_id: &str, _prompt: &str, _cwd: &Path) -> anyhow::Result<AgentOutcome> {
        Ok(AgentOutcome::Success)
    }
}

/// Build a [`HandlerContext`] wired to an in-memory pool and every Noop
/// collaborator. Tests that need a specific collaborator to do something
/// real override that one field (the rest stay `pub` so this is just a
/// struct update).
pub fn test_context(pool: SqlitePool) -> HandlerContext {
    HandlerContext {
        pool,
        scheduler: Arc::new(Scheduler::new(CoreConfig::default())),
        config: CoreConfig::default(),
        issue_tracker: Arc::new(NoopIssueTracker),
        vcs: Arc::new(NoopVcs),
        pr_host: Arc::new(NoopPrHost),
        multiplexer: Arc::new(NoopMultiplexer),
        agent_runner: Arc::new(NoopAgentRunner),
        project_root: PathBuf::from("/tmp/project"),
    }
}
