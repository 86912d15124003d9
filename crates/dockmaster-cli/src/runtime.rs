//! Wiring for a fully-assembled [`HandlerContext`]: one SQLite pool, one
//! set of concrete collaborator adapters, shared by every subcommand that
//! touches the durable store.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use dockmaster_core::collaborators::{AgentRunner, IssueTracker, Multiplexer, PrHost, Vcs};
use dockmaster_core::{CoreConfig, HandlerContext, Scheduler};

use crate::collaborators::{BeadsIssueTracker, ClaudeAgentRunner, GhPrHost, GitVcs, TmuxMultiplexer};
use crate::config::DockmasterConfig;

/// Open the project's database, run migrations, and build a
/// [`HandlerContext`] wired to real collaborators (git, tmux, gh, beads,
/// claude).
pub async fn build_context(config: &DockmasterConfig) -> Result<HandlerContext> {
    let pool = open_pool(config).await?;
    Ok(assemble(config, pool))
}

/// Open and migrate the project database without building a full context.
/// Used by commands (e.g. `work list`) that only need the pool.
pub async fn open_pool(config: &DockmasterConfig) -> Result<SqlitePool> {
    let pool = dockmaster_db::create_pool(&config.db_config)
        .await
        .context("failed to open control-plane database")?;
    dockmaster_db::run_migrations(&pool, dockmaster_db::default_migrations_path())
        .await
        .context("failed to run control-plane migrations")?;
    Ok(pool)
}

/// Wire a [`HandlerContext`] around an already-open pool.
pub fn assemble(config: &DockmasterConfig, pool: SqlitePool) -> HandlerContext {
    let beads_db_path = config.beads_db_path();
    let issue_tracker: Arc<dyn IssueTracker> = Arc::new(LazyBeadsIssueTracker::new(beads_db_path));
    let vcs: Arc<dyn Vcs> = Arc::new(GitVcs::new(config.main_checkout()));
    let pr_host: Arc<dyn PrHost> = Arc::new(GhPrHost::new());
    let multiplexer: Arc<dyn Multiplexer> = Arc::new(TmuxMultiplexer::new());
    let agent_runner: Arc<dyn AgentRunner> = Arc::new(ClaudeAgentRunner::new());

    HandlerContext {
        pool,
        scheduler: Arc::new(Scheduler::new(CoreConfig::default())),
        config: CoreConfig::default(),
        issue_tracker,
        vcs,
        pr_host,
        multiplexer,
        agent_runner,
        project_root: config.project_root.clone(),
    }
}

/// `BeadsIssueTracker` connects eagerly; handlers are built before we know
/// whether any given command actually touches the issue tracker, so this
/// wrapper defers the connection attempt to first use instead of failing
/// every command when `beads.db` doesn't exist yet (a brand-new project
/// before its first `work create`).
struct LazyBeadsIssueTracker {
    beads_db_path: std::path::PathBuf,
    inner: tokio::sync::OnceCell<BeadsIssueTracker>,
}

impl LazyBeadsIssueTracker {
    fn new(beads_db_path: std::path::PathBuf) -> Self {
        Self {
            beads_db_path,
            inner: tokio::sync::OnceCell::new(),
        }
    }

    async fn get(&self) -> Result<&BeadsIssueTracker> {
        self.inner
            .get_or_try_init(|| BeadsIssueTracker::connect(&self.beads_db_path))
            .await
    }
}

#[async_trait::async_trait]
impl IssueTracker for LazyBeadsIssueTracker {
    async fn get_bead(&self, id: &str) -> Result<Option<dockmaster_core::collaborators::Bead>> {
        self.get().await?.get_bead(id).await
    }

    async fn get_bead_with_children(&self, id: &str) -> Result<Vec<dockmaster_core::collaborators::Bead>> {
        self.get().await?.get_bead_with_children(id).await
    }

    async fn get_beads_with_deps(&self, ids: &[String]) -> Result<Vec<dockmaster_core::collaborators::Bead>> {
        self.get().await?.get_beads_with_deps(ids).await
    }

    async fn close(&self, id: &str) -> Result<()> {
        self.get().await?.close(id).await
    }

    async fn create_child_bead(
        &self,
        parent_id: &str,
        title: &str,
        external_ref: Option<&str>,
    ) -> Result<dockmaster_core::collaborators::Bead> {
        self.get().await?.create_child_bead(parent_id, title, external_ref).await
    }

    async fn flush_cache(&self) -> Result<()> {
        self.get().await?.flush_cache().await
    }
}
