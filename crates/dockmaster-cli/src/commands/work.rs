//! `dock work ...`: operator-facing commands over the Work lifecycle.
//!
//! Every mutating command here only ever touches the durable store and
//! schedules follow-on work for the control plane's dispatcher to pick
//! up -- none of them talk to git/tmux/gh/beads directly, mirroring the
//! teacher's split between CLI commands (thin wrappers over queries) and
//! handlers (the only code that calls out to collaborators).

use std::io::Write as _;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use dockmaster_core::collaborators::IssueTracker;
use dockmaster_core::id;
use dockmaster_core::state_machine::WorkStateMachine;
use dockmaster_core::HandlerContext;
use dockmaster_db::models::{ScheduledTaskKind, TaskKind, Work, WorkStatus};
use dockmaster_db::queries::{tasks as task_db, works as work_db};

use crate::config::DockmasterConfig;

#[derive(Subcommand)]
pub enum WorkCommands {
    /// Create a new Work from a tracked issue.
    Create {
        /// Bead id to build the Work around.
        issue_id: String,
        /// Let the orchestrator auto-chain implement/review/pr without
        /// pausing for operator sign-off between tasks.
        #[arg(long)]
        auto: bool,
        /// Explicit branch name (defaults to a slug of the bead title).
        #[arg(long)]
        branch: Option<String>,
        /// Attach to an already-existing branch instead of creating one.
        #[arg(long)]
        from_branch: Option<String>,
        /// Base branch to branch from / compare against.
        #[arg(long, default_value = "main")]
        base: String,
        /// Skip the confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Assign additional beads to a Work.
    Add {
        /// Bead ids to assign.
        issue_ids: Vec<String>,
        /// Work to assign them to (defaults to the sole active Work, if
        /// there is exactly one).
        #[arg(long)]
        work: Option<String>,
    },
    /// Unassign beads from a Work.
    Remove {
        /// Bead ids to unassign.
        issue_ids: Vec<String>,
        #[arg(long)]
        work: Option<String>,
    },
    /// Show a Work's detail, or list all Works if no id is given.
    Show { id: Option<String> },
    /// List every Work.
    List,
    /// Permanently tear down a Work: tmux tab, worktree, and every row
    /// referencing it.
    Destroy {
        id: String,
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Return a `failed` Work to `pending` and re-drive it.
    Restart { id: Option<String> },
    /// Mark an `idle` Work `completed`.
    Complete { id: Option<String> },
    /// Manually enqueue a `pr` task for a Work.
    Pr { id: Option<String> },
    /// Manually enqueue a `review` task for a Work.
    Review {
        id: Option<String>,
        /// Let the orchestrator auto-chain off this review, same as a
        /// review it scheduled itself.
        #[arg(long)]
        auto: bool,
    },
    /// Switch the multiplexer to a Work's tab.
    Console { id: Option<String> },
    /// Launch (or resume) the coding agent interactively in a Work's tab.
    Claude { id: Option<String> },
}

#[derive(Args)]
pub struct WorkArgs {
    #[command(subcommand)]
    pub command: WorkCommands,
}

pub async fn run(ctx: &HandlerContext, config: &DockmasterConfig, command: WorkCommands) -> Result<()> {
    match command {
        WorkCommands::Create { issue_id, auto, branch, from_branch, base, yes } => {
            cmd_create(ctx, &issue_id, auto, branch, from_branch, &base, yes).await
        }
        WorkCommands::Add { issue_ids, work } => cmd_add(ctx, &issue_ids, work.as_deref()).await,
        WorkCommands::Remove { issue_ids, work } => cmd_remove(ctx, &issue_ids, work.as_deref()).await,
        WorkCommands::Show { id } => cmd_show(ctx, id.as_deref()).await,
        WorkCommands::List => cmd_list(ctx).await,
        WorkCommands::Destroy { id, yes } => cmd_destroy(ctx, &id, yes).await,
        WorkCommands::Restart { id } => cmd_restart(ctx, id.as_deref()).await,
        WorkCommands::Complete { id } => cmd_complete(ctx, id.as_deref()).await,
        WorkCommands::Pr { id } => cmd_pr(ctx, id.as_deref()).await,
        WorkCommands::Review { id, auto } => cmd_review(ctx, id.as_deref(), auto).await,
        WorkCommands::Console { id } => cmd_console(ctx, config, id.as_deref()).await,
        WorkCommands::Claude { id } => cmd_claude(ctx, config, id.as_deref()).await,
    }
}

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
async fn cmd_create(
    ctx: &HandlerContext,
    issue_id: &str,
    auto: bool,
    branch: Option<String>,
    from_branch: Option<String>,
    base: &str,
    yes: bool,
) -> Result<()> {
    let bead = ctx
        .issue_tracker
        .get_bead(issue_id)
        .await?
        .with_context(|| format!("no such bead {issue_id}"))?;

    let use_existing_branch = from_branch.is_some();
    let branch_name = from_branch
        .or(branch)
        .unwrap_or_else(|| format!("feat/{}", slugify(&bead.title)));

    let work_id = id::work_id(&ctx.project_root.to_string_lossy(), &branch_name);

    if let Some(existing) = work_db::get_work(&ctx.pool, &work_id).await? {
        println!("Work {} already exists for branch {} (status {}).", existing.id, existing.branch_name, existing.status);
        return Ok(());
    }

    if !yes
        && !confirm(&format!(
            "Create work {work_id} for bead {issue_id} on branch {branch_name} (base {base})?"
        ))?
    {
        println!("Aborted.");
        return Ok(());
    }

    work_db::insert_work(&ctx.pool, &work_id, "agent", issue_id, &branch_name, base, auto).await?;
    work_db::add_work_bead(&ctx.pool, &work_id, issue_id).await?;

    ctx.scheduler
        .schedule_now(
            &ctx.pool,
            &work_id,
            ScheduledTaskKind::CreateWorktree,
            serde_json::json!({
                "branch": branch_name,
                "base_branch": base,
                "worker_name": "agent",
                "use_existing_branch": use_existing_branch,
            }),
            Some(&format!("create-worktree-{work_id}")),
        )
        .await?;

    println!("Created work {work_id} (branch {branch_name}).");
    Ok(())
}

/// Lowercase, hyphen-join a bead title into a branch-safe slug.
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_dash = true;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

// ---------------------------------------------------------------------------
// add / remove
// ---------------------------------------------------------------------------

async fn cmd_add(ctx: &HandlerContext, issue_ids: &[String], work_id: Option<&str>) -> Result<()> {
    let work_id = resolve_work_id(ctx, work_id).await?;
    for issue_id in issue_ids {
        work_db::add_work_bead(&ctx.pool, &work_id, issue_id).await?;
    }
    println!("Assigned {} bead(s) to {work_id}.", issue_ids.len());
    Ok(())
}

async fn cmd_remove(ctx: &HandlerContext, issue_ids: &[String], work_id: Option<&str>) -> Result<()> {
    let work_id = resolve_work_id(ctx, work_id).await?;
    for issue_id in issue_ids {
        work_db::remove_work_bead(&ctx.pool, &work_id, issue_id).await?;
    }
    println!("Unassigned {} bead(s) from {work_id}.", issue_ids.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// show / list
// ---------------------------------------------------------------------------

async fn cmd_show(ctx: &HandlerContext, id: Option<&str>) -> Result<()> {
    match id {
        Some(id) => show_one(ctx, id).await,
        None => cmd_list(ctx).await,
    }
}

async fn show_one(ctx: &HandlerContext, id: &str) -> Result<()> {
    let work = work_db::get_work(&ctx.pool, id).await?.with_context(|| format!("work {id} not found"))?;
    print_work_detail(&work);

    let tasks = task_db::list_tasks_for_work(&ctx.pool, id).await?;
    println!("\nTasks:");
    if tasks.is_empty() {
        println!("  (none yet)");
    }
    for task in &tasks {
        println!("  {} [{}] {}", task.id, task.status, task.kind);
        if let Some(err) = &task.error_message {
            println!("      error: {err}");
        }
    }
    Ok(())
}

fn print_work_detail(work: &Work) {
    println!("Work: {}", work.id);
    println!("  bead:          {}", work.root_issue_id);
    println!("  branch:        {} (base {})", work.branch_name, work.base_branch);
    println!("  status:        {}", work.status);
    if let Some(path) = &work.worktree_path {
        println!("  worktree:      {path}");
    }
    if let Some(url) = &work.pr_url {
        println!("  pr:            {url}");
        if let Some(state) = &work.pr_state {
            println!("  pr state:      {state}");
        }
        if let Some(ci) = &work.ci_status {
            println!("  ci:            {ci}");
        }
        if let Some(approval) = &work.approval_status {
            println!("  approval:      {approval}");
        }
    }
    if let Some(err) = &work.error_message {
        println!("  error:         {err}");
    }
    println!("  created:       {}", work.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
}

async fn cmd_list(ctx: &HandlerContext) -> Result<()> {
    let works = work_db::list_works(&ctx.pool).await?;
    if works.is_empty() {
        println!("No works found.");
        return Ok(());
    }

    println!("{:<12} {:<28} {:<12} {}", "ID", "BRANCH", "STATUS", "PR");
    println!("{}", "-".repeat(72));
    for work in &works {
        println!(
            "{:<12} {:<28} {:<12} {}",
            work.id,
            work.branch_name,
            work.status,
            work.pr_url.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// destroy / restart / complete
// ---------------------------------------------------------------------------

async fn cmd_destroy(ctx: &HandlerContext, id: &str, yes: bool) -> Result<()> {
    work_db::get_work(&ctx.pool, id).await?.with_context(|| format!("work {id} not found"))?;

    if !yes && !confirm(&format!("Destroy work {id} and everything under it?"))? {
        println!("Aborted.");
        return Ok(());
    }

    ctx.scheduler.cancel_pending_for_work(&ctx.pool, id).await?;
    ctx.scheduler
        .schedule_now(
            &ctx.pool,
            id,
            ScheduledTaskKind::DestroyWorktree,
            serde_json::json!({}),
            Some(&format!("destroy-worktree-{id}")),
        )
        .await?;

    println!("Destroy scheduled for {id}.");
    Ok(())
}

async fn cmd_restart(ctx: &HandlerContext, id: Option<&str>) -> Result<()> {
    let id = resolve_work_id(ctx, id).await?;
    let work = work_db::get_work(&ctx.pool, &id).await?.with_context(|| format!("work {id} not found"))?;

    if work.status != WorkStatus::Failed {
        bail!("work {id} is {}, only a failed work can be restarted", work.status);
    }

    WorkStateMachine::restart(&ctx.pool, &id).await?;

    ctx.scheduler
        .schedule_now(
            &ctx.pool,
            &id,
            ScheduledTaskKind::CreateWorktree,
            serde_json::json!({
                "branch": work.branch_name,
                "base_branch": work.base_branch,
                "worker_name": work.worker_name,
            }),
            None,
        )
        .await?;

    println!("Work {id} restarted.");
    Ok(())
}

async fn cmd_complete(ctx: &HandlerContext, id: Option<&str>) -> Result<()> {
    let id = resolve_work_id(ctx, id).await?;
    WorkStateMachine::complete(&ctx.pool, &id).await?;
    println!("Work {id} marked completed.");
    Ok(())
}

// ---------------------------------------------------------------------------
// pr / review
// ---------------------------------------------------------------------------

async fn cmd_pr(ctx: &HandlerContext, id: Option<&str>) -> Result<()> {
    enqueue_manual_task(ctx, id, TaskKind::Pr, false).await?;
    Ok(())
}

async fn cmd_review(ctx: &HandlerContext, id: Option<&str>, auto: bool) -> Result<()> {
    enqueue_manual_task(ctx, id, TaskKind::Review, auto).await?;
    Ok(())
}

/// Insert an operator-requested task and relaunch the Work's orchestrator
/// to pick it up. `auto_workflow=false` unless the operator asked for
/// automatic chaining, per the `auto_workflow` metadata contract.
async fn enqueue_manual_task(ctx: &HandlerContext, id: Option<&str>, kind: TaskKind, auto: bool) -> Result<()> {
    let id = resolve_work_id(ctx, id).await?;
    let work = work_db::get_work(&ctx.pool, &id).await?.with_context(|| format!("work {id} not found"))?;

    if work.status == WorkStatus::Idle {
        WorkStateMachine::resume_processing(&ctx.pool, &id).await?;
    }

    task_db::insert_next_task(&ctx.pool, &id, kind, None, Some(auto)).await?;

    ctx.scheduler
        .schedule_now(
            &ctx.pool,
            &id,
            ScheduledTaskKind::SpawnOrchestrator,
            serde_json::json!({ "worker_name": work.worker_name }),
            Some(&format!("spawn-orchestrator-{id}")),
        )
        .await?;

    println!("Enqueued {kind} task for work {id}.");
    Ok(())
}

// ---------------------------------------------------------------------------
// console / claude
// ---------------------------------------------------------------------------

async fn cmd_console(ctx: &HandlerContext, config: &DockmasterConfig, id: Option<&str>) -> Result<()> {
    let id = resolve_work_id(ctx, id).await?;
    let session = session_name(config);
    let tab = format!("work-{id}");

    ctx.multiplexer.ensure_session(&session).await?;
    if !ctx.multiplexer.tab_exists(&session, &tab).await? {
        bail!("work {id} has no running orchestrator tab yet");
    }
    attach(&session, &tab)
}

async fn cmd_claude(ctx: &HandlerContext, config: &DockmasterConfig, id: Option<&str>) -> Result<()> {
    let id = resolve_work_id(ctx, id).await?;
    let work = work_db::get_work(&ctx.pool, &id).await?.with_context(|| format!("work {id} not found"))?;
    let worktree_path = work.worktree_path.with_context(|| format!("work {id} has no worktree yet"))?;

    let session = session_name(config);
    let tab = format!("claude-{id}");

    ctx.multiplexer.ensure_session(&session).await?;
    if !ctx.multiplexer.tab_exists(&session, &tab).await? {
        ctx.multiplexer
            .create_tab(&session, &tab, &format!("cd {worktree_path} && claude"))
            .await?;
    }
    attach(&session, &tab)
}

fn session_name(config: &DockmasterConfig) -> String {
    config
        .project_root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "dockmaster".to_string())
}

/// Replace this process with `tmux attach-session`, handing the
/// operator's terminal straight to the target tab.
fn attach(session: &str, tab: &str) -> Result<()> {
    let target = format!("{session}:{tab}");

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let err = std::process::Command::new("tmux")
            .args(["attach-session", "-t", &target])
            .exec();
        bail!("failed to exec tmux attach-session: {err}");
    }

    #[cfg(not(unix))]
    {
        let status = std::process::Command::new("tmux")
            .args(["attach-session", "-t", &target])
            .status()
            .context("failed to run tmux attach-session")?;
        if !status.success() {
            bail!("tmux attach-session exited with {status}");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// shared helpers
// ---------------------------------------------------------------------------

/// Resolve an optional `[id]` argument: use it verbatim if given, otherwise
/// require exactly one non-terminal Work to exist.
async fn resolve_work_id(ctx: &HandlerContext, explicit: Option<&str>) -> Result<String> {
    if let Some(id) = explicit {
        return Ok(id.to_string());
    }

    let works = work_db::list_works(&ctx.pool).await?;
    let active: Vec<_> = works
        .into_iter()
        .filter(|w| !matches!(w.status, WorkStatus::Completed))
        .collect();

    match active.len() {
        1 => Ok(active.into_iter().next().unwrap().id),
        0 => bail!("no active work; pass an explicit work id"),
        n => bail!("{n} active works; pass an explicit work id to disambiguate"),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush().ok();
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).context("failed to read confirmation")?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
