//! `PrHost` implementation backed by the `gh` CLI.
//!
//! `gh pr create`/`gh pr view --json` give structured output without a
//! direct GitHub API client dependency, the same way [`super::claude_agent_runner`]
//! shells out to an external binary (`claude`) rather than linking an SDK.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use dockmaster_core::collaborators::pr_host::Result;
use dockmaster_core::collaborators::{PrHost, PrSnapshot, ReviewThread};
use dockmaster_core::CollaboratorError;

/// Pulls the three-digit status out of `gh`'s `"... (HTTP 404)"` /
/// `"HTTP 422: ..."`-style error lines.
fn extract_http_status(stderr: &str) -> Option<u16> {
    let idx = stderr.find("HTTP ")?;
    stderr[idx + 5..].chars().take_while(|c| c.is_ascii_digit()).collect::<String>().parse().ok()
}

/// 409 (conflict) and 429 (rate limit) and any 5xx are worth retrying; any
/// other 4xx is a request the forge has permanently rejected. An
/// unrecognized shape defaults to transient so a `gh` output format we
/// don't parse doesn't strand a retryable failure as permanent.
fn classify_gh_failure(command: &str, stderr: &str) -> CollaboratorError {
    let err = anyhow::anyhow!("gh {command} failed: {}", stderr.trim());
    match extract_http_status(stderr) {
        Some(409) | Some(429) => CollaboratorError::transient(err),
        Some(status) if (500..600).contains(&status) => CollaboratorError::transient(err),
        Some(_) => CollaboratorError::permanent(err),
        None => CollaboratorError::transient(err),
    }
}

pub struct GhPrHost;

impl GhPrHost {
    pub fn new() -> Self {
        Self
    }

    /// Spawning `gh` itself (missing binary, cwd gone) says nothing about
    /// the forge's state, so it's always worth retrying.
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<std::process::Output> {
        Command::new("gh")
            .args(args)
            .current_dir(dir)
            .output()
            .await
            .map_err(|err| CollaboratorError::transient(anyhow::Error::new(err).context(format!("failed to run gh {}", args.join(" ")))))
    }
}

impl Default for GhPrHost {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct PrViewJson {
    state: String,
    #[serde(rename = "statusCheckRollup")]
    status_check_rollup: Option<Vec<StatusCheck>>,
    #[serde(rename = "reviewDecision")]
    review_decision: Option<String>,
    #[serde(rename = "reviewThreads")]
    review_threads: Option<Vec<ReviewThreadJson>>,
}

#[derive(Deserialize)]
struct StatusCheck {
    conclusion: Option<String>,
}

#[derive(Deserialize)]
struct ReviewThreadJson {
    id: String,
    #[serde(rename = "isResolved")]
    is_resolved: bool,
    comments: Option<Vec<ReviewCommentJson>>,
}

#[derive(Deserialize)]
struct ReviewCommentJson {
    body: String,
}

#[async_trait]
impl PrHost for GhPrHost {
    async fn create_pr_in_dir(&self, worktree_path: &Path, title: &str, body: &str) -> Result<String> {
        let output = self
            .run(worktree_path, &["pr", "create", "--title", title, "--body", body, "--fill-first"])
            .await?;
        if !output.status.success() {
            return Err(classify_gh_failure("pr create", &String::from_utf8_lossy(&output.stderr)));
        }
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(url)
    }

    async fn merge_pr_in_dir(&self, worktree_path: &Path) -> Result<()> {
        let output = self.run(worktree_path, &["pr", "merge", "--squash", "--delete-branch"]).await?;
        if !output.status.success() {
            return Err(classify_gh_failure("pr merge", &String::from_utf8_lossy(&output.stderr)));
        }
        Ok(())
    }

    async fn fetch_snapshot(&self, pr_url: &str) -> Result<PrSnapshot> {
        let output = self
            .run(
                Path::new("."),
                &[
                    "pr",
                    "view",
                    pr_url,
                    "--json",
                    "state,statusCheckRollup,reviewDecision,reviewThreads",
                ],
            )
            .await?;
        if !output.status.success() {
            return Err(classify_gh_failure("pr view", &String::from_utf8_lossy(&output.stderr)));
        }

        let parsed: PrViewJson = serde_json::from_slice(&output.stdout)
            .context("failed to parse gh pr view output")
            .map_err(CollaboratorError::permanent)?;

        let ci_status = parsed.status_check_rollup.as_ref().map(|checks| {
            if checks.iter().all(|c| c.conclusion.as_deref() == Some("SUCCESS")) {
                "success".to_string()
            } else if checks.iter().any(|c| c.conclusion.as_deref() == Some("FAILURE")) {
                "failure".to_string()
            } else {
                "pending".to_string()
            }
        });

        let unresolved_threads = parsed
            .review_threads
            .unwrap_or_default()
            .into_iter()
            .filter(|t| !t.is_resolved)
            .map(|t| ReviewThread {
                id: t.id,
                resolved: t.is_resolved,
                body: t
                    .comments
                    .and_then(|c| c.into_iter().next())
                    .map(|c| c.body)
                    .unwrap_or_default(),
            })
            .collect();

        Ok(PrSnapshot {
            pr_state: parsed.state.to_lowercase(),
            ci_status,
            approval_status: parsed.review_decision.map(|d| d.to_lowercase()),
            unresolved_threads,
        })
    }

    async fn comment(&self, pr_url: &str, body: &str) -> Result<()> {
        let output = self.run(Path::new("."), &["pr", "comment", pr_url, "--body", body]).await?;
        if !output.status.success() {
            return Err(classify_gh_failure("pr comment", &String::from_utf8_lossy(&output.stderr)));
        }
        Ok(())
    }

    async fn resolve_thread(&self, pr_url: &str, thread_id: &str) -> Result<()> {
        // `gh` has no first-class "resolve review thread" subcommand; it is
        // exposed only through the GraphQL API.
        let query = "mutation($id:ID!){resolveReviewThread(input:{threadId:$id}){thread{isResolved}}}";
        let output = self
            .run(
                Path::new("."),
                &["api", "graphql", "-f", &format!("query={query}"), "-f", &format!("id={thread_id}")],
            )
            .await?;
        if !output.status.success() {
            return Err(classify_gh_failure(
                &format!("api graphql resolveReviewThread for {pr_url}"),
                &String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(())
    }
}
