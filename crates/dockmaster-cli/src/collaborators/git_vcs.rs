//! `Vcs` implementation backed by shelling out to `git`.
//!
//! Grounded on `gator-core`'s `WorktreeManager`: the same porcelain-parsing
//! and lock-contention-tolerant approach, adapted to dockmaster's layout
//! (`<project>/<work-id>/tree` rather than a shared worktree-base
//! directory) and to the async `Vcs` trait `dockmaster-core` defines.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;

use dockmaster_core::collaborators::vcs::Result;
use dockmaster_core::collaborators::{MergeOutcome, Vcs};
use dockmaster_core::CollaboratorError;

/// Lines `git` prints on a lock held by a concurrent process or a flaky
/// remote -- worth retrying. Everything else (rejected push, unknown
/// branch, bad ref) is a config/state problem that won't self-heal.
fn is_transient_git_failure(stderr: &str) -> bool {
    const TRANSIENT_MARKERS: &[&str] = &[
        "index.lock",
        "Unable to create",
        "could not lock",
        "Could not resolve host",
        "Connection timed out",
        "Connection reset",
        "early EOF",
        "unable to access",
        "The remote end hung up unexpectedly",
        "Recv failure",
        "RPC failed",
    ];
    TRANSIENT_MARKERS.iter().any(|marker| stderr.contains(marker))
}

fn classify_git_failure(command: &str, stderr: &str) -> CollaboratorError {
    let err = anyhow::anyhow!("git {command} failed: {}", stderr.trim());
    if is_transient_git_failure(stderr) {
        CollaboratorError::transient(err)
    } else {
        CollaboratorError::permanent(err)
    }
}

/// Runs `git` against the project's `main/` checkout (the source of truth
/// every worktree branches from).
pub struct GitVcs {
    main_checkout: PathBuf,
}

impl GitVcs {
    pub fn new(main_checkout: impl Into<PathBuf>) -> Self {
        Self {
            main_checkout: main_checkout.into(),
        }
    }

    /// Spawning the process at all (missing binary, cwd gone) is always
    /// worth retrying -- it says nothing about the repository's state.
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .await
            .map_err(|err| CollaboratorError::transient(anyhow::Error::new(err).context(format!("failed to run git {}", args.join(" ")))))
    }

    async fn run_ok(&self, dir: &Path, args: &[&str]) -> Result<()> {
        let output = self.run(dir, args).await?;
        if !output.status.success() {
            return Err(classify_git_failure(&args.join(" "), &String::from_utf8_lossy(&output.stderr)));
        }
        Ok(())
    }
}

#[async_trait]
impl Vcs for GitVcs {
    async fn create_worktree(
        &self,
        work_id: &str,
        branch: &str,
        base_branch: &str,
        use_existing_branch: bool,
    ) -> Result<PathBuf> {
        let worktree_path = self
            .main_checkout
            .parent()
            .unwrap_or(&self.main_checkout)
            .join(work_id)
            .join("tree");

        if worktree_path.exists() {
            return Ok(worktree_path);
        }

        if let Some(parent) = worktree_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))
                .map_err(CollaboratorError::permanent)?;
        }

        let args: Vec<&str> = if use_existing_branch {
            vec!["worktree", "add", worktree_path.to_str().unwrap(), branch]
        } else {
            vec![
                "worktree",
                "add",
                "-b",
                branch,
                worktree_path.to_str().unwrap(),
                base_branch,
            ]
        };

        self.run_ok(&self.main_checkout, &args).await?;
        Ok(worktree_path)
    }

    async fn remove_worktree(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let output = self
            .run(&self.main_checkout, &["worktree", "remove", "--force", path.to_str().unwrap()])
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("is not a working tree") {
                let _ = std::fs::remove_dir_all(path);
                return Ok(());
            }
            return Err(classify_git_failure("worktree remove", &stderr));
        }
        Ok(())
    }

    async fn push_set_upstream(&self, worktree_path: &Path, branch: &str) -> Result<()> {
        self.run_ok(worktree_path, &["push", "--set-upstream", "origin", branch]).await
    }

    async fn validate_existing_branch(&self, branch: &str) -> Result<bool> {
        let output = self
            .run(&self.main_checkout, &["rev-parse", "--verify", &format!("refs/heads/{branch}")])
            .await?;
        Ok(output.status.success())
    }

    async fn has_commits_ahead(&self, branch: &str, base_branch: &str) -> Result<bool> {
        let output = self
            .run(
                &self.main_checkout,
                &["rev-list", "--count", &format!("{base_branch}..{branch}")],
            )
            .await?;
        if !output.status.success() {
            return Ok(false);
        }
        let count: u64 = String::from_utf8_lossy(&output.stdout).trim().parse().unwrap_or(0);
        Ok(count > 0)
    }

    async fn merge_branch(&self, branch: &str) -> Result<MergeOutcome> {
        let output = self.run(&self.main_checkout, &["merge", "--no-ff", branch]).await?;
        if output.status.success() {
            return Ok(MergeOutcome::Success);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if stderr.contains("CONFLICT") || stdout.contains("CONFLICT") {
            let _ = self.run(&self.main_checkout, &["merge", "--abort"]).await;
            return Ok(MergeOutcome::Conflict {
                details: format!("{stdout}\n{stderr}").trim().to_string(),
            });
        }
        Err(classify_git_failure("merge", &stderr))
    }

    async fn delete_branch(&self, branch: &str) -> Result<()> {
        let output = self.run(&self.main_checkout, &["branch", "-D", branch]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not found") {
                return Ok(());
            }
            return Err(classify_git_failure("branch -D", &stderr));
        }
        Ok(())
    }

    async fn init_toolchain(&self, worktree_path: &Path) -> Result<()> {
        if !worktree_path.join(".mise.toml").exists() && !worktree_path.join("mise.toml").exists() {
            return Ok(());
        }

        match Command::new("mise").arg("install").current_dir(worktree_path).output().await {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => {
                tracing::warn!(
                    path = %worktree_path.display(),
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "mise install failed, continuing without it"
                );
                Ok(())
            }
            Err(err) => {
                tracing::warn!(path = %worktree_path.display(), %err, "mise not available, skipping toolchain init");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn init_repo() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().join("main");
        std::fs::create_dir_all(&repo).unwrap();
        StdCommand::new("git").arg("init").current_dir(&repo).output().unwrap();
        StdCommand::new("git").args(["config", "user.email", "t@dockmaster.dev"]).current_dir(&repo).output().unwrap();
        StdCommand::new("git").args(["config", "user.name", "Dockmaster Test"]).current_dir(&repo).output().unwrap();
        std::fs::write(repo.join("README.md"), "hi\n").unwrap();
        StdCommand::new("git").args(["add", "."]).current_dir(&repo).output().unwrap();
        StdCommand::new("git").args(["commit", "-m", "init"]).current_dir(&repo).output().unwrap();
        StdCommand::new("git").args(["branch", "-M", "main"]).current_dir(&repo).output().unwrap();
        (tmp, repo)
    }

    #[tokio::test]
    async fn create_worktree_is_idempotent() {
        let (_tmp, repo) = init_repo();
        let vcs = GitVcs::new(&repo);

        let path1 = vcs.create_worktree("w-1", "feat/x", "main", false).await.unwrap();
        assert!(path1.exists());
        let path2 = vcs.create_worktree("w-1", "feat/x", "main", false).await.unwrap();
        assert_eq!(path1, path2);
    }

    #[tokio::test]
    async fn remove_worktree_is_idempotent() {
        let (_tmp, repo) = init_repo();
        let vcs = GitVcs::new(&repo);

        let path = vcs.create_worktree("w-2", "feat/y", "main", false).await.unwrap();
        vcs.remove_worktree(&path).await.unwrap();
        assert!(!path.exists());
        vcs.remove_worktree(&path).await.unwrap();
    }

    #[tokio::test]
    async fn delete_branch_tolerates_missing_branch() {
        let (_tmp, repo) = init_repo();
        let vcs = GitVcs::new(&repo);
        vcs.delete_branch("does/not/exist").await.unwrap();
    }
}
