//! Version-control interface: git worktree and push operations.
//!
//! Grounded on `gator-core`'s `WorktreeManager`, generalized to an
//! object-safe trait so handlers depend on an interface rather than a
//! concrete `std::process::Command` wrapper, and widened to also cover the
//! push operations `create-worktree` / `git-push` need.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::CollaboratorError;

/// Every `Vcs` method returns this: the adapter that shelled out to `git`
/// is the only thing that knows whether the failure it just saw (a lock
/// file, a rejected push, a missing remote) is worth retrying.
pub type Result<T> = std::result::Result<T, CollaboratorError>;

/// Outcome of a merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Success,
    Conflict { details: String },
}

/// Version-control operations consumed by the `create-worktree`,
/// `git-push`, and `destroy-worktree` handlers.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Create a worktree at `<project>/<work_id>/tree` on `branch`, based
    /// on `base_branch`. If `use_existing_branch` is set, check out
    /// `branch` instead of creating it. Idempotent: if a worktree already
    /// exists at the expected path on the expected branch, returns its
    /// path without error.
    async fn create_worktree(
        &self,
        work_id: &str,
        branch: &str,
        base_branch: &str,
        use_existing_branch: bool,
    ) -> Result<PathBuf>;

    /// Remove a worktree, tolerating one that was never registered or
    /// already removed.
    async fn remove_worktree(&self, path: &Path) -> Result<()>;

    /// Push `branch` with upstream tracking set.
    async fn push_set_upstream(&self, worktree_path: &Path, branch: &str) -> Result<()>;

    /// Confirm `branch` exists and can be checked out as-is.
    async fn validate_existing_branch(&self, branch: &str) -> Result<bool>;

    /// Whether `branch` has commits ahead of `base_branch`.
    async fn has_commits_ahead(&self, branch: &str, base_branch: &str) -> Result<bool>;

    /// Merge `branch` into the current branch; aborts automatically on
    /// conflict rather than leaving the repo mid-merge.
    async fn merge_branch(&self, branch: &str) -> Result<MergeOutcome>;

    /// Force-delete a local branch, tolerating one that doesn't exist.
    async fn delete_branch(&self, branch: &str) -> Result<()>;

    /// Initialize the project's toolchain (`mise`) inside a freshly created
    /// worktree, if the project uses one. Failures are non-fatal to the
    /// `create-worktree` handler, so implementations should generally
    /// swallow errors themselves rather than propagate them; the default
    /// does nothing, for `Vcs` implementations with no toolchain concept.
    async fn init_toolchain(&self, _worktree_path: &Path) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubVcs;

    #[async_trait]
    impl Vcs for StubVcs {
        async fn create_worktree(
            &self,
            work_id: &str,
            _branch: &str,
            _base_branch: &str,
            _use_existing_branch: bool,
        ) -> Result<PathBuf> {
            Ok(PathBuf::from(format!("/tmp/{work_id}/tree")))
        }
        async fn remove_worktree(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
        async fn push_set_upstream(&self, _worktree_path: &Path, _branch: &str) -> Result<()> {
            Ok(())
        }
        async fn validate_existing_branch(&self, _branch: &str) -> Result<bool> {
            Ok(true)
        }
        async fn has_commits_ahead(&self, _branch: &str, _base_branch: &str) -> Result<bool> {
            Ok(false)
        }
        async fn merge_branch(&self, _branch: &str) -> Result<MergeOutcome> {
            Ok(MergeOutcome::Success)
        }
        async fn delete_branch(&self, _branch: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn trait_is_object_safe() {
        let vcs: Box<dyn Vcs> = Box::new(StubVcs);
        let path = vcs
            .create_worktree("w-abc", "feat/x", "main", false)
            .await
            .unwrap();
        assert_eq!(path, PathBuf::from("/tmp/w-abc/tree"));
    }
}
