//! PR-host client interface (GitHub or equivalent forge).

use std::path::Path;

use async_trait::async_trait;

use crate::error::CollaboratorError;

/// Every `PrHost` method returns this: the adapter that shelled out to
/// `gh` (or called the forge's API directly) is the only thing that knows
/// whether an HTTP status or exit code is worth retrying.
pub type Result<T> = std::result::Result<T, CollaboratorError>;

/// A review thread on a pull request.
#[derive(Debug, Clone)]
pub struct ReviewThread {
    pub id: String,
    pub resolved: bool,
    pub body: String,
}

/// A point-in-time snapshot of a PR's state, as polled by `pr-feedback`.
#[derive(Debug, Clone)]
pub struct PrSnapshot {
    pub pr_state: String,
    pub ci_status: Option<String>,
    pub approval_status: Option<String>,
    pub unresolved_threads: Vec<ReviewThread>,
}

/// PR-host operations consumed by the `pr-feedback`, `comment-resolution`,
/// `github-comment`, and `github-resolve-thread` handlers.
#[async_trait]
pub trait PrHost: Send + Sync {
    /// Open a PR from the branch checked out in `worktree_path`. Returns
    /// the PR URL.
    async fn create_pr_in_dir(&self, worktree_path: &Path, title: &str, body: &str) -> Result<String>;

    /// Merge an already-approved PR.
    async fn merge_pr_in_dir(&self, worktree_path: &Path) -> Result<()>;

    /// Fetch the current review/CI/approval snapshot for a PR.
    async fn fetch_snapshot(&self, pr_url: &str) -> Result<PrSnapshot>;

    /// Post a comment on the PR.
    async fn comment(&self, pr_url: &str, body: &str) -> Result<()>;

    /// Mark a review thread resolved.
    async fn resolve_thread(&self, pr_url: &str, thread_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubPrHost;

    #[async_trait]
    impl PrHost for StubPrHost {
        async fn create_pr_in_dir(&self, _worktree_path: &Path, _title: &str, _body: &str) -> Result<String> {
            Ok("https://example.invalid/pr/1".to_string())
        }
        async fn merge_pr_in_dir(&self, _worktree_path: &Path) -> Result<()> {
            Ok(())
        }
        async fn fetch_snapshot(&self, _pr_url: &str) -> Result<PrSnapshot> {
            Ok(PrSnapshot {
                pr_state: "open".to_string(),
                ci_status: Some("success".to_string()),
                approval_status: None,
                unresolved_threads: vec![],
            })
        }
        async fn comment(&self, _pr_url: &str, _body: &str) -> Result<()> {
            Ok(())
        }
        async fn resolve_thread(&self, _pr_url: &str, _thread_id: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn trait_is_object_safe() {
        let host: Box<dyn PrHost> = Box::new(StubPrHost);
        let url = host
            .create_pr_in_dir(Path::new("/tmp/wt"), "title", "body")
            .await
            .unwrap();
        assert_eq!(url, "https://example.invalid/pr/1");
    }
}
