//! Project root resolution and per-command configuration.
//!
//! Unlike a shared XDG-config chain (one config file for every invocation),
//! this system's state is per-project: `<project>/.co/` holds
//! the control plane's database and `<project>/main/` holds the source
//! checkout. There is no global config file to load -- resolution walks the
//! filesystem instead, the way `git` locates `.git/`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use dockmaster_db::config::DbConfig;

/// Fully resolved per-invocation configuration.
#[derive(Debug, Clone)]
pub struct DockmasterConfig {
    pub project_root: PathBuf,
    pub db_config: DbConfig,
}

impl DockmasterConfig {
    /// Resolve the project root and its database config.
    ///
    /// Resolution order for the root: an explicit `--root` flag; then
    /// walking up from the current directory looking for a `.co`
    /// subdirectory; then the current directory itself (the case of a
    /// brand-new project, where `.co` does not exist yet).
    pub fn resolve(explicit_root: Option<&Path>) -> Result<Self> {
        let project_root = match explicit_root {
            Some(root) => root
                .canonicalize()
                .with_context(|| format!("project root {} does not exist", root.display()))?,
            None => {
                let cwd = std::env::current_dir().context("failed to read current directory")?;
                discover_project_root(&cwd).unwrap_or(cwd)
            }
        };

        let db_config = DbConfig::for_project_root(&project_root);

        Ok(Self {
            project_root,
            db_config,
        })
    }

    /// The project's source-of-truth checkout, `<project>/main/`.
    pub fn main_checkout(&self) -> PathBuf {
        self.project_root.join("main")
    }

    /// The external issue tracker's database, `<project>/main/.beads/beads.db`.
    pub fn beads_db_path(&self) -> PathBuf {
        self.main_checkout().join(".beads").join("beads.db")
    }

    /// The worktree directory for a given work id, `<project>/<work-id>/tree`.
    pub fn worktree_path(&self, work_id: &str) -> PathBuf {
        self.project_root.join(work_id).join("tree")
    }

    /// The per-work artifact directory, `<project>/<work-id>`.
    pub fn work_dir(&self, work_id: &str) -> PathBuf {
        self.project_root.join(work_id)
    }
}

/// Walk up from `start` looking for a directory containing `.co`.
fn discover_project_root(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        if d.join(".co").is_dir() {
            return Some(d.to_path_buf());
        }
        dir = d.parent();
    }
    None
}

/// Require that the project has already been initialized (`.co/tracking.db`
/// exists), for commands that must not silently create a fresh empty
/// project (e.g. `work list` against a typo'd directory).
pub fn require_initialized(config: &DockmasterConfig) -> Result<()> {
    if !config.project_root.join(".co").is_dir() {
        bail!(
            "no dockmaster project at {} (run `dock control --root <path>` to initialize one)",
            config.project_root.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_finds_co_dir_in_parent() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(".co")).unwrap();
        let nested = tmp.path().join("w-abc123").join("tree");
        std::fs::create_dir_all(&nested).unwrap();

        let found = discover_project_root(&nested).unwrap();
        assert_eq!(found.canonicalize().unwrap(), tmp.path().canonicalize().unwrap());
    }

    #[test]
    fn discover_returns_none_when_absent() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(discover_project_root(tmp.path()).is_none());
    }

    #[test]
    fn resolve_with_explicit_root_uses_it_verbatim() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = DockmasterConfig::resolve(Some(tmp.path())).unwrap();
        assert_eq!(
            config.project_root.canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn work_paths_are_relative_to_project_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = DockmasterConfig::resolve(Some(tmp.path())).unwrap();
        assert_eq!(config.worktree_path("w-abc"), config.project_root.join("w-abc").join("tree"));
        assert_eq!(config.beads_db_path(), config.project_root.join("main/.beads/beads.db"));
    }

    #[test]
    fn require_initialized_errors_without_co_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = DockmasterConfig::resolve(Some(tmp.path())).unwrap();
        assert!(require_initialized(&config).is_err());
    }
}
