use std::env;
use std::path::{Path, PathBuf};

/// Database configuration.
///
/// The control plane's durable store is a single SQLite file per project,
/// conventionally `<project>/.co/tracking.db`. Reads from the
/// `DOCKMASTER_DATABASE_URL` environment variable, falling back to a path
/// derived from the project root.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// `sqlite://` connection URL (or `sqlite::memory:` for tests).
    pub database_url: String,
}

impl DbConfig {
    /// The default connection URL used when no environment variable or
    /// project root is available.
    pub const DEFAULT_URL: &str = "sqlite://.co/tracking.db?mode=rwc";

    /// Build a config from the environment.
    ///
    /// Priority: `DOCKMASTER_DATABASE_URL` env var, then the compile-time
    /// default.
    pub fn from_env() -> Self {
        let database_url =
            env::var("DOCKMASTER_DATABASE_URL").unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        Self { database_url }
    }

    /// Build a config pointing at `<project_root>/.co/tracking.db`, creating
    /// the `.co` directory on demand (`mode=rwc`).
    pub fn for_project_root(project_root: &Path) -> Self {
        let db_path = project_root.join(".co").join("tracking.db");
        Self::new(format!("sqlite://{}?mode=rwc", db_path.display()))
    }

    /// Build a config from an explicit URL (useful for tests and CLI flags).
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }

    /// An in-memory database, useful for unit tests that don't need
    /// cross-process durability.
    pub fn in_memory() -> Self {
        Self::new("sqlite::memory:")
    }

    /// Extract the filesystem path component of the URL, if this config
    /// points at a file-backed database (not `:memory:`).
    pub fn file_path(&self) -> Option<PathBuf> {
        let without_scheme = self.database_url.strip_prefix("sqlite://")?;
        let without_query = without_scheme.split('?').next().unwrap_or(without_scheme);
        if without_query.is_empty() || without_query == ":memory:" {
            return None;
        }
        Some(PathBuf::from(without_query))
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
