//! Shared test utilities for dockmaster integration tests.
//!
//! Each test gets its own SQLite file in a fresh temp directory, with
//! migrations already applied. Unlike a shared Postgres instance, there is
//! no server to reuse across tests, so setup just means picking a file path.

use sqlx::SqlitePool;
use tempfile::TempDir;

use dockmaster_db::config::DbConfig;
use dockmaster_db::pool;

/// A throwaway database plus the temp directory backing it.
///
/// Keep this alive for the duration of the test -- dropping the `TempDir`
/// deletes the database file.
pub struct TestDb {
    pub pool: SqlitePool,
    _dir: TempDir,
}

impl TestDb {
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Create a temporary SQLite database with migrations applied.
pub async fn create_test_db() -> TestDb {
    let dir = tempfile::tempdir().expect("failed to create temp dir for test db");
    let db_path = dir.path().join("tracking.db");
    let config = DbConfig::new(format!("sqlite://{}?mode=rwc", db_path.display()));

    let test_pool = pool::create_pool(&config)
        .await
        .expect("failed to open temp test database");

    pool::run_migrations(&test_pool, pool::default_migrations_path())
        .await
        .expect("migrations should succeed");

    TestDb {
        pool: test_pool,
        _dir: dir,
    }
}

/// An in-memory database with migrations applied, for tests that don't need
/// a real file on disk (e.g. pure query-logic unit tests).
pub async fn create_in_memory_db() -> SqlitePool {
    let config = DbConfig::in_memory();
    let test_pool = pool::create_pool(&config)
        .await
        .expect("failed to open in-memory test database");

    pool::run_migrations(&test_pool, pool::default_migrations_path())
        .await
        .expect("migrations should succeed");

    test_pool
}
