//! `IssueTracker` implementation reading the external beads tracker's
//! SQLite database directly.
//!
//! `beads` (`<project>/main/.beads/beads.db`) is a separate tool this
//! system only consumes; we read it the same way `dockmaster-db` reads its
//! own store (`sqlx` against a SQLite pool), but never run migrations
//! against it -- the schema is beads' own and this system only ever writes
//! one thing to it: child beads filed by the reviewer.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;

use dockmaster_core::collaborators::{Bead, BeadStatus, IssueTracker};

pub struct BeadsIssueTracker {
    pool: SqlitePool,
}

impl BeadsIssueTracker {
    pub async fn connect(beads_db_path: &Path) -> Result<Self> {
        let options: SqliteConnectOptions = format!("sqlite://{}", beads_db_path.display())
            .parse()
            .with_context(|| format!("invalid beads database path {}", beads_db_path.display()))?;
        let options = options.create_if_missing(true).foreign_keys(false);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("failed to open beads database at {}", beads_db_path.display()))?;
        Ok(Self { pool })
    }

    fn parse_status(raw: &str) -> BeadStatus {
        match raw {
            "in_progress" => BeadStatus::InProgress,
            "blocked" => BeadStatus::Blocked,
            "done" => BeadStatus::Done,
            "wontdo" | "wont_do" => BeadStatus::WontDo,
            _ => BeadStatus::Open,
        }
    }

    async fn load_bead(&self, id: &str) -> Result<Option<Bead>> {
        let row: Option<(String, String, String, Option<String>)> = sqlx::query_as(
            "SELECT id, title, status, external_ref FROM beads WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to query beads table")?;

        let Some((id, title, status, external_ref)) = row else {
            return Ok(None);
        };

        let depends_on: Vec<(String,)> =
            sqlx::query_as("SELECT depends_on_id FROM bead_deps WHERE bead_id = ?1")
                .bind(&id)
                .fetch_all(&self.pool)
                .await
                .context("failed to query bead_deps table")?;

        Ok(Some(Bead {
            id,
            title,
            status: Self::parse_status(&status),
            depends_on: depends_on.into_iter().map(|(d,)| d).collect(),
            external_ref,
        }))
    }
}

#[async_trait]
impl IssueTracker for BeadsIssueTracker {
    async fn get_bead(&self, id: &str) -> Result<Option<Bead>> {
        self.load_bead(id).await
    }

    async fn get_bead_with_children(&self, id: &str) -> Result<Vec<Bead>> {
        let Some(root) = self.load_bead(id).await? else {
            return Ok(vec![]);
        };

        let child_ids: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM beads WHERE parent_id = ?1")
                .bind(id)
                .fetch_all(&self.pool)
                .await
                .context("failed to query child beads")?;

        let mut result = vec![root];
        for (child_id,) in child_ids {
            if let Some(child) = self.load_bead(&child_id).await? {
                result.push(child);
            }
        }
        Ok(result)
    }

    async fn get_beads_with_deps(&self, ids: &[String]) -> Result<Vec<Bead>> {
        let mut result = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(bead) = self.load_bead(id).await? {
                result.push(bead);
            }
        }
        Ok(result)
    }

    async fn close(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE beads SET status = 'done' WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to close bead {id}"))?;
        Ok(())
    }

    async fn create_child_bead(&self, parent_id: &str, title: &str, external_ref: Option<&str>) -> Result<Bead> {
        let id = format!("{parent_id}-{}", random_suffix());

        sqlx::query(
            "INSERT INTO beads (id, title, status, parent_id, external_ref) \
             VALUES (?1, ?2, 'open', ?3, ?4)",
        )
        .bind(&id)
        .bind(title)
        .bind(parent_id)
        .bind(external_ref)
        .execute(&self.pool)
        .await
        .context("failed to insert child bead")?;

        Ok(Bead {
            id,
            title: title.to_string(),
            status: BeadStatus::Open,
            depends_on: vec![],
            external_ref: external_ref.map(|s| s.to_string()),
        })
    }

    async fn flush_cache(&self) -> Result<()> {
        // No in-process cache to invalidate -- every call above reads
        // straight from the pool.
        Ok(())
    }
}

/// A random hex suffix so repeated child-bead creation under the same
/// parent doesn't collide; beads itself is the id authority, this is only
/// a fallback id generator for the one write path this system has into
/// its database.
fn random_suffix() -> String {
    use rand::Rng;
    let bytes: [u8; 4] = rand::rng().random();
    hex::encode(bytes)
}
