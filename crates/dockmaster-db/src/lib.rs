//! Durable store for the control plane: connection pooling, migrations, and
//! typed query functions over the `works` / `tasks` / `scheduled_tasks`
//! tables backing a single project's `.co/tracking.db`.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;

pub use config::DbConfig;
pub use pool::{create_pool, default_migrations_path, run_migrations, table_counts};
