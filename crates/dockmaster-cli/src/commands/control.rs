//! `dock control --root <path>`: the long-lived control-plane process.
//!
//! Spawned automatically by [`dockmaster_core::ensure::ensure_control_plane`]
//! into a multiplexer tab; not meant to be run directly by an operator.
//! Recovers any tasks orphaned by a previous crash, then drives the
//! dispatcher loop (C4) until interrupted.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use dockmaster_core::broker::ChangeBroker;
use dockmaster_core::dispatcher;

use crate::config::DockmasterConfig;
use crate::runtime;

pub async fn run(config: &DockmasterConfig) -> Result<()> {
    let ctx = runtime::build_context(config).await?;

    let recovered = dispatcher::recover_orphaned_tasks(&ctx.pool)
        .await
        .context("failed to recover orphaned tasks")?;
    if recovered > 0 {
        tracing::warn!(recovered, "reset tasks orphaned by a previous crash back to pending");
    }

    let broker = ChangeBroker::new();
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    tracing::info!(root = %config.project_root.display(), "control plane started");
    dispatcher::run(ctx, &broker, cancel).await;
    tracing::info!("control plane stopped");

    Ok(())
}
