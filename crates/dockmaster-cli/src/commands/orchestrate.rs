//! `dock orchestrate --root <path> --work <id>`: the per-work orchestrator
//! process (C7).
//!
//! Spawned into its own multiplexer tab by the `spawn-orchestrator`
//! handler; runs [`dockmaster_core::orchestrator::run`] once to completion
//! (the work reaches `idle` or `failed`) and exits.

use anyhow::{bail, Result};

use dockmaster_core::orchestrator;

use crate::config::DockmasterConfig;
use crate::runtime;

pub async fn run(config: &DockmasterConfig, work_id: &str) -> Result<()> {
    let ctx = runtime::build_context(config).await?;

    if let Err(err) = orchestrator::run(&ctx, work_id).await {
        bail!("orchestrator run for {work_id} failed: {err}");
    }
    Ok(())
}
