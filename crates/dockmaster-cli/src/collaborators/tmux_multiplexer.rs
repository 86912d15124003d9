//! `Multiplexer` implementation backed by shelling out to `tmux`.
//!
//! The control plane's doc comments note tmux session/tab naming and
//! capture-pane conventions as the grounding for this interface; this is
//! the concrete adapter those comments describe. One tmux session per
//! project, one window per tab (`control`, `work-<id>`).

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::process::Command;

use dockmaster_core::collaborators::Multiplexer;

pub struct TmuxMultiplexer;

impl TmuxMultiplexer {
    pub fn new() -> Self {
        Self
    }

    async fn tmux(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new("tmux")
            .args(args)
            .output()
            .await
            .with_context(|| format!("failed to run tmux {}", args.join(" ")))
    }
}

impl Default for TmuxMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Multiplexer for TmuxMultiplexer {
    async fn ensure_session(&self, session: &str) -> Result<()> {
        let output = self.tmux(&["has-session", "-t", session]).await?;
        if output.status.success() {
            return Ok(());
        }
        let output = self.tmux(&["new-session", "-d", "-s", session]).await?;
        if !output.status.success() {
            bail!("tmux new-session failed: {}", String::from_utf8_lossy(&output.stderr));
        }
        Ok(())
    }

    async fn create_tab(&self, session: &str, tab: &str, command: &str) -> Result<()> {
        let target = format!("{session}:");
        let output = self
            .tmux(&["new-window", "-t", &target, "-n", tab, command])
            .await?;
        if !output.status.success() {
            bail!("tmux new-window failed: {}", String::from_utf8_lossy(&output.stderr));
        }
        Ok(())
    }

    async fn switch_to_tab(&self, session: &str, tab: &str) -> Result<()> {
        let target = format!("{session}:{tab}");
        let output = self.tmux(&["select-window", "-t", &target]).await?;
        if !output.status.success() {
            bail!("tmux select-window failed: {}", String::from_utf8_lossy(&output.stderr));
        }
        Ok(())
    }

    async fn tab_exists(&self, session: &str, tab: &str) -> Result<bool> {
        let output = self
            .tmux(&["list-windows", "-t", session, "-F", "#{window_name}"])
            .await?;
        if !output.status.success() {
            return Ok(false);
        }
        let names = String::from_utf8_lossy(&output.stdout);
        Ok(names.lines().any(|n| n == tab))
    }

    async fn execute_command(&self, session: &str, tab: &str, command: &str) -> Result<()> {
        let target = format!("{session}:{tab}");
        let output = self.tmux(&["send-keys", "-t", &target, command, "Enter"]).await?;
        if !output.status.success() {
            bail!("tmux send-keys failed: {}", String::from_utf8_lossy(&output.stderr));
        }
        Ok(())
    }

    async fn terminate_and_close_tab(&self, session: &str, tab: &str) -> Result<()> {
        let target = format!("{session}:{tab}");
        let output = self.tmux(&["kill-window", "-t", &target]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("can't find window") || stderr.contains("no such window") {
                return Ok(());
            }
            bail!("tmux kill-window failed: {stderr}");
        }
        Ok(())
    }

    async fn send_ctrl_c(&self, session: &str, tab: &str) -> Result<()> {
        let target = format!("{session}:{tab}");
        let output = self.tmux(&["send-keys", "-t", &target, "C-c"]).await?;
        if !output.status.success() {
            bail!("tmux send-keys C-c failed: {}", String::from_utf8_lossy(&output.stderr));
        }
        Ok(())
    }
}
