//! Terminal multiplexer client interface.
//!
//! `spawn-orchestrator` launches the per-work orchestrator process in its
//! own tab; `destroy-worktree` tears every tab for a work down again;
//! `ensure` launches the control plane itself into a dedicated `control`
//! tab. Grounded on tmux usage patterns in the wider pack (session/tab
//! naming, capture-pane, kill-session), generalized to an async trait so
//! handlers don't shell out to `tmux` directly.

use anyhow::Result;
use async_trait::async_trait;

/// Multiplexer operations consumed by C5 handlers and C8.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Ensure a session exists for the project, creating it if absent.
    async fn ensure_session(&self, session: &str) -> Result<()>;

    /// Create a tab within a session, running `command` as its initial
    /// process. Returns once the tab exists (not once `command` exits).
    async fn create_tab(&self, session: &str, tab: &str, command: &str) -> Result<()>;

    /// Switch the attached client's focus to a tab.
    async fn switch_to_tab(&self, session: &str, tab: &str) -> Result<()>;

    /// Whether a tab currently exists.
    async fn tab_exists(&self, session: &str, tab: &str) -> Result<bool>;

    /// Run a command inside an existing tab (as if typed at the prompt).
    async fn execute_command(&self, session: &str, tab: &str, command: &str) -> Result<()>;

    /// Terminate the tab's process and close the tab.
    async fn terminate_and_close_tab(&self, session: &str, tab: &str) -> Result<()>;

    /// Send Ctrl-C to the tab's foreground process.
    async fn send_ctrl_c(&self, session: &str, tab: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMultiplexer {
        tabs: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Multiplexer for RecordingMultiplexer {
        async fn ensure_session(&self, _session: &str) -> Result<()> {
            Ok(())
        }
        async fn create_tab(&self, _session: &str, tab: &str, _command: &str) -> Result<()> {
            self.tabs.lock().unwrap().push(tab.to_string());
            Ok(())
        }
        async fn switch_to_tab(&self, _session: &str, _tab: &str) -> Result<()> {
            Ok(())
        }
        async fn tab_exists(&self, _session: &str, tab: &str) -> Result<bool> {
            Ok(self.tabs.lock().unwrap().iter().any(|t| t == tab))
        }
        async fn execute_command(&self, _session: &str, _tab: &str, _command: &str) -> Result<()> {
            Ok(())
        }
        async fn terminate_and_close_tab(&self, _session: &str, tab: &str) -> Result<()> {
            self.tabs.lock().unwrap().retain(|t| t != tab);
            Ok(())
        }
        async fn send_ctrl_c(&self, _session: &str, _tab: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn create_then_exists_then_close() {
        let mux: Box<dyn Multiplexer> = Box::<RecordingMultiplexer>::default();
        mux.create_tab("proj", "control", "dock control").await.unwrap();
        assert!(mux.tab_exists("proj", "control").await.unwrap());
        mux.terminate_and_close_tab("proj", "control").await.unwrap();
        assert!(!mux.tab_exists("proj", "control").await.unwrap());
    }
}
