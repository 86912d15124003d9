//! Ensure/Spawn control plane (C8).
//!
//! A reliability wrapper used by top-level CLI commands before they touch
//! the durable store: make sure a control-plane process is running for
//! this project, launching one into a dedicated `control` multiplexer tab
//! if not. Idempotent -- the tab is single-instance per project, and a
//! second `ensure` call while one is already running is a no-op.
//!
//! Liveness is answered by scanning the process table for a command line
//! containing `control --root <project-root>`, a stopgap pattern-match
//! approach; an environment with access to a supervised process group or a
//! PID file should prefer that instead -- see [`ProcessScanner`].

use std::path::Path;

use anyhow::Result;

use crate::collaborators::Multiplexer;
use crate::handlers::{session_name, work_tab_name};

/// Multiplexer tab name reserved for the control-plane process itself.
pub const CONTROL_TAB: &str = "control";

/// Answers "is a process matching this command-line substring already
/// running?" -- abstracted so tests don't need to fork a real process
/// whose argv happens to match.
pub trait ProcessScanner: Send + Sync {
    fn is_running(&self, cmdline_substring: &str) -> bool;
}

/// Scans the real process table via `sysinfo`.
pub struct SystemProcessScanner;

impl ProcessScanner for SystemProcessScanner {
    fn is_running(&self, cmdline_substring: &str) -> bool {
        use sysinfo::System;

        let mut system = System::new();
        system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

        system.processes().values().any(|process| {
            let cmd = process
                .cmd()
                .iter()
                .map(|s| s.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ");
            cmd.contains(cmdline_substring)
        })
    }
}

/// The command-line substring a `control --root <project_root>` process
/// can be recognized by.
pub fn control_plane_pattern(project_root: &Path) -> String {
    format!("control --root {}", project_root.display())
}

/// Whether a control-plane process for `project_root` is already running.
pub fn is_control_plane_running(scanner: &dyn ProcessScanner, project_root: &Path) -> bool {
    scanner.is_running(&control_plane_pattern(project_root))
}

/// Make sure a control-plane process is running for `project_root`,
/// spawning one into a dedicated `control` tab if not. Returns `true` if a
/// new process was spawned, `false` if one was already running.
pub async fn ensure_control_plane(
    scanner: &dyn ProcessScanner,
    multiplexer: &dyn Multiplexer,
    project_root: &Path,
    dock_binary: &str,
) -> Result<bool> {
    if is_control_plane_running(scanner, project_root) {
        return Ok(false);
    }

    let session = session_name(project_root);
    multiplexer.ensure_session(&session).await?;

    if multiplexer.tab_exists(&session, CONTROL_TAB).await? {
        // A tab survives the process it hosted dying (e.g. the multiplexer
        // keeps a dead pane around); treat a stale tab as "not running" and
        // replace it rather than leaving the project with no control plane.
        multiplexer.terminate_and_close_tab(&session, CONTROL_TAB).await?;
    }

    let command = format!("{dock_binary} control --root {}", project_root.display());
    multiplexer.create_tab(&session, CONTROL_TAB, &command).await?;

    Ok(true)
}

/// Absolute path a work's orchestrator tab would live at, for callers (e.g.
/// `work console`) that want to switch a terminal to it without going
/// through a handler.
pub fn orchestrator_tab(project_root: &Path, work_id: &str) -> (String, String) {
    (session_name(project_root), work_tab_name(work_id))
}
