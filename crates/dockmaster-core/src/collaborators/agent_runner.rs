//! Agent (LLM coding assistant) runner interface.
//!
//! Grounded on `gator-core`'s `Harness` trait, simplified to the
//! blocking-call contract this system needs: the orchestrator invokes the
//! agent once per task and waits for a pass/fail outcome rather than
//! streaming events, since task success/failure is all C6 needs to drive
//! the work state machine.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

/// Result of one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// The agent finished and its work should be treated as a pass.
    Success,
    /// The agent exited non-zero or otherwise signalled failure.
    Failure { reason: String },
}

/// Adapter interface for invoking the coding agent against a worktree.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run the agent for `task_id` with `prompt` in `cwd`, blocking until
    /// it finishes. Implementations are responsible for recording
    /// incremental progress into the durable store as the agent runs.
    async fn run(&self, task_id: &str, prompt: &str, cwd: &Path) -> Result<AgentOutcome>;
}
