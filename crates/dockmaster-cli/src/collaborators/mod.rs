//! Concrete adapters for the external collaborator traits `dockmaster-core`
//! defines but leaves out of scope: git, tmux, GitHub, beads, and the
//! coding agent itself -- this system's boundary to the outside world.

pub mod beads_issue_tracker;
pub mod claude_agent_runner;
pub mod gh_pr_host;
pub mod git_vcs;
pub mod tmux_multiplexer;

pub use beads_issue_tracker::BeadsIssueTracker;
pub use claude_agent_runner::ClaudeAgentRunner;
pub use gh_pr_host::GhPrHost;
pub use git_vcs::GitVcs;
pub use tmux_multiplexer::TmuxMultiplexer;
