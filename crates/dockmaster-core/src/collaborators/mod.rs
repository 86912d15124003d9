//! External collaborator interfaces.
//!
//! Everything the control plane talks to outside its own durable store --
//! the issue tracker, git, the PR host, the multiplexer, and the agent
//! runner -- is reached through a narrow async trait here rather than a
//! concrete client. Handlers and the orchestrator depend only on these
//! traits, so tests substitute fakes instead of shelling out.

pub mod agent_runner;
pub mod issue_tracker;
pub mod multiplexer;
pub mod pr_host;
pub mod vcs;

pub use agent_runner::{AgentOutcome, AgentRunner};
pub use issue_tracker::{Bead, BeadStatus, IssueTracker};
pub use multiplexer::Multiplexer;
pub use pr_host::{PrHost, PrSnapshot, ReviewThread};
pub use vcs::{MergeOutcome, Vcs};
