use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Status of a [`Work`].
///
/// Transition graph (see the work state machine for the authoritative
/// edge list): `pending -> processing -> {idle, failed} -> {processing,
/// completed}`, plus `failed -> pending` via explicit restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Pending,
    Processing,
    Idle,
    Completed,
    Failed,
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Idle => "idle",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for WorkStatus {
    type Err = WorkStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "idle" => Ok(Self::Idle),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(WorkStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`WorkStatus`] string.
#[derive(Debug, Clone)]
pub struct WorkStatusParseError(pub String);

impl fmt::Display for WorkStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid work status: {:?}", self.0)
    }
}

impl std::error::Error for WorkStatusParseError {}

// ---------------------------------------------------------------------------

/// Kind of a [`Task`] -- determines the prompt the orchestrator builds for
/// the agent runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    Estimate,
    Implement,
    Review,
    Pr,
    UpdatePrDescription,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Estimate => "estimate",
            Self::Implement => "implement",
            Self::Review => "review",
            Self::Pr => "pr",
            Self::UpdatePrDescription => "update-pr-description",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskKind {
    type Err = TaskKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "estimate" => Ok(Self::Estimate),
            "implement" => Ok(Self::Implement),
            "review" => Ok(Self::Review),
            "pr" => Ok(Self::Pr),
            "update-pr-description" => Ok(Self::UpdatePrDescription),
            other => Err(TaskKindParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskKind`] string.
#[derive(Debug, Clone)]
pub struct TaskKindParseError(pub String);

impl fmt::Display for TaskKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task kind: {:?}", self.0)
    }
}

impl std::error::Error for TaskKindParseError {}

// ---------------------------------------------------------------------------

/// Status of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskStatus`] string.
#[derive(Debug, Clone)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

// ---------------------------------------------------------------------------

/// Kind of a [`ScheduledTask`] -- selects the C5 handler that runs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ScheduledTaskKind {
    CreateWorktree,
    SpawnOrchestrator,
    GitPush,
    GithubComment,
    GithubResolveThread,
    PrFeedback,
    CommentResolution,
    DestroyWorktree,
}

impl fmt::Display for ScheduledTaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CreateWorktree => "create-worktree",
            Self::SpawnOrchestrator => "spawn-orchestrator",
            Self::GitPush => "git-push",
            Self::GithubComment => "github-comment",
            Self::GithubResolveThread => "github-resolve-thread",
            Self::PrFeedback => "pr-feedback",
            Self::CommentResolution => "comment-resolution",
            Self::DestroyWorktree => "destroy-worktree",
        };
        f.write_str(s)
    }
}

impl FromStr for ScheduledTaskKind {
    type Err = ScheduledTaskKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create-worktree" => Ok(Self::CreateWorktree),
            "spawn-orchestrator" => Ok(Self::SpawnOrchestrator),
            "git-push" => Ok(Self::GitPush),
            "github-comment" => Ok(Self::GithubComment),
            "github-resolve-thread" => Ok(Self::GithubResolveThread),
            "pr-feedback" => Ok(Self::PrFeedback),
            "comment-resolution" => Ok(Self::CommentResolution),
            "destroy-worktree" => Ok(Self::DestroyWorktree),
            other => Err(ScheduledTaskKindParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ScheduledTaskKind`] string.
#[derive(Debug, Clone)]
pub struct ScheduledTaskKindParseError(pub String);

impl fmt::Display for ScheduledTaskKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid scheduled-task kind: {:?}", self.0)
    }
}

impl std::error::Error for ScheduledTaskKindParseError {}

// ---------------------------------------------------------------------------

/// Status of a [`ScheduledTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScheduledTaskStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl fmt::Display for ScheduledTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for ScheduledTaskStatus {
    type Err = ScheduledTaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "executing" => Ok(Self::Executing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ScheduledTaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ScheduledTaskStatus`] string.
#[derive(Debug, Clone)]
pub struct ScheduledTaskStatusParseError(pub String);

impl fmt::Display for ScheduledTaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid scheduled-task status: {:?}", self.0)
    }
}

impl std::error::Error for ScheduledTaskStatusParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A unit of agent-driven development for one root issue.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Work {
    pub id: String,
    pub worker_name: String,
    pub root_issue_id: String,
    pub branch_name: String,
    pub base_branch: String,
    pub worktree_path: Option<String>,
    pub status: WorkStatus,
    pub pr_url: Option<String>,
    pub pr_state: Option<String>,
    pub ci_status: Option<String>,
    pub approval_status: Option<String>,
    pub error_message: Option<String>,
    pub auto_workflow: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A bounded unit of agent invocation inside a [`Work`].
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: String,
    pub work_id: String,
    pub seq: i64,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub complexity_budget: Option<i64>,
    pub error_message: Option<String>,
    /// Opaque metadata map, persisted as a JSON object. Holds the
    /// `auto_workflow` marker semantics separately (see [`Task::auto_workflow_field`]).
    pub metadata: serde_json::Value,
    pub auto_workflow: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Absent or `"true"` means the orchestrator auto-chains this task;
    /// `"false"` means a human explicitly requested it and the orchestrator
    /// must not auto-chain follow-on tasks from it.
    pub fn is_auto_workflow(&self) -> bool {
        self.auto_workflow.as_deref() != Some("false")
    }
}

/// A row linking a [`Task`] to one of its assigned bead ids, in order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskBead {
    pub task_id: String,
    pub bead_id: String,
    pub position: i64,
}

/// A row linking a [`Work`] to one of its assigned bead ids.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkBead {
    pub work_id: String,
    pub bead_id: String,
}

/// A durable queue entry driving the control plane's dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduledTask {
    pub id: String,
    pub work_id: String,
    pub kind: ScheduledTaskKind,
    pub scheduled_at: DateTime<Utc>,
    pub attempt_count: i64,
    pub max_attempts: i64,
    pub status: ScheduledTaskStatus,
    pub metadata: serde_json::Value,
    pub idempotency_key: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub executing_since: Option<DateTime<Utc>>,
}

impl ScheduledTask {
    /// Read a string metadata value, if present.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_status_display_roundtrip() {
        let variants = [
            WorkStatus::Pending,
            WorkStatus::Processing,
            WorkStatus::Idle,
            WorkStatus::Completed,
            WorkStatus::Failed,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: WorkStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn work_status_invalid() {
        assert!("bogus".parse::<WorkStatus>().is_err());
    }

    #[test]
    fn task_kind_display_roundtrip() {
        let variants = [
            TaskKind::Estimate,
            TaskKind::Implement,
            TaskKind::Review,
            TaskKind::Pr,
            TaskKind::UpdatePrDescription,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: TaskKind = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn task_kind_invalid() {
        assert!("nope".parse::<TaskKind>().is_err());
    }

    #[test]
    fn task_status_display_roundtrip() {
        let variants = [
            TaskStatus::Pending,
            TaskStatus::Processing,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: TaskStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn scheduled_task_kind_display_roundtrip() {
        let variants = [
            ScheduledTaskKind::CreateWorktree,
            ScheduledTaskKind::SpawnOrchestrator,
            ScheduledTaskKind::GitPush,
            ScheduledTaskKind::GithubComment,
            ScheduledTaskKind::GithubResolveThread,
            ScheduledTaskKind::PrFeedback,
            ScheduledTaskKind::CommentResolution,
            ScheduledTaskKind::DestroyWorktree,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: ScheduledTaskKind = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn scheduled_task_kind_invalid() {
        assert!("unknown-kind".parse::<ScheduledTaskKind>().is_err());
    }

    #[test]
    fn scheduled_task_status_display_roundtrip() {
        let variants = [
            ScheduledTaskStatus::Pending,
            ScheduledTaskStatus::Executing,
            ScheduledTaskStatus::Completed,
            ScheduledTaskStatus::Failed,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: ScheduledTaskStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn task_auto_workflow_defaults_true() {
        let task = Task {
            id: "w-1.1".into(),
            work_id: "w-1".into(),
            seq: 1,
            kind: TaskKind::Implement,
            status: TaskStatus::Pending,
            complexity_budget: None,
            error_message: None,
            metadata: serde_json::json!({}),
            auto_workflow: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        assert!(task.is_auto_workflow());

        let manual = Task {
            auto_workflow: Some("false".to_string()),
            ..task
        };
        assert!(!manual.is_auto_workflow());
    }
}
