//! `AgentRunner` implementation backed by the `claude` CLI.
//!
//! Grounded on `gator-core`'s `ClaudeCodeAdapter`: the same
//! `claude -p --output-format stream-json` invocation and JSONL parsing of
//! the `result`/`error` event types, collapsed to the blocking contract
//! `AgentRunner` wants -- spawn, drain stdout to completion, and translate
//! the final `result`/`error` line (or a non-zero exit) into one
//! [`AgentOutcome`], instead of streaming [`AgentEvent`]s to a caller.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use dockmaster_core::collaborators::{AgentOutcome, AgentRunner};

/// Runs the `claude` binary once per task and waits for it to exit.
pub struct ClaudeAgentRunner {
    claude_binary_path: String,
}

impl ClaudeAgentRunner {
    pub fn new() -> Self {
        Self {
            claude_binary_path: "claude".to_string(),
        }
    }

    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            claude_binary_path: path.into(),
        }
    }
}

impl Default for ClaudeAgentRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome implied by the final `result`/`error` line seen on stdout, if any.
enum StreamVerdict {
    Result(String),
    Error(String),
    None,
}

fn inspect_stream_json_line(line: &str, verdict: &mut StreamVerdict) {
    let Ok(v) = serde_json::from_str::<serde_json::Value>(line) else {
        debug!("ignoring malformed stream-json line");
        return;
    };
    match v.get("type").and_then(|t| t.as_str()).unwrap_or("") {
        "result" => {
            let text = v
                .get("result")
                .and_then(|r| r.as_str())
                .unwrap_or("")
                .to_string();
            *verdict = StreamVerdict::Result(text);
        }
        "error" => {
            let message = v
                .get("error")
                .and_then(|e| e.get("message").and_then(|m| m.as_str()))
                .or_else(|| v.get("message").and_then(|m| m.as_str()))
                .unwrap_or("unknown error")
                .to_string();
            *verdict = StreamVerdict::Error(message);
        }
        other => {
            debug!(event_type = other, "ignoring unrecognised stream-json event type");
        }
    }
}

#[async_trait]
impl AgentRunner for ClaudeAgentRunner {
    async fn run(&self, task_id: &str, prompt: &str, cwd: &Path) -> Result<AgentOutcome> {
        let mut cmd = Command::new(&self.claude_binary_path);
        cmd.arg("-p")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--allowedTools")
            .arg("Bash,Read,Edit,Write,Glob,Grep")
            .arg("--append-system-prompt")
            .arg(prompt)
            .current_dir(cwd)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "failed to spawn claude binary at '{}' for task {task_id} -- is it installed and on PATH?",
                self.claude_binary_path
            )
        })?;

        let stdout = child.stdout.take().context("child process has no stdout")?;
        let mut lines = BufReader::new(stdout).lines();

        let mut verdict = StreamVerdict::None;
        while let Some(line) = lines.next_line().await.context("failed to read claude stdout")? {
            inspect_stream_json_line(&line, &mut verdict);
        }

        let status = child.wait().await.context("failed to wait for claude process")?;

        if !status.success() {
            warn!(task_id, ?status, "claude exited non-zero");
            return Ok(AgentOutcome::Failure {
                reason: format!("claude exited with status {status}"),
            });
        }

        match verdict {
            StreamVerdict::Error(message) => Ok(AgentOutcome::Failure { reason: message }),
            StreamVerdict::Result(_) | StreamVerdict::None => Ok(AgentOutcome::Success),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_line_is_a_success_verdict() {
        let mut verdict = StreamVerdict::None;
        inspect_stream_json_line(
            r#"{"type":"result","result":"done","usage":{"input_tokens":1,"output_tokens":1}}"#,
            &mut verdict,
        );
        assert!(matches!(verdict, StreamVerdict::Result(_)));
    }

    #[test]
    fn error_line_is_an_error_verdict() {
        let mut verdict = StreamVerdict::None;
        inspect_stream_json_line(r#"{"type":"error","error":{"message":"boom"}}"#, &mut verdict);
        match verdict {
            StreamVerdict::Error(msg) => assert_eq!(msg, "boom"),
            _ => panic!("expected error verdict"),
        }
    }

    #[test]
    fn malformed_line_is_ignored() {
        let mut verdict = StreamVerdict::None;
        inspect_stream_json_line("not json", &mut verdict);
        assert!(matches!(verdict, StreamVerdict::None));
    }

    #[tokio::test]
    async fn missing_binary_returns_error() {
        let runner = ClaudeAgentRunner::with_binary("definitely-not-a-real-binary-xyz");
        let result = runner.run("w-1.1", "do the thing", Path::new("/tmp")).await;
        assert!(result.is_err());
    }
}
