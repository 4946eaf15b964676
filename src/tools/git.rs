//! Git inspection tools - diff, status, log
//!
//! Read-only views of the working tree; all three are parallel-safe.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use super::traits::{Tool, ToolOutput};
use super::{truncate_output, OUTPUT_CAP, STATUS_CAP};
use crate::error::Result;

/// Run a git subcommand and capture stdout; non-zero exit becomes an
/// error string.
pub(crate) async fn run_git(cwd: &Path, args: &[&str]) -> (String, bool) {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            (String::from_utf8_lossy(&output.stdout).to_string(), false)
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            (format!("git {} failed: {}", args.first().unwrap_or(&"?"), stderr.trim()), true)
        }
        Err(e) => (format!("Failed to run git: {}", e), true),
    }
}

/// Uncommitted changes as a unified diff; used by the review engine and
/// judge-based goals as well as the LLM itself.
pub(crate) async fn git_diff_text(cwd: &Path, staged: bool) -> String {
    let args: &[&str] = if staged { &["diff", "--staged"] } else { &["diff"] };
    let (content, error) = run_git(cwd, args).await;
    if error {
        String::new()
    } else {
        content
    }
}

/// Built-in tool: show uncommitted changes
pub struct GitDiffTool;

#[async_trait]
impl Tool for GitDiffTool {
    fn name(&self) -> &str {
        "git_diff"
    }

    fn description(&self) -> &str {
        "Show uncommitted changes in the working tree"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "staged": {"type": "boolean", "description": "Show staged changes only (default false)"}
            },
            "required": []
        })
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Value, cwd: &Path) -> Result<ToolOutput> {
        let staged = args.get("staged").and_then(|v| v.as_bool()).unwrap_or(false);
        let git_args: &[&str] = if staged { &["diff", "--staged"] } else { &["diff"] };
        let (content, error) = run_git(cwd, git_args).await;
        let content = truncate_output(&content, OUTPUT_CAP);
        Ok(if error {
            ToolOutput::err(content)
        } else {
            ToolOutput::ok(content)
        })
    }
}

/// Built-in tool: working tree status
pub struct GitStatusTool;

#[async_trait]
impl Tool for GitStatusTool {
    fn name(&self) -> &str {
        "git_status"
    }

    fn description(&self) -> &str {
        "Show git working tree status"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    async fn execute(&self, _args: &Value, cwd: &Path) -> Result<ToolOutput> {
        let (content, error) = run_git(cwd, &["status"]).await;
        let content = truncate_output(&content, STATUS_CAP);
        Ok(if error {
            ToolOutput::err(content)
        } else {
            ToolOutput::ok(content)
        })
    }
}

/// Built-in tool: recent commit history
pub struct GitLogTool;

#[async_trait]
impl Tool for GitLogTool {
    fn name(&self) -> &str {
        "git_log"
    }

    fn description(&self) -> &str {
        "Show recent commit history"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "count": {"type": "integer", "description": "Number of commits to show (default 10)"}
            },
            "required": []
        })
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Value, cwd: &Path) -> Result<ToolOutput> {
        let count = args.get("count").and_then(|v| v.as_u64()).unwrap_or(10);
        let count_arg = format!("-{}", count);
        let (content, error) = run_git(cwd, &["log", "--oneline", &count_arg]).await;
        let content = truncate_output(&content, STATUS_CAP);
        Ok(if error {
            ToolOutput::err(content)
        } else {
            ToolOutput::ok(content)
        })
    }
}
