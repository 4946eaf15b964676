//! Shell execution tool
//!
//! Runs arbitrary shell commands in the project root with a per-call
//! timeout. The safety guard screens the command string before this
//! adapter is ever invoked.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use super::traits::{Tool, ToolOutput};
use super::{truncate_output, OUTPUT_CAP};
use crate::error::Result;

const DEFAULT_TIMEOUT_SECS: f64 = 60.0;

/// Built-in tool: run a shell command
pub struct BashExecTool {
    default_timeout: Duration,
}

impl BashExecTool {
    pub fn new() -> Self {
        BashExecTool {
            default_timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Default for BashExecTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for BashExecTool {
    fn name(&self) -> &str {
        "bash_exec"
    }

    fn description(&self) -> &str {
        "Run any shell command in the project root (tests, scripts, package managers, etc.)"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "number",
                    "description": "Timeout in seconds (default 60)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: &Value, cwd: &Path) -> Result<ToolOutput> {
        let command = match args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return Ok(ToolOutput::err("Missing 'command' parameter")),
        };
        let timeout = args
            .get("timeout")
            .and_then(|v| v.as_f64())
            .map(Duration::from_secs_f64)
            .unwrap_or(self.default_timeout);

        debug!("bash_exec: {}", command.chars().take(120).collect::<String>());

        let child = Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(c) => c,
            Err(e) => return Ok(ToolOutput::err(format!("Failed to spawn shell: {}", e))),
        };

        // kill_on_drop tears the child down when the timeout wins the race
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Ok(ToolOutput::err(format!("Command failed: {}", e))),
            Err(_) => return Ok(ToolOutput::err("Command timed out")),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let framed = format!(
            "EXIT CODE: {}\nSTDOUT:\n{}\nSTDERR:\n{}",
            output.status.code().unwrap_or(-1),
            stdout,
            stderr
        );
        Ok(ToolOutput::ok(truncate_output(&framed, OUTPUT_CAP)))
    }
}
