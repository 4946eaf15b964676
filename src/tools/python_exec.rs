//! Python execution tool - runs code in the project sandbox

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{Tool, ToolOutput};
use super::{truncate_output, OUTPUT_CAP};
use crate::error::Result;
use crate::sandbox::run_sandboxed;

const DEFAULT_TIMEOUT_SECS: f64 = 30.0;

/// Built-in tool: execute Python in an isolated sandbox (no host env vars)
pub struct PythonExecTool {
    default_timeout: Duration,
}

impl PythonExecTool {
    pub fn new() -> Self {
        PythonExecTool {
            default_timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Default for PythonExecTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for PythonExecTool {
    fn name(&self) -> &str {
        "python_exec"
    }

    fn description(&self) -> &str {
        "Execute Python code in an isolated sandbox (no host env vars). \
         Good for quick experiments and safe computations."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {"type": "string", "description": "Python code to execute"},
                "timeout": {"type": "number", "description": "Timeout in seconds (default 30)"}
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: &Value, cwd: &Path) -> Result<ToolOutput> {
        let code = match args.get("code").and_then(|v| v.as_str()) {
            Some(c) => c,
            None => return Ok(ToolOutput::err("Missing 'code' parameter")),
        };
        let timeout = args
            .get("timeout")
            .and_then(|v| v.as_f64())
            .map(Duration::from_secs_f64)
            .unwrap_or(self.default_timeout);

        let result = match run_sandboxed(cwd, "python3", &["-c", code], timeout).await {
            Ok(r) => r,
            Err(e) => return Ok(ToolOutput::err(e.to_string())),
        };
        if result.timed_out {
            return Ok(ToolOutput::err("Python execution timed out"));
        }
        let framed = format!(
            "EXIT CODE: {}\nSTDOUT:\n{}\nSTDERR:\n{}",
            result.exit_code, result.stdout, result.stderr
        );
        Ok(ToolOutput::ok(truncate_output(&framed, OUTPUT_CAP)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn executes_python_when_available() {
        if which::which("python3").is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let out = PythonExecTool::new()
            .execute(&json!({"code": "print(21 * 2)"}), dir.path())
            .await
            .unwrap();
        assert!(!out.error, "{}", out.content);
        assert!(out.content.contains("42"));
    }

    #[tokio::test]
    async fn missing_code_is_an_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let out = PythonExecTool::new()
            .execute(&json!({}), dir.path())
            .await
            .unwrap();
        assert!(out.error);
    }
}
