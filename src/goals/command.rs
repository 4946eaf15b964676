//! Command-backed goals - run a subprocess and interpret its exit code.
//!
//! Covers the test-runner family (cargo/pytest/npm/go/make) and the
//! command-success family (lint, arbitrary shell command from config).

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;

use crate::agent::AgentState;
use crate::config::load_project_config;
use crate::goals::{Goal, GoalResult};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
const TAIL_CHARS: usize = 600;

/// Run a shell command, returning (exit_code, combined_output_tail).
async fn run_check_command(command: &str, cwd: &Path) -> (i32, String) {
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
        Err(e) => return (-1, format!("failed to spawn: {}", e)),
    };

    match tokio::time::timeout(COMMAND_TIMEOUT, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            let tail: String = combined
                .chars()
                .rev()
                .take(TAIL_CHARS)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            (output.status.code().unwrap_or(-1), tail)
        }
        Ok(Err(e)) => (-1, format!("command failed: {}", e)),
        Err(_) => (-1, "command timed out".to_string()),
    }
}

/// Generic goal: succeed iff a fixed command exits 0.
pub struct CommandGoal {
    name: &'static str,
    command: String,
    task_description: String,
}

impl CommandGoal {
    pub fn new(
        name: &'static str,
        command: impl Into<String>,
        task_description: impl Into<String>,
    ) -> Self {
        CommandGoal {
            name,
            command: command.into(),
            task_description: task_description.into(),
        }
    }

    /// Test-runner goals for the common project types.
    pub fn cargo_test() -> Self {
        Self::new(
            "cargo-test",
            "cargo test --quiet",
            "Make the Rust test suite pass (`cargo test`).",
        )
    }

    pub fn pytest() -> Self {
        Self::new(
            "pytest",
            "python3 -m pytest -q",
            "Make the Python test suite pass (`pytest`).",
        )
    }

    pub fn npm_test() -> Self {
        Self::new(
            "npm-test",
            "npm test --silent",
            "Make the JavaScript test suite pass (`npm test`).",
        )
    }

    pub fn go_test() -> Self {
        Self::new(
            "go-test",
            "go test ./...",
            "Make the Go test suite pass (`go test ./...`).",
        )
    }

    pub fn make_test() -> Self {
        Self::new(
            "make-test",
            "make test",
            "Make the project's `make test` target pass.",
        )
    }
}

#[async_trait]
impl Goal for CommandGoal {
    fn name(&self) -> &str {
        self.name
    }

    async fn check(&self, _state: &AgentState, cwd: &Path) -> GoalResult {
        let (exit_code, tail) = run_check_command(&self.command, cwd).await;
        if exit_code == 0 {
            GoalResult::achieved(format!("`{}` exited 0", self.command))
                .with_details(json!({"exit_code": exit_code}))
        } else {
            GoalResult::not_achieved(format!(
                "`{}` exited {}. Output tail:\n{}",
                self.command, exit_code, tail
            ))
            .with_details(json!({"exit_code": exit_code}))
        }
    }

    fn system_prompt(&self, _cwd: &Path) -> String {
        format!(
            "## Goal\n{}\n\nThe goal check runs `{}` after each iteration; \
             you are done when it exits 0.\n\n\
             Work methodically: run the command yourself with `bash_exec`, \
             read failures carefully, fix the root cause, and re-run to verify.",
            self.task_description, self.command
        )
    }
}

/// Goal: succeed iff the `command` key from `.retrai.yml` exits 0.
pub struct ShellGoal;

impl ShellGoal {
    fn configured_command(cwd: &Path) -> Option<String> {
        load_project_config(cwd)
            .ok()
            .flatten()
            .and_then(|cfg| cfg.extra_str("command").map(|s| s.to_string()))
    }
}

#[async_trait]
impl Goal for ShellGoal {
    fn name(&self) -> &str {
        "shell"
    }

    async fn check(&self, _state: &AgentState, cwd: &Path) -> GoalResult {
        let Some(command) = Self::configured_command(cwd) else {
            return GoalResult::not_achieved(
                "No 'command' key in .retrai.yml — configure the shell goal first.",
            );
        };
        let (exit_code, tail) = run_check_command(&command, cwd).await;
        if exit_code == 0 {
            GoalResult::achieved(format!("`{}` exited 0", command))
        } else {
            GoalResult::not_achieved(format!(
                "`{}` exited {}. Output tail:\n{}",
                command, exit_code, tail
            ))
        }
    }

    fn system_prompt(&self, cwd: &Path) -> String {
        let command = Self::configured_command(cwd)
            .unwrap_or_else(|| "<set 'command' in .retrai.yml>".to_string());
        format!(
            "## Goal: Make a command succeed\n\n\
             The check command is: `{}`\n\
             You are done when it exits 0. Run it, read the failures, fix \
             the project, and verify.",
            command
        )
    }
}

/// Goal: project lints cleanly with an auto-detected linter.
pub struct LintGoal;

impl LintGoal {
    /// Pick a linter from the project manifest and available executables.
    fn detect_command(cwd: &Path) -> Option<String> {
        if cwd.join("Cargo.toml").exists() && which::which("cargo").is_ok() {
            return Some("cargo clippy --quiet -- -D warnings".to_string());
        }
        if cwd.join("pyproject.toml").exists() && which::which("ruff").is_ok() {
            return Some("ruff check .".to_string());
        }
        if cwd.join("package.json").exists() && which::which("npx").is_ok() {
            return Some("npx eslint .".to_string());
        }
        None
    }
}

#[async_trait]
impl Goal for LintGoal {
    fn name(&self) -> &str {
        "lint"
    }

    async fn check(&self, _state: &AgentState, cwd: &Path) -> GoalResult {
        let Some(command) = Self::detect_command(cwd) else {
            return GoalResult::not_achieved(
                "No supported linter detected for this project (cargo clippy, ruff, eslint).",
            );
        };
        let (exit_code, tail) = run_check_command(&command, cwd).await;
        if exit_code == 0 {
            GoalResult::achieved(format!("`{}` exited 0 — lint clean", command))
        } else {
            GoalResult::not_achieved(format!(
                "`{}` exited {}. Output tail:\n{}",
                command, exit_code, tail
            ))
        }
    }

    fn system_prompt(&self, cwd: &Path) -> String {
        let command = Self::detect_command(cwd)
            .unwrap_or_else(|| "<no supported linter detected>".to_string());
        format!(
            "## Goal: Clean lint\n\n\
             Fix every lint warning and error until `{}` exits 0.\n\
             Prefer minimal, targeted fixes over suppressing diagnostics.",
            command
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;

    fn state_for(dir: &Path) -> AgentState {
        AgentState::from_config(&RunConfig::new("shell", dir))
    }

    #[tokio::test]
    async fn shell_goal_achieved_on_exit_zero() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".retrai.yml"), "goal: shell\ncommand: \"true\"\n")
            .unwrap();
        let state = state_for(dir.path());
        let result = ShellGoal.check(&state, dir.path()).await;
        assert!(result.achieved, "{}", result.reason);
    }

    #[tokio::test]
    async fn shell_goal_fails_on_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".retrai.yml"), "goal: shell\ncommand: \"false\"\n")
            .unwrap();
        let state = state_for(dir.path());
        let result = ShellGoal.check(&state, dir.path()).await;
        assert!(!result.achieved);
        assert!(result.reason.contains("exited 1"));
    }

    #[tokio::test]
    async fn shell_goal_without_config_explains_itself() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path());
        let result = ShellGoal.check(&state, dir.path()).await;
        assert!(!result.achieved);
        assert!(result.reason.contains(".retrai.yml"));
    }

    #[tokio::test]
    async fn command_goal_reports_output_tail() {
        let dir = tempfile::tempdir().unwrap();
        let goal = CommandGoal::new("shell-test", "echo broken && exit 2", "test");
        let state = state_for(dir.path());
        let result = goal.check(&state, dir.path()).await;
        assert!(!result.achieved);
        assert!(result.reason.contains("broken"));
        assert_eq!(result.details["exit_code"], 2);
    }

    #[test]
    fn builtin_commands_have_stable_names() {
        assert_eq!(CommandGoal::cargo_test().name(), "cargo-test");
        assert_eq!(CommandGoal::pytest().name(), "pytest");
        assert_eq!(CommandGoal::npm_test().name(), "npm-test");
    }
}
