//! Sandboxed subprocess execution with a minimal environment.
//!
//! Invariant: sandboxed processes MUST NOT observe host environment
//! variables outside the allowlist below, plus a minimal `PATH` and the
//! pointers the sandbox itself needs. The sandbox root lives under
//! `<cwd>/.retrai/sandbox` and is created lazily; creation is idempotent.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Host variables a sandboxed process is allowed to inherit.
pub const ENV_ALLOWLIST: &[&str] = &["HOME", "USER", "LANG", "LC_ALL", "TERM", "TMPDIR"];

/// Minimal search path handed to sandboxed processes.
const SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Output of one sandboxed subprocess.
#[derive(Debug, Clone)]
pub struct SandboxOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Sandbox working directory for a project.
pub fn sandbox_dir(cwd: &Path) -> PathBuf {
    cwd.join(".retrai").join("sandbox")
}

/// The environment a sandboxed process receives: allowlisted host vars
/// plus the minimal `PATH`.
pub fn sanitized_env() -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = ENV_ALLOWLIST
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
        .collect();
    env.push(("PATH".to_string(), SANDBOX_PATH.to_string()));
    env
}

/// Run `program` with `args` inside the project sandbox.
///
/// The child starts from an empty environment, gets only the sanitized
/// set, and is killed when `timeout` elapses.
pub async fn run_sandboxed(
    cwd: &Path,
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<SandboxOutput> {
    let dir = sandbox_dir(cwd);
    tokio::fs::create_dir_all(&dir).await?;

    debug!("sandbox exec: {} (timeout {:?})", program, timeout);

    let child = Command::new(program)
        .args(args)
        .current_dir(&dir)
        .env_clear()
        .envs(sanitized_env())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Sandbox(format!("Failed to spawn '{}': {}", program, e)))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(SandboxOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            timed_out: false,
        }),
        Ok(Err(e)) => Err(Error::Sandbox(format!("Sandbox process failed: {}", e))),
        Err(_) => Ok(SandboxOutput {
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_env_has_only_allowlisted_vars() {
        let env = sanitized_env();
        for (key, _) in &env {
            assert!(
                key == "PATH" || ENV_ALLOWLIST.contains(&key.as_str()),
                "unexpected env var leaked into sandbox: {}",
                key
            );
        }
        assert!(env.iter().any(|(k, _)| k == "PATH"));
    }

    #[tokio::test]
    async fn sandbox_does_not_leak_host_env() {
        // A variable that is certainly set in the host but not allowlisted.
        std::env::set_var("RETRAI_SECRET_PROBE", "leaky");
        let dir = tempfile::tempdir().unwrap();
        let out = run_sandboxed(
            dir.path(),
            "sh",
            &["-c", "echo probe=${RETRAI_SECRET_PROBE:-unset}"],
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        assert!(out.stdout.contains("probe=unset"), "stdout: {}", out.stdout);
    }

    #[tokio::test]
    async fn sandbox_dir_is_created_lazily_and_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!sandbox_dir(dir.path()).exists());
        for _ in 0..2 {
            run_sandboxed(dir.path(), "sh", &["-c", "true"], Duration::from_secs(10))
                .await
                .unwrap();
        }
        assert!(sandbox_dir(dir.path()).is_dir());
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_sandboxed(
            dir.path(),
            "sh",
            &["-c", "sleep 30"],
            Duration::from_millis(200),
        )
        .await
        .unwrap();
        assert!(out.timed_out);
    }
}
