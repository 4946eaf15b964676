//! File watcher - auto-runs goals when project files change.
//!
//! Polling-based for cross-platform behavior; rapid changes are
//! debounced so the agent runs once per burst, and the snapshot is
//! refreshed after each run to swallow agent-induced changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};
use walkdir::WalkDir;

use crate::agent::{AgentState, GraphRunner, NodeContext, RunOutcome};
use crate::config::RunConfig;
use crate::events::EventBus;
use crate::goals::{detect_goal, get_goal};
use crate::llm::LlmFactory;
use crate::tools::create_default_registry;

/// Directories and extensions excluded from watching.
const IGNORE_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".ruff_cache",
    ".pytest_cache",
    "dist",
    "build",
    ".eggs",
    "target",
    ".retrai",
];

const IGNORE_EXTENSIONS: &[&str] = &[
    "pyc", "pyo", "so", "o", "a", "dll", "exe", "bin", "whl",
];

fn should_ignore(rel: &Path) -> bool {
    for component in rel.components() {
        if let std::path::Component::Normal(part) = component {
            if part
                .to_str()
                .map(|s| IGNORE_DIRS.contains(&s))
                .unwrap_or(false)
            {
                return true;
            }
        }
    }
    rel.extension()
        .and_then(|e| e.to_str())
        .map(|e| IGNORE_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

type Snapshot = HashMap<String, i64>;

/// Watch a project directory and trigger goal runs on change.
pub struct FileWatcher {
    cwd: PathBuf,
    goal_name: Option<String>,
    factory: Arc<dyn LlmFactory>,
    model_name: String,
    max_iterations: u32,
    debounce: Duration,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
}

impl FileWatcher {
    pub fn new(
        cwd: impl Into<PathBuf>,
        goal_name: Option<String>,
        factory: Arc<dyn LlmFactory>,
        model_name: impl Into<String>,
        max_iterations: u32,
        debounce_ms: u64,
        poll_interval_ms: u64,
    ) -> Self {
        FileWatcher {
            cwd: cwd.into(),
            goal_name,
            factory,
            model_name: model_name.into(),
            max_iterations,
            debounce: Duration::from_millis(debounce_ms),
            poll_interval: Duration::from_millis(poll_interval_ms),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle to stop the watch loop from another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    fn take_snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for entry in WalkDir::new(&self.cwd).into_iter().flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.cwd) else {
                continue;
            };
            if should_ignore(rel) {
                continue;
            }
            if let Ok(metadata) = entry.metadata() {
                let mtime = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0);
                snapshot.insert(rel.to_string_lossy().to_string(), mtime);
            }
        }
        snapshot
    }

    fn detect_changes(old: &Snapshot, new: &Snapshot) -> Vec<String> {
        let mut changed: Vec<String> = Vec::new();
        for (path, mtime) in new {
            if old.get(path) != Some(mtime) {
                changed.push(path.clone());
            }
        }
        for path in old.keys() {
            if !new.contains_key(path) {
                changed.push(path.clone());
            }
        }
        changed
    }

    /// Main watch loop. Blocks until the stop handle is cleared.
    pub async fn run(&self) -> crate::Result<()> {
        self.running.store(true, Ordering::SeqCst);
        let mut snapshot = self.take_snapshot();

        info!(
            "Watching {} for changes (debounce: {}ms)",
            self.cwd.display(),
            self.debounce.as_millis()
        );

        let mut last_change: Option<Instant> = None;
        let mut pending: Vec<String> = Vec::new();

        while self.running.load(Ordering::SeqCst) {
            tokio::time::sleep(self.poll_interval).await;

            let new_snapshot = self.take_snapshot();
            let changes = Self::detect_changes(&snapshot, &new_snapshot);
            if !changes.is_empty() {
                snapshot = new_snapshot;
                pending = changes;
                last_change = Some(Instant::now());
            }

            let debounced = last_change
                .map(|t| t.elapsed() >= self.debounce)
                .unwrap_or(false);
            if !pending.is_empty() && debounced {
                info!("{} file(s) changed, triggering run", pending.len());
                if let Err(e) = self.trigger_run().await {
                    error!("Watch run failed: {}", e);
                }
                pending.clear();
                last_change = None;
                // The agent may have written files; swallow its changes.
                snapshot = self.take_snapshot();
            }
        }
        Ok(())
    }

    async fn trigger_run(&self) -> crate::Result<AgentState> {
        let goal_name = self
            .goal_name
            .clone()
            .unwrap_or_else(|| detect_goal(&self.cwd).to_string());
        let goal = get_goal(&goal_name, self.factory.clone())?;

        let bus = Arc::new(EventBus::new());
        let ctx = NodeContext::new(
            bus.clone(),
            Some(goal),
            Arc::new(create_default_registry()),
            self.factory.clone(),
        );
        let runner = GraphRunner::new(ctx);

        let mut cfg = RunConfig::new(goal_name, &self.cwd);
        cfg.model_name = self.model_name.clone();
        cfg.max_iterations = self.max_iterations;
        let state = AgentState::from_config(&cfg);

        let outcome = runner.run(state).await;
        bus.close();
        match outcome? {
            RunOutcome::Completed(state) => Ok(*state),
            RunOutcome::Suspended { run_id } => Err(crate::Error::Internal(format!(
                "watch run {} suspended unexpectedly",
                run_id
            ))),
        }
    }
}
