//! Run and project configuration
//!
//! A [`RunConfig`] describes one agent run. Project-level defaults and
//! goal-specific keys live in `<cwd>/.retrai.yml`, loaded through the
//! `config` crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::safety::SafetySettings;

/// What happens on the penultimate iteration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopMode {
    /// Warn the agent to spend the final iteration writing a summary report.
    Soft,
    /// No special treatment; the run just ends at the cap.
    Hard,
}

impl Default for StopMode {
    fn default() -> Self {
        StopMode::Soft
    }
}

/// Which execution pattern drives the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentPattern {
    /// Single plan/act/evaluate loop.
    Default,
    /// Mixture-of-Personas planning.
    Mop,
    /// Parallel multi-agent swarm.
    Swarm,
}

impl Default for AgentPattern {
    fn default() -> Self {
        AgentPattern::Default
    }
}

/// Configuration for a single agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Goal name (registry key) or free-text description, depending on entry point.
    pub goal: String,
    /// Absolute project root; all tool paths must resolve inside it.
    pub cwd: PathBuf,
    /// Model identifier consumed by the LLM factory.
    pub model_name: String,
    /// Iteration cap; the run terminates at or before this many evaluations.
    pub max_iterations: u32,
    pub stop_mode: StopMode,
    pub hitl_enabled: bool,
    pub agent_pattern: AgentPattern,
    /// Number of persona completions when `agent_pattern` is MoP.
    pub mop_k: u32,
    /// Cost ceiling in USD; 0 means unlimited.
    pub max_cost_usd: f64,
    /// Unique id used as checkpoint key and history file name.
    pub run_id: String,
}

impl RunConfig {
    /// Build a config with defaults, resolving `cwd` to an absolute path
    /// and minting a fresh run id.
    pub fn new(goal: impl Into<String>, cwd: impl AsRef<Path>) -> Self {
        let cwd = cwd.as_ref();
        let cwd = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());
        RunConfig {
            goal: goal.into(),
            cwd,
            model_name: "claude-sonnet-4-6".to_string(),
            max_iterations: 50,
            stop_mode: StopMode::default(),
            hitl_enabled: false,
            agent_pattern: AgentPattern::default(),
            mop_k: 3,
            max_cost_usd: 0.0,
            run_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Parsed contents of `<cwd>/.retrai.yml`.
///
/// Known keys are typed; goal-specific keys (`task`, `output_file`,
/// `target_score`, `topic`, `bench_name`, …) stay in `extra` and are
/// consumed by individual goals.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfig {
    pub goal: Option<String>,
    pub model: Option<String>,
    pub max_iterations: Option<u32>,
    pub hitl_enabled: Option<bool>,
    pub provider: Option<String>,
    pub safety: Option<SafetySettings>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl ProjectConfig {
    /// Fetch a goal-specific string key.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }

    /// Fetch a goal-specific numeric key.
    pub fn extra_f64(&self, key: &str) -> Option<f64> {
        self.extra.get(key).and_then(|v| v.as_f64())
    }
}

/// Load `.retrai.yml` from the project root, if present.
pub fn load_project_config(cwd: impl AsRef<Path>) -> Result<Option<ProjectConfig>> {
    let path = cwd.as_ref().join(".retrai.yml");
    if !path.exists() {
        return Ok(None);
    }
    let settings = config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Yaml))
        .build()?;
    Ok(Some(settings.try_deserialize()?))
}
