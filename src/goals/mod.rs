//! Goal protocol - pluggable "what does done look like" objects
//!
//! A goal exposes a stable name, a side-effect-free `check` (it may
//! consult the LLM-as-judge helper but must never mutate files), and a
//! `system_prompt` describing the task to the LLM.
//!
//! ## Goal families
//!
//! - test-runner / command-success goals shell out and interpret exit
//!   codes ([`command`])
//! - threshold goals parse structured output against a target ([`bench`])
//! - phase goals count artifacts on disk ([`research`])
//! - LLM-as-judge goals score project state via the shared judge helper
//!   ([`solver`], [`creative`], [`score`], [`text_improve`])

mod bench;
mod command;
mod creative;
pub mod judge;
mod registry;
mod research;
mod score;
mod solver;
mod text_improve;

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::AgentState;

pub use bench::BenchThresholdGoal;
pub use command::{CommandGoal, LintGoal, ShellGoal};
pub use creative::CreativeGoal;
pub use registry::{detect_goal, get_goal, get_solver_goal, list_goals};
pub use research::ResearchGoal;
pub use score::ScoreGoal;
pub use solver::SolverGoal;
pub use text_improve::TextImproveGoal;

/// Outcome of one goal evaluation.
#[derive(Debug, Clone)]
pub struct GoalResult {
    pub achieved: bool,
    pub reason: String,
    pub details: Value,
}

impl GoalResult {
    pub fn achieved(reason: impl Into<String>) -> Self {
        GoalResult {
            achieved: true,
            reason: reason.into(),
            details: Value::Object(Default::default()),
        }
    }

    pub fn not_achieved(reason: impl Into<String>) -> Self {
        GoalResult {
            achieved: false,
            reason: reason.into(),
            details: Value::Object(Default::default()),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// A pluggable goal.
#[async_trait]
pub trait Goal: Send + Sync {
    /// Stable identifier for registry lookup.
    fn name(&self) -> &str;

    /// Evaluate the project state. MUST be side-effect-free apart from
    /// optionally invoking the LLM judge, and MUST NOT mutate files.
    async fn check(&self, state: &AgentState, cwd: &Path) -> GoalResult;

    /// Describe the task to the LLM.
    fn system_prompt(&self, cwd: &Path) -> String;
}

impl std::fmt::Debug for dyn Goal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Goal").field("name", &self.name()).finish()
    }
}
