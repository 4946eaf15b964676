//! Goal registry - maps goal name strings to Goal instances.

use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::llm::LlmFactory;

use super::command::{CommandGoal, LintGoal, ShellGoal};
use super::creative::CreativeGoal;
use super::research::ResearchGoal;
use super::score::ScoreGoal;
use super::solver::SolverGoal;
use super::text_improve::TextImproveGoal;
use super::{BenchThresholdGoal, Goal};

const GOAL_NAMES: &[&str] = &[
    "cargo-test",
    "pytest",
    "npm-test",
    "go-test",
    "make-test",
    "shell",
    "lint",
    "bench",
    "research",
    "creative",
    "score",
    "text-improve",
];

/// Return a goal by name.
///
/// Judge-based goals receive the LLM factory; the rest ignore it.
pub fn get_goal(name: &str, factory: Arc<dyn LlmFactory>) -> Result<Arc<dyn Goal>> {
    let goal: Arc<dyn Goal> = match name {
        "cargo-test" => Arc::new(CommandGoal::cargo_test()),
        "pytest" => Arc::new(CommandGoal::pytest()),
        "npm-test" => Arc::new(CommandGoal::npm_test()),
        "go-test" => Arc::new(CommandGoal::go_test()),
        "make-test" => Arc::new(CommandGoal::make_test()),
        "shell" => Arc::new(ShellGoal),
        "lint" => Arc::new(LintGoal),
        "bench" => Arc::new(BenchThresholdGoal),
        "research" => Arc::new(ResearchGoal::new("")),
        "creative" => Arc::new(CreativeGoal::new(factory)),
        "score" => Arc::new(ScoreGoal::new(factory)),
        "text-improve" => Arc::new(TextImproveGoal::new(factory)),
        _ => {
            return Err(Error::Config(format!(
                "Unknown goal: '{}'. Available: {}",
                name,
                GOAL_NAMES.join(", ")
            )))
        }
    };
    Ok(goal)
}

/// Create a SolverGoal for natural language problem solving.
pub fn get_solver_goal(
    description: impl Into<String>,
    factory: Arc<dyn LlmFactory>,
) -> Arc<dyn Goal> {
    Arc::new(SolverGoal::new(description, factory))
}

/// Names of all registered goals.
pub fn list_goals() -> Vec<&'static str> {
    GOAL_NAMES.to_vec()
}

/// Pick a default goal for a project from its manifest files.
pub fn detect_goal(cwd: &Path) -> &'static str {
    if cwd.join("Cargo.toml").exists() {
        "cargo-test"
    } else if cwd.join("pyproject.toml").exists() || cwd.join("pytest.ini").exists() {
        "pytest"
    } else if cwd.join("package.json").exists() {
        "npm-test"
    } else if cwd.join("go.mod").exists() {
        "go-test"
    } else if cwd.join("Makefile").exists() {
        "make-test"
    } else {
        "shell"
    }
}
