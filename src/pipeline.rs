//! Pipeline runner - chain multiple goals sequentially.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::agent::{AgentState, GraphRunner, NodeContext, RunOutcome};
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::goals::{get_goal, list_goals};
use crate::llm::LlmFactory;
use crate::tools::create_default_registry;

/// Result of a single pipeline step.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub goal_name: String,
    pub achieved: bool,
    pub reason: String,
    pub iterations_used: u32,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

/// Aggregated result of a full pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    pub steps: Vec<StepResult>,
    /// "achieved" | "partial" | "failed"
    pub status: String,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub total_duration: f64,
}

impl PipelineResult {
    pub fn passed(&self) -> usize {
        self.steps.iter().filter(|s| s.achieved).count()
    }

    pub fn failed(&self) -> usize {
        self.steps.iter().filter(|s| !s.achieved).count()
    }
}

/// Run multiple goals in sequence, each with a fresh state and bus.
pub struct PipelineRunner {
    steps: Vec<String>,
    cwd: PathBuf,
    factory: Arc<dyn LlmFactory>,
    model_name: String,
    max_iterations_per_step: u32,
    continue_on_error: bool,
}

impl PipelineRunner {
    /// Validates all goal names upfront so a typo fails before any work
    /// starts.
    pub fn new(
        steps: Vec<String>,
        cwd: impl Into<PathBuf>,
        factory: Arc<dyn LlmFactory>,
        model_name: impl Into<String>,
        max_iterations_per_step: u32,
        continue_on_error: bool,
    ) -> Result<Self> {
        let available = list_goals();
        for step in &steps {
            if !available.contains(&step.as_str()) {
                return Err(Error::Config(format!(
                    "Unknown goal '{}'. Available: {}",
                    step,
                    available.join(", ")
                )));
            }
        }
        Ok(PipelineRunner {
            steps,
            cwd: cwd.into(),
            factory,
            model_name: model_name.into(),
            max_iterations_per_step,
            continue_on_error,
        })
    }

    /// Execute all pipeline steps sequentially.
    pub async fn run(&self) -> PipelineResult {
        let mut result = PipelineResult::default();
        let pipeline_start = Instant::now();

        for (i, goal_name) in self.steps.iter().enumerate() {
            info!("Pipeline step {}/{}: {}", i + 1, self.steps.len(), goal_name);

            let step_result = self.run_step(goal_name).await;
            result.total_tokens += step_result.tokens_used;
            result.total_cost += step_result.cost_usd;
            let stop = !step_result.achieved && !self.continue_on_error;
            if stop {
                warn!(
                    "Pipeline stopped at step {} ({}): {}",
                    i + 1,
                    goal_name,
                    step_result.reason
                );
            }
            result.steps.push(step_result);
            if stop {
                break;
            }
        }

        result.total_duration = pipeline_start.elapsed().as_secs_f64();
        result.status = if result.steps.iter().all(|s| s.achieved) && !result.steps.is_empty() {
            "achieved".to_string()
        } else if result.steps.iter().any(|s| s.achieved) {
            "partial".to_string()
        } else {
            "failed".to_string()
        };
        result
    }

    async fn run_step(&self, goal_name: &str) -> StepResult {
        let step_start = Instant::now();

        let goal = match get_goal(goal_name, self.factory.clone()) {
            Ok(g) => g,
            Err(e) => {
                return StepResult {
                    goal_name: goal_name.to_string(),
                    achieved: false,
                    reason: e.to_string(),
                    iterations_used: 0,
                    tokens_used: 0,
                    cost_usd: 0.0,
                    duration_seconds: step_start.elapsed().as_secs_f64(),
                    error: Some(e.to_string()),
                }
            }
        };

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
        cfg.max_iterations = self.max_iterations_per_step;
        let state = AgentState::from_config(&cfg);

        let outcome = runner.run(state).await;
        bus.close();

        match outcome {
            Ok(RunOutcome::Completed(final_state)) => StepResult {
                goal_name: goal_name.to_string(),
                achieved: final_state.goal_achieved,
                reason: final_state.goal_reason.clone(),
                iterations_used: final_state.iteration,
                tokens_used: final_state.total_tokens,
                cost_usd: final_state.estimated_cost_usd,
                duration_seconds: step_start.elapsed().as_secs_f64(),
                error: None,
            },
            Ok(RunOutcome::Suspended { .. }) => StepResult {
                goal_name: goal_name.to_string(),
                achieved: false,
                reason: "Step suspended unexpectedly".to_string(),
                iterations_used: 0,
                tokens_used: 0,
                cost_usd: 0.0,
                duration_seconds: step_start.elapsed().as_secs_f64(),
                error: Some("suspended".to_string()),
            },
            Err(e) => StepResult {
                goal_name: goal_name.to_string(),
                achieved: false,
                reason: format!("Step crashed: {}", e),
                iterations_used: 0,
                tokens_used: 0,
                cost_usd: 0.0,
                duration_seconds: step_start.elapsed().as_secs_f64(),
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{ScriptedFactory, ScriptedLlm};

    fn factory() -> Arc<dyn LlmFactory> {
        Arc::new(ScriptedFactory(ScriptedLlm::new(vec![
            ScriptedLlm::text_reply("working on it", 10, 5),
        ])))
    }

    #[test]
    fn unknown_goal_fails_fast() {
        let err = PipelineRunner::new(
            vec!["cargo-test".to_string(), "nonsense".to_string()],
            "/tmp",
            factory(),
            "test-model",
            5,
            false,
        );
        assert!(err.is_err());
        assert!(err.err().unwrap().to_string().contains("nonsense"));
    }

    #[tokio::test]
    async fn stops_on_first_failure_by_default() {
        let dir = tempfile::tempdir().unwrap();
        // Shell goal with no config never achieves.
        let runner = PipelineRunner::new(
            vec!["shell".to_string(), "shell".to_string()],
            dir.path(),
            factory(),
            "test-model",
            1,
            false,
        )
        .unwrap();

        let result = runner.run().await;
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.status, "failed");
        assert_eq!(result.passed(), 0);
        assert_eq!(result.failed(), 1);
    }

    #[tokio::test]
    async fn continue_on_error_runs_all_steps() {
        let dir = tempfile::tempdir().unwrap();
        let runner = PipelineRunner::new(
            vec!["shell".to_string(), "shell".to_string()],
            dir.path(),
            factory(),
            "test-model",
            1,
            true,
        )
        .unwrap();

        let result = runner.run().await;
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.status, "failed");
    }

    #[tokio::test]
    async fn achieved_steps_aggregate_to_achieved() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".retrai.yml"), "goal: shell\ncommand: \"true\"\n")
            .unwrap();
        let runner = PipelineRunner::new(
            vec!["shell".to_string()],
            dir.path(),
            factory(),
            "test-model",
            2,
            false,
        )
        .unwrap();

        let result = runner.run().await;
        assert_eq!(result.status, "achieved");
        assert_eq!(result.passed(), 1);
        assert!(result.steps[0].iterations_used >= 1);
    }
}
