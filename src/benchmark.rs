//! Benchmark runner - compare models on the same task.
//!
//! Each model × round gets a clean git working tree before and after
//! the run so no model benefits from another's edits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::process::Command;
use tracing::{info, warn};

use crate::agent::{AgentState, GraphRunner, NodeContext, RunOutcome};
use crate::config::RunConfig;
use crate::events::EventBus;
use crate::goals::get_goal;
use crate::llm::LlmFactory;
use crate::tools::create_default_registry;

/// Result of a single model benchmark run.
#[derive(Debug, Clone)]
pub struct BenchmarkRun {
    pub model_name: String,
    pub round_num: u32,
    pub achieved: bool,
    pub iterations_used: u32,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

/// Aggregated score for a model across rounds.
#[derive(Debug, Clone)]
pub struct ModelScore {
    pub model_name: String,
    pub runs: Vec<BenchmarkRun>,
}

impl ModelScore {
    pub fn success_rate(&self) -> f64 {
        if self.runs.is_empty() {
            return 0.0;
        }
        self.runs.iter().filter(|r| r.achieved).count() as f64 / self.runs.len() as f64
    }

    pub fn avg_iterations(&self) -> f64 {
        if self.runs.is_empty() {
            return 0.0;
        }
        self.runs.iter().map(|r| r.iterations_used as f64).sum::<f64>() / self.runs.len() as f64
    }

    pub fn avg_tokens(&self) -> f64 {
        if self.runs.is_empty() {
            return 0.0;
        }
        self.runs.iter().map(|r| r.tokens_used as f64).sum::<f64>() / self.runs.len() as f64
    }

    pub fn total_cost(&self) -> f64 {
        self.runs.iter().map(|r| r.cost_usd).sum()
    }

    pub fn avg_duration(&self) -> f64 {
        if self.runs.is_empty() {
            return 0.0;
        }
        self.runs.iter().map(|r| r.duration_seconds).sum::<f64>() / self.runs.len() as f64
    }
}

/// Complete benchmark comparison result.
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub goal_name: String,
    pub models: Vec<ModelScore>,
    pub rounds: u32,
}

impl BenchmarkResult {
    /// Best model by success rate; ties break toward fewer iterations.
    pub fn winner(&self) -> Option<&str> {
        self.models
            .iter()
            .max_by(|a, b| {
                a.success_rate()
                    .partial_cmp(&b.success_rate())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(
                        b.avg_iterations()
                            .partial_cmp(&a.avg_iterations())
                            .unwrap_or(std::cmp::Ordering::Equal),
                    )
            })
            .map(|m| m.model_name.as_str())
    }
}

/// Compare multiple LLM models on the same goal.
pub struct BenchmarkRunner {
    models: Vec<String>,
    goal_name: String,
    cwd: PathBuf,
    factory: Arc<dyn LlmFactory>,
    max_iterations: u32,
    rounds: u32,
}

impl BenchmarkRunner {
    pub fn new(
        models: Vec<String>,
        goal_name: impl Into<String>,
        cwd: impl Into<PathBuf>,
        factory: Arc<dyn LlmFactory>,
        max_iterations: u32,
        rounds: u32,
    ) -> Self {
        BenchmarkRunner {
            models,
            goal_name: goal_name.into(),
            cwd: cwd.into(),
            factory,
            max_iterations,
            rounds: rounds.max(1),
        }
    }

    /// Run all benchmark rounds for all models.
    pub async fn run(&self) -> BenchmarkResult {
        let mut result = BenchmarkResult {
            goal_name: self.goal_name.clone(),
            models: Vec::new(),
            rounds: self.rounds,
        };

        for model_name in &self.models {
            let mut score = ModelScore {
                model_name: model_name.clone(),
                runs: Vec::new(),
            };

            for round_num in 1..=self.rounds {
                info!("Benchmark: {} round {}/{}", model_name, round_num, self.rounds);

                self.git_reset().await;
                score.runs.push(self.run_single(model_name, round_num).await);
                self.git_reset().await;
            }

            result.models.push(score);
        }

        result
    }

    async fn run_single(&self, model_name: &str, round_num: u32) -> BenchmarkRun {
        let start = Instant::now();

        let outcome = async {
            let goal = get_goal(&self.goal_name, self.factory.clone())?;
            let bus = Arc::new(EventBus::new());
            let ctx = NodeContext::new(
                bus.clone(),
                Some(goal),
                Arc::new(create_default_registry()),
                self.factory.clone(),
            );
            let runner = GraphRunner::new(ctx);

            let mut cfg = RunConfig::new(&self.goal_name, &self.cwd);
            cfg.model_name = model_name.to_string();
            cfg.max_iterations = self.max_iterations;
            let state = AgentState::from_config(&cfg);

            let outcome = runner.run(state).await;
            bus.close();
            outcome
        }
        .await;

        match outcome {
            Ok(RunOutcome::Completed(state)) => BenchmarkRun {
                model_name: model_name.to_string(),
                round_num,
                achieved: state.goal_achieved,
                iterations_used: state.iteration,
                tokens_used: state.total_tokens,
                cost_usd: state.estimated_cost_usd,
                duration_seconds: start.elapsed().as_secs_f64(),
                error: None,
            },
            other => {
                let error = match other {
                    Err(e) => e.to_string(),
                    _ => "run suspended unexpectedly".to_string(),
                };
                warn!(
                    "Benchmark run failed ({} round {}): {}",
                    model_name, round_num, error
                );
                BenchmarkRun {
                    model_name: model_name.to_string(),
                    round_num,
                    achieved: false,
                    iterations_used: 0,
                    tokens_used: 0,
                    cost_usd: 0.0,
                    duration_seconds: start.elapsed().as_secs_f64(),
                    error: Some(error),
                }
            }
        }
    }

    /// Reset the git working tree and clean untracked files.
    async fn git_reset(&self) {
        for args in [&["checkout", "."][..], &["clean", "-fd"][..]] {
            let status = Command::new("git")
                .args(args)
                .current_dir(&self.cwd)
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
                .await;
            if let Err(e) = status {
                warn!("Git reset failed: {}", e);
            }
        }
    }
}

/// Format a BenchmarkResult as a comparison table.
pub fn format_benchmark_table(result: &BenchmarkResult) -> String {
    let mut lines = vec![
        format!("# Benchmark Results — {}", result.goal_name),
        String::new(),
        "| Model | Success Rate | Avg Iterations | Avg Tokens | Total Cost | Avg Time |"
            .to_string(),
        "|-------|-------------|----------------|------------|------------|----------|"
            .to_string(),
    ];

    let winner = result.winner().map(|w| w.to_string());
    let mut sorted: Vec<&ModelScore> = result.models.iter().collect();
    sorted.sort_by(|a, b| {
        b.success_rate()
            .partial_cmp(&a.success_rate())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for m in sorted {
        let badge = if Some(m.model_name.clone()) == winner {
            " (winner)"
        } else {
            ""
        };
        lines.push(format!(
            "| {}{} | {:.0}% | {:.1} | {:.0} | ${:.4} | {:.1}s |",
            m.model_name,
            badge,
            m.success_rate() * 100.0,
            m.avg_iterations(),
            m.avg_tokens(),
            m.total_cost(),
            m.avg_duration(),
        ));
    }

    lines.join("\n")
}
