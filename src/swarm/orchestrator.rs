//! Swarm orchestrator - decomposes goals and runs parallel worker agents.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info};

use crate::error::Result;
use crate::llm::{ChatMessage, LlmFactory};
use crate::swarm::decomposer::decompose_goal;
use crate::swarm::types::{SwarmResult, WorkerResult};
use crate::swarm::worker::run_worker;

/// Master orchestrator: decompose → dispatch → synthesize.
pub struct SwarmOrchestrator {
    description: String,
    cwd: PathBuf,
    factory: Arc<dyn LlmFactory>,
    model_name: String,
    max_workers: usize,
    max_iterations_per_worker: u32,
}

impl SwarmOrchestrator {
    pub fn new(
        description: impl Into<String>,
        cwd: impl Into<PathBuf>,
        factory: Arc<dyn LlmFactory>,
        model_name: impl Into<String>,
        max_workers: usize,
        max_iterations_per_worker: u32,
    ) -> Self {
        SwarmOrchestrator {
            description: description.into(),
            cwd: cwd.into(),
            factory,
            model_name: model_name.into(),
            max_workers: max_workers.max(1),
            max_iterations_per_worker,
        }
    }

    /// Execute the full swarm pipeline.
    pub async fn run(&self) -> Result<SwarmResult> {
        // Phase 1: Decompose the goal into sub-tasks.
        info!(
            "Decomposing goal: {}",
            self.description.chars().take(80).collect::<String>()
        );
        let subtasks = decompose_goal(
            &self.description,
            &self.cwd,
            &self.factory,
            &self.model_name,
            self.max_workers,
        )
        .await?;
        info!("Decomposed into {} sub-tasks", subtasks.len());

        // Phase 2: Run workers fully in parallel.
        let workers = subtasks.into_iter().map(|subtask| {
            run_worker(
                subtask,
                &self.cwd,
                self.factory.clone(),
                &self.model_name,
                self.max_iterations_per_worker,
            )
        });
        let worker_results: Vec<WorkerResult> = join_all(workers).await;

        // Phase 3: Synthesize findings.
        let synthesis = self.synthesize(&worker_results).await;

        let total_tokens = worker_results.iter().map(|r| r.tokens_used).sum();
        let total_cost = worker_results.iter().map(|r| r.cost_usd).sum();
        let total_iterations = worker_results.iter().map(|r| r.iterations_used).sum();

        let achieved_count = worker_results
            .iter()
            .filter(|r| r.status == "achieved")
            .count();
        let status = if achieved_count == worker_results.len() && !worker_results.is_empty() {
            "achieved"
        } else if achieved_count > 0 {
            "partial"
        } else {
            "failed"
        };

        Ok(SwarmResult {
            status: status.to_string(),
            worker_results,
            synthesis,
            total_tokens,
            total_cost,
            total_iterations,
        })
    }

    /// Ask the LLM for a ≤300-word synthesis of all worker findings;
    /// fall back to a mechanical summary on failure.
    async fn synthesize(&self, results: &[WorkerResult]) -> String {
        let findings_text: Vec<String> = results
            .iter()
            .map(|r| {
                format!(
                    "### Worker: {}\n**Task**: {}\n**Status**: {}\n**Findings**: {}\n\
                     **Iterations**: {} | **Tokens**: {}",
                    r.task_id,
                    r.description,
                    r.status,
                    if r.findings.is_empty() {
                        "No findings reported"
                    } else {
                        &r.findings
                    },
                    r.iterations_used,
                    r.tokens_used,
                )
            })
            .collect();

        let prompt = format!(
            "You are a technical project manager. Multiple AI worker agents have been\n\
             working on sub-tasks of the following goal:\n\n\
             **GOAL**: {}\n\n\
             Here are the results from each worker:\n\n{}\n\n\
             Synthesize these results into a concise summary that:\n\
             1. States the overall outcome (what was achieved vs. what remains)\n\
             2. Highlights key findings or changes made\n\
             3. Notes any conflicts between workers (if any)\n\
             4. Suggests next steps if the goal is not fully achieved\n\n\
             Be concise (max 300 words).",
            self.description,
            findings_text.join("\n\n"),
        );

        let attempt = async {
            let client = self.factory.client(&self.model_name)?;
            client.invoke(&[ChatMessage::user(prompt)], &[]).await
        };

        match attempt.await {
            Ok(reply) => reply.content,
            Err(e) => {
                error!("Synthesis failed: {}", e);
                let achieved = results.iter().filter(|r| r.status == "achieved").count();
                let lines: Vec<String> = results
                    .iter()
                    .map(|r| {
                        format!(
                            "- {}: {} — {}",
                            r.task_id,
                            r.status,
                            r.findings.chars().take(200).collect::<String>()
                        )
                    })
                    .collect();
                format!(
                    "{}/{} workers completed successfully.\n\n{}",
                    achieved,
                    results.len(),
                    lines.join("\n")
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{ScriptedFactory, ScriptedLlm};
    use crate::llm::LlmReply;

    fn worker(task_id: &str, status: &str, tokens: u64) -> WorkerResult {
        WorkerResult {
            task_id: task_id.to_string(),
            description: format!("work on {}", task_id),
            status: status.to_string(),
            findings: format!("{} findings", task_id),
            iterations_used: 2,
            tokens_used: tokens,
            cost_usd: 0.01,
            error: None,
        }
    }

    fn orchestrator(replies: Vec<LlmReply>) -> SwarmOrchestrator {
        SwarmOrchestrator::new(
            "big goal",
            "/tmp",
            Arc::new(ScriptedFactory(ScriptedLlm::new(replies))),
            "test-model",
            3,
            5,
        )
    }

    #[tokio::test]
    async fn synthesis_uses_llm_reply() {
        let orch = orchestrator(vec![ScriptedLlm::text_reply(
            "task-1 done, task-2 pending",
            10,
            5,
        )]);
        let results = vec![worker("task-1", "achieved", 100), worker("task-2", "failed", 50)];
        let synthesis = orch.synthesize(&results).await;
        assert_eq!(synthesis, "task-1 done, task-2 pending");
    }

    #[test]
    fn aggregate_status_rules() {
        // Mirrors the status computation in run(): all → achieved,
        // some → partial, none → failed.
        let status = |results: &[WorkerResult]| {
            let achieved = results.iter().filter(|r| r.status == "achieved").count();
            if achieved == results.len() && !results.is_empty() {
                "achieved"
            } else if achieved > 0 {
                "partial"
            } else {
                "failed"
            }
        };
        assert_eq!(
            status(&[worker("a", "achieved", 1), worker("b", "achieved", 1)]),
            "achieved"
        );
        assert_eq!(
            status(&[worker("a", "achieved", 1), worker("b", "failed", 1)]),
            "partial"
        );
        assert_eq!(
            status(&[worker("a", "failed", 1), worker("b", "failed", 1)]),
            "failed"
        );
    }

    #[tokio::test]
    async fn full_swarm_totals_and_aggregate_status() {
        let dir = tempfile::tempdir().unwrap();
        // Reply 1: decomposition into two sub-tasks. Subsequent replies
        // serve the workers and the synthesizer; workers fail (no git
        // repo → solver sees no diff) so the aggregate is "failed".
        let orch = SwarmOrchestrator::new(
            "improve the project",
            dir.path(),
            Arc::new(ScriptedFactory(ScriptedLlm::new(vec![
                ScriptedLlm::text_reply(
                    r#"[{"id": "task-1", "description": "part one"},
                        {"id": "task-2", "description": "part two"}]"#,
                    10,
                    5,
                ),
                ScriptedLlm::text_reply("working", 10, 5),
            ]))),
            "test-model",
            3,
            1,
        );

        let result = orch.run().await.unwrap();
        assert_eq!(result.worker_results.len(), 2);
        assert_eq!(result.status, "failed");
        assert_eq!(
            result.total_tokens,
            result.worker_results.iter().map(|r| r.tokens_used).sum::<u64>()
        );
        // Synthesis mentions both task ids (mechanical or LLM).
        assert!(result.synthesis.contains("task-1") || !result.synthesis.is_empty());
    }
}
