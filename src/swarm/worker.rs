//! Worker agent - runs a focused sub-task within the swarm.

use std::path::Path;
use std::sync::Arc;

use tracing::error;

use crate::agent::{AgentState, GraphRunner, NodeContext, RunOutcome};
use crate::config::RunConfig;
use crate::events::EventBus;
use crate::goals::get_solver_goal;
use crate::llm::LlmFactory;
use crate::swarm::roles::role_prompt;
use crate::swarm::types::{SubTask, WorkerResult};
use crate::tools::create_default_registry;

/// Run a single worker agent on a focused sub-task.
///
/// Each worker gets its own graph runner, event bus, and scoped system
/// prompt; a failing worker is recorded without aborting its siblings.
pub async fn run_worker(
    subtask: SubTask,
    cwd: &Path,
    factory: Arc<dyn LlmFactory>,
    model_name: &str,
    max_iterations: u32,
) -> WorkerResult {
    let goal = get_solver_goal(subtask.description.clone(), factory.clone());
    let bus = Arc::new(EventBus::new());

    let mut ctx = NodeContext::new(
        bus.clone(),
        Some(goal),
        Arc::new(create_default_registry()),
        factory,
    );
    if !subtask.role.is_empty() {
        ctx.role_prompt = role_prompt(&subtask.role);
    }

    let mut cfg = RunConfig::new(subtask.description.clone(), cwd);
    cfg.model_name = model_name.to_string();
    cfg.max_iterations = max_iterations;
    cfg.run_id = format!("swarm-{}", subtask.id);
    let state = AgentState::from_config(&cfg);

    let runner = GraphRunner::new(ctx);
    let outcome = runner.run(state).await;
    bus.close();

    match outcome {
        Ok(RunOutcome::Completed(final_state)) => WorkerResult {
            task_id: subtask.id,
            description: subtask.description,
            status: if final_state.goal_achieved {
                "achieved".to_string()
            } else {
                "failed".to_string()
            },
            findings: final_state.goal_reason.clone(),
            iterations_used: final_state.iteration,
            tokens_used: final_state.total_tokens,
            cost_usd: final_state.estimated_cost_usd,
            error: None,
        },
        // Workers never run with HITL; a suspension here is a bug
        // surfaced as a failure rather than a hang.
        Ok(RunOutcome::Suspended { run_id }) => WorkerResult {
            task_id: subtask.id,
            description: subtask.description,
            status: "failed".to_string(),
            findings: String::new(),
            iterations_used: 0,
            tokens_used: 0,
            cost_usd: 0.0,
            error: Some(format!("worker run {} suspended unexpectedly", run_id)),
        },
        Err(e) => {
            error!("Worker {} failed: {}", subtask.id, e);
            WorkerResult {
                task_id: subtask.id,
                description: subtask.description,
                status: "failed".to_string(),
                findings: String::new(),
                iterations_used: 0,
                tokens_used: 0,
                cost_usd: 0.0,
                error: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{ScriptedFactory, ScriptedLlm};

    #[tokio::test]
    async fn worker_reports_failed_run_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        // The solver goal never achieves here: no git repo, so no diff.
        let factory: Arc<dyn LlmFactory> = Arc::new(ScriptedFactory(ScriptedLlm::new(vec![
            ScriptedLlm::text_reply("let me try", 10, 5),
        ])));
        let subtask = SubTask {
            id: "t1".to_string(),
            description: "do something".to_string(),
            focus_files: vec![],
            strategy_hint: String::new(),
            role: String::new(),
        };

        let result = run_worker(subtask, dir.path(), factory, "test-model", 2).await;
        assert_eq!(result.task_id, "t1");
        assert_eq!(result.status, "failed");
        assert_eq!(result.iterations_used, 2);
        assert!(result.tokens_used > 0);
    }
}
