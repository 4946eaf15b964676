//! Graph runner - binds the nodes into a state machine and drives it.
//!
//! The graph is data: an explicit table of `(from, predicate, to)` edges
//! evaluated first-match-wins by a plain loop. State is committed to a
//! checkpoint at node boundaries only, so a suspended run (human-in-the-
//! loop) resumes from the exact node it stopped at.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::agent::act::act_node;
use crate::agent::evaluate::evaluate_node;
use crate::agent::plan::plan_node;
use crate::agent::reflect::reflect_node;
use crate::agent::state::AgentState;
use crate::agent::NodeContext;
use crate::error::{Error, Result};
use crate::events::{AgentEvent, EventKind};

const CHECKPOINT_DIR: &str = ".retrai/checkpoints";

/// Nodes of the agent graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    Plan,
    Act,
    Evaluate,
    Reflect,
    HumanCheck,
    End,
}

type Predicate = fn(&AgentState) -> bool;

fn always(_: &AgentState) -> bool {
    true
}

fn has_pending(state: &AgentState) -> bool {
    !state.pending_tool_calls.is_empty()
}

fn is_terminal(state: &AgentState) -> bool {
    state.goal_achieved
        || state.iteration >= state.max_iterations
        || (state.max_cost_usd > 0.0 && state.estimated_cost_usd >= state.max_cost_usd)
}

fn hitl(state: &AgentState) -> bool {
    state.hitl_enabled
}

fn needs_reflection(state: &AgentState) -> bool {
    state.consecutive_failures >= 2
}

/// Conditional edges, first match wins.
const EDGES: &[(Node, Predicate, Node)] = &[
    (Node::Plan, has_pending as Predicate, Node::Act),
    (Node::Plan, always as Predicate, Node::Evaluate),
    (Node::Act, always as Predicate, Node::Evaluate),
    (Node::Evaluate, is_terminal as Predicate, Node::End),
    (Node::Evaluate, hitl as Predicate, Node::HumanCheck),
    (Node::Evaluate, needs_reflection as Predicate, Node::Reflect),
    (Node::Evaluate, always as Predicate, Node::Plan),
    (Node::Reflect, always as Predicate, Node::Plan),
    (Node::HumanCheck, needs_reflection as Predicate, Node::Reflect),
    (Node::HumanCheck, always as Predicate, Node::Plan),
];

fn next_node(from: Node, state: &AgentState) -> Node {
    EDGES
        .iter()
        .find(|(f, predicate, _)| *f == from && predicate(state))
        .map(|(_, _, to)| *to)
        .unwrap_or(Node::End)
}

/// State snapshot committed at a node boundary.
#[derive(Debug, Serialize, Deserialize)]
struct Checkpoint {
    state: AgentState,
    next_node: Node,
}

fn checkpoint_path(cwd: &Path, run_id: &str) -> PathBuf {
    cwd.join(CHECKPOINT_DIR).join(format!("{}.json", run_id))
}

fn save_checkpoint(state: &AgentState, next: Node) {
    let path = checkpoint_path(&state.cwd, &state.run_id);
    let write = || -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let checkpoint = Checkpoint {
            state: state.clone(),
            next_node: next,
        };
        std::fs::write(&path, serde_json::to_string(&checkpoint)?)?;
        Ok(())
    };
    if let Err(e) = write() {
        warn!("failed to write checkpoint for {}: {}", state.run_id, e);
    }
}

fn load_checkpoint(cwd: &Path, run_id: &str) -> Option<Checkpoint> {
    let data = std::fs::read_to_string(checkpoint_path(cwd, run_id)).ok()?;
    serde_json::from_str(&data).ok()
}

/// How a graph invocation ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The run reached a terminal state.
    Completed(Box<AgentState>),
    /// The run is waiting on an external human release; continue with
    /// [`GraphRunner::resume`].
    Suspended { run_id: String },
}

/// Drives `plan → act → evaluate → reflect` until the goal is met or a
/// budget runs out.
pub struct GraphRunner {
    ctx: NodeContext,
}

impl GraphRunner {
    pub fn new(ctx: NodeContext) -> Self {
        GraphRunner { ctx }
    }

    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    /// Run from a fresh state.
    pub async fn run(&self, state: AgentState) -> Result<RunOutcome> {
        self.drive(state, Node::Plan).await
    }

    /// Resume a suspended run from its checkpoint.
    pub async fn resume(&self, cwd: &Path, run_id: &str) -> Result<RunOutcome> {
        let checkpoint = load_checkpoint(cwd, run_id).ok_or_else(|| {
            Error::NotFound(format!("No checkpoint for run '{}'", run_id))
        })?;
        info!("resuming run {} at {:?}", run_id, checkpoint.next_node);
        self.drive(checkpoint.state, checkpoint.next_node).await
    }

    async fn drive(&self, mut state: AgentState, mut current: Node) -> Result<RunOutcome> {
        loop {
            // Closing the event bus cancels the run between nodes.
            if self.ctx.event_bus.is_closed() {
                return Err(Error::Internal("run cancelled".to_string()));
            }

            let update = match current {
                Node::Plan => plan_node(&state, &self.ctx).await,
                Node::Act => act_node(&state, &self.ctx).await,
                Node::Evaluate => evaluate_node(&state, &self.ctx).await,
                Node::Reflect => reflect_node(&state, &self.ctx).await,
                Node::HumanCheck | Node::End => {
                    return Err(Error::Internal(format!(
                        "node {:?} is not executable",
                        current
                    )))
                }
            };

            let update = match update {
                Ok(update) => update,
                Err(e) => {
                    error!("node {:?} failed: {}", current, e);
                    self.ctx.publish(AgentEvent::new(
                        EventKind::Error,
                        &state.run_id,
                        state.iteration,
                        json!({"error": e.to_string(), "node": format!("{:?}", current)}),
                    ));
                    return Err(e);
                }
            };
            update.apply(&mut state);

            let next = next_node(current, &state);
            save_checkpoint(&state, next);

            match next {
                Node::End => {
                    let status = if state.goal_achieved { "achieved" } else { "failed" };
                    self.ctx.publish(AgentEvent::new(
                        EventKind::RunEnd,
                        &state.run_id,
                        state.iteration,
                        json!({"status": status, "reason": state.goal_reason}),
                    ));
                    return Ok(RunOutcome::Completed(Box::new(state)));
                }
                Node::HumanCheck => {
                    self.ctx.publish(AgentEvent::new(
                        EventKind::HumanCheckRequired,
                        &state.run_id,
                        state.iteration,
                        json!({"iteration": state.iteration}),
                    ));
                    // Record where the run continues once released.
                    let after = next_node(Node::HumanCheck, &state);
                    save_checkpoint(&state, after);
                    return Ok(RunOutcome::Suspended {
                        run_id: state.run_id.clone(),
                    });
                }
                node => current = node,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::ToolCall;
    use crate::config::RunConfig;
    use crate::events::EventBus;
    use crate::goals::{Goal, GoalResult};
    use crate::llm::testing::{ScriptedFactory, ScriptedLlm};
    use crate::llm::{LlmReply, Usage};
    use crate::tools::create_default_registry;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct AlwaysAchieved;

    #[async_trait]
    impl Goal for AlwaysAchieved {
        fn name(&self) -> &str {
            "always"
        }
        async fn check(&self, _state: &AgentState, _cwd: &Path) -> GoalResult {
            GoalResult::achieved("OK")
        }
        fn system_prompt(&self, _cwd: &Path) -> String {
            "achieve".to_string()
        }
    }

    struct NeverAchieved;

    #[async_trait]
    impl Goal for NeverAchieved {
        fn name(&self) -> &str {
            "never"
        }
        async fn check(&self, _state: &AgentState, _cwd: &Path) -> GoalResult {
            GoalResult::not_achieved("tests still failing on the same assertion")
        }
        fn system_prompt(&self, _cwd: &Path) -> String {
            "impossible".to_string()
        }
    }

    fn ctx(goal: Arc<dyn Goal>, llm: Arc<ScriptedLlm>) -> NodeContext {
        NodeContext {
            event_bus: Arc::new(EventBus::new()),
            goal: Some(goal),
            registry: Arc::new(create_default_registry()),
            llm_factory: Arc::new(ScriptedFactory(llm)),
            cost: crate::llm::CostEstimator::new(),
            role_prompt: String::new(),
            mop_k: 0,
        }
    }

    fn fresh_state(dir: &Path, max_iterations: u32) -> AgentState {
        let mut cfg = RunConfig::new("test", dir);
        cfg.max_iterations = max_iterations;
        AgentState::from_config(&cfg)
    }

    #[tokio::test]
    async fn single_achieved_iteration_completes() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new(vec![ScriptedLlm::text_reply("done", 10, 5)]);
        let runner = GraphRunner::new(ctx(Arc::new(AlwaysAchieved), llm));
        let mut sub = runner.context().event_bus.subscribe();

        let outcome = runner.run(fresh_state(dir.path(), 3)).await.unwrap();
        let RunOutcome::Completed(state) = outcome else {
            panic!("expected completion");
        };
        assert!(state.goal_achieved);
        assert_eq!(state.iteration, 1);
        assert_eq!(state.goal_reason, "OK");

        runner.context().event_bus.close();
        let mut saw_run_end = false;
        while let Some(event) = sub.next().await {
            if event.kind == EventKind::RunEnd {
                assert_eq!(event.payload["status"], "achieved");
                saw_run_end = true;
            }
        }
        assert!(saw_run_end);
    }

    #[tokio::test]
    async fn run_terminates_at_max_iterations() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new(vec![ScriptedLlm::text_reply("thinking", 10, 5)]);
        let runner = GraphRunner::new(ctx(Arc::new(NeverAchieved), llm));

        let outcome = runner.run(fresh_state(dir.path(), 3)).await.unwrap();
        let RunOutcome::Completed(state) = outcome else {
            panic!("expected completion");
        };
        assert!(!state.goal_achieved);
        assert_eq!(state.iteration, 3);
        assert!(state.goal_reason.contains("Max iterations"));
    }

    #[tokio::test]
    async fn plan_routes_through_act_when_tools_requested() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "file body").unwrap();
        let llm = ScriptedLlm::new(vec![
            LlmReply {
                content: "reading".to_string(),
                tool_calls: vec![ToolCall {
                    id: "c1".to_string(),
                    name: "file_read".to_string(),
                    args: serde_json::json!({"path": "a.txt"}),
                }],
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
            },
            ScriptedLlm::text_reply("all set", 10, 5),
        ]);
        let runner = GraphRunner::new(ctx(Arc::new(AlwaysAchieved), llm));

        let outcome = runner.run(fresh_state(dir.path(), 5)).await.unwrap();
        let RunOutcome::Completed(state) = outcome else {
            panic!("expected completion");
        };
        // Tool message landed in history and pending calls drained.
        assert!(state.pending_tool_calls.is_empty());
        assert!(state
            .messages
            .iter()
            .any(|m| m.tool_call_id.as_deref() == Some("c1") && m.content == "file body"));
    }

    #[tokio::test]
    async fn budget_exhaustion_terminates_run() {
        let dir = tempfile::tempdir().unwrap();
        // claude-sonnet pricing: 20k prompt + 4k completion ≈ $0.12
        let llm = ScriptedLlm::new(vec![ScriptedLlm::text_reply("working", 20_000, 4_000)]);
        let runner = GraphRunner::new(ctx(Arc::new(NeverAchieved), llm));

        let mut state = fresh_state(dir.path(), 50);
        state.model_name = "claude-sonnet-4-6".to_string();
        state.max_cost_usd = 0.10;

        let outcome = runner.run(state).await.unwrap();
        let RunOutcome::Completed(state) = outcome else {
            panic!("expected completion");
        };
        assert!(!state.goal_achieved);
        assert!(state.goal_reason.to_lowercase().contains("budget"));
        assert_eq!(state.iteration, 1);
    }

    #[tokio::test]
    async fn reflection_fires_after_consecutive_failures() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new(vec![ScriptedLlm::text_reply("trying", 10, 5)]);
        let runner = GraphRunner::new(ctx(Arc::new(NeverAchieved), llm));

        let outcome = runner.run(fresh_state(dir.path(), 5)).await.unwrap();
        let RunOutcome::Completed(state) = outcome else {
            panic!("expected completion");
        };
        assert!(state
            .messages
            .iter()
            .any(|m| m.content.contains("REFLECTION")));
        assert!(!state.failed_strategies.is_empty());
    }

    #[tokio::test]
    async fn hitl_suspends_and_resumes_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new(vec![ScriptedLlm::text_reply("step", 10, 5)]);
        let runner = GraphRunner::new(ctx(Arc::new(NeverAchieved), llm));

        let mut state = fresh_state(dir.path(), 2);
        state.hitl_enabled = true;
        let run_id = state.run_id.clone();

        let outcome = runner.run(state).await.unwrap();
        let RunOutcome::Suspended { run_id: suspended } = outcome else {
            panic!("expected suspension");
        };
        assert_eq!(suspended, run_id);

        // External release: resume from the checkpoint. The second
        // evaluate hits the iteration cap and terminates.
        let outcome = runner.resume(dir.path(), &run_id).await.unwrap();
        let RunOutcome::Completed(state) = outcome else {
            panic!("expected completion after resume");
        };
        assert_eq!(state.iteration, 2);
        assert!(state.goal_reason.contains("Max iterations"));
    }

    #[tokio::test]
    async fn resume_unknown_run_errors() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new(vec![]);
        let runner = GraphRunner::new(ctx(Arc::new(NeverAchieved), llm));
        assert!(runner.resume(dir.path(), "missing-run").await.is_err());
    }

    #[tokio::test]
    async fn closing_the_bus_cancels_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new(vec![ScriptedLlm::text_reply("step", 10, 5)]);
        let context = ctx(Arc::new(NeverAchieved), llm);
        context.event_bus.close();
        let runner = GraphRunner::new(context);

        let err = runner.run(fresh_state(dir.path(), 5)).await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    fn edge_table_routing() {
        let mut state = fresh_state(Path::new("/tmp"), 10);
        assert_eq!(next_node(Node::Plan, &state), Node::Evaluate);

        state.pending_tool_calls.push(ToolCall {
            id: "c1".to_string(),
            name: "file_read".to_string(),
            args: serde_json::json!({}),
        });
        assert_eq!(next_node(Node::Plan, &state), Node::Act);
        assert_eq!(next_node(Node::Act, &state), Node::Evaluate);

        state.pending_tool_calls.clear();
        assert_eq!(next_node(Node::Evaluate, &state), Node::Plan);

        state.consecutive_failures = 2;
        assert_eq!(next_node(Node::Evaluate, &state), Node::Reflect);
        assert_eq!(next_node(Node::Reflect, &state), Node::Plan);

        state.goal_achieved = true;
        assert_eq!(next_node(Node::Evaluate, &state), Node::End);

        // Terminal wins over HITL.
        state.hitl_enabled = true;
        assert_eq!(next_node(Node::Evaluate, &state), Node::End);
        state.goal_achieved = false;
        assert_eq!(next_node(Node::Evaluate, &state), Node::HumanCheck);
    }
}
