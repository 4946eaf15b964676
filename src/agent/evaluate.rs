//! Evaluate node - checks goal completion and decides termination.

use serde_json::{json, Value};

use crate::agent::state::{AgentState, StateUpdate};
use crate::agent::NodeContext;
use crate::config::StopMode;
use crate::error::Result;
use crate::events::{AgentEvent, EventKind};
use crate::goals::GoalResult;
use crate::llm::ChatMessage;

const DETAIL_CAP: usize = 2000;

/// Check the goal and update `goal_achieved` / `goal_reason`.
pub async fn evaluate_node(state: &AgentState, ctx: &NodeContext) -> Result<StateUpdate> {
    let new_iteration = state.iteration + 1;

    let result = match &ctx.goal {
        Some(goal) => goal.check(state, &state.cwd).await,
        None => GoalResult::not_achieved("No goal defined"),
    };
    let achieved = result.achieved;
    let reason = result.reason.clone();

    ctx.publish(AgentEvent::new(
        EventKind::GoalCheck,
        &state.run_id,
        new_iteration,
        json!({
            "achieved": achieved,
            "reason": reason,
            "details": truncate_details(&result.details),
        }),
    ));
    ctx.publish(AgentEvent::new(
        EventKind::IterationComplete,
        &state.run_id,
        new_iteration,
        json!({"iteration": new_iteration, "goal_achieved": achieved}),
    ));

    // Budget and iteration caps force termination.
    let over_budget = state.max_cost_usd > 0.0 && state.estimated_cost_usd >= state.max_cost_usd;
    let (achieved_final, reason_final) = if over_budget {
        (
            false,
            format!(
                "Cost budget exceeded (${:.4} of ${:.4} limit). {}",
                state.estimated_cost_usd, state.max_cost_usd, reason
            ),
        )
    } else if new_iteration >= state.max_iterations && !achieved {
        (
            false,
            format!(
                "Max iterations ({}) reached. {}",
                state.max_iterations, reason
            ),
        )
    } else {
        (achieved, reason.clone())
    };

    // Inject goal status into the conversation so the LLM knows where
    // it stands.
    let remaining = state.max_iterations.saturating_sub(new_iteration);
    let token_str = if state.total_tokens > 0 {
        format!(" | Tokens: {}", state.total_tokens)
    } else {
        String::new()
    };
    let cost_str = if state.estimated_cost_usd > 0.0 {
        format!(" | Cost: ${:.4}", state.estimated_cost_usd)
    } else {
        String::new()
    };
    let iter_header = format!(
        "[Iteration {}/{}{}{}] ",
        new_iteration, state.max_iterations, token_str, cost_str
    );

    let status = if achieved {
        format!("{}Goal ACHIEVED! {}", iter_header, reason)
    } else if over_budget {
        format!(
            "{}Cost budget exceeded. Final status: {}",
            iter_header, reason
        )
    } else if new_iteration >= state.max_iterations {
        format!(
            "{}Max iterations reached. Final status: {}",
            iter_header, reason
        )
    } else if state.stop_mode == StopMode::Soft && remaining == 1 {
        format!(
            "{}SOFT STOP — this is your LAST working iteration.\n\n\
             You did NOT complete the goal. Status: {}\n\n\
             On the NEXT iteration you MUST produce a **summary report** \
             for the user. The report should include:\n\
             1. What was attempted and which strategies were tried\n\
             2. What succeeded (partial progress)\n\
             3. What failed and why\n\
             4. Concrete recommendations for the user to continue manually\n\
             5. Any files that were modified\n\n\
             Do NOT attempt more fixes. Focus entirely on writing a clear, \
             helpful summary so the user can pick up where you left off.",
            iter_header, reason
        )
    } else {
        format!(
            "{}Goal NOT YET achieved. {}\n\n\
             You have {} iterations remaining. \
             DO NOT give up. Analyze what went wrong and try a different \
             approach. If your current strategy isn't working, consider:\n\
             - Reading the error messages more carefully\n\
             - Using `grep_search` to find related code\n\
             - Trying an alternative solution\n\
             - Running diagnostic commands to gather more info\n\
             - Simplifying your approach\n\
             Keep going until the goal is achieved.",
            iter_header, reason, remaining
        )
    };

    let consecutive = if achieved {
        0
    } else {
        state.consecutive_failures + 1
    };

    Ok(StateUpdate {
        messages: vec![ChatMessage::user(status)],
        goal_achieved: Some(achieved_final),
        goal_reason: Some(reason_final),
        iteration: Some(new_iteration),
        consecutive_failures: Some(consecutive),
        ..Default::default()
    })
}

/// Truncate long string values in the details payload.
fn truncate_details(details: &Value) -> Value {
    match details {
        Value::String(s) if s.len() > DETAIL_CAP => {
            let mut end = DETAIL_CAP;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            Value::String(format!("{}...", &s[..end]))
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), truncate_details(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::events::EventBus;
    use crate::goals::Goal;
    use crate::llm::testing::{ScriptedFactory, ScriptedLlm};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Arc;

    struct FixedGoal {
        achieved: bool,
        reason: &'static str,
    }

    #[async_trait]
    impl Goal for FixedGoal {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn check(&self, _state: &AgentState, _cwd: &Path) -> GoalResult {
            GoalResult {
                achieved: self.achieved,
                reason: self.reason.to_string(),
                details: json!({}),
            }
        }
        fn system_prompt(&self, _cwd: &Path) -> String {
            "test".to_string()
        }
    }

    fn ctx_with_goal(achieved: bool, reason: &'static str) -> NodeContext {
        NodeContext {
            event_bus: Arc::new(EventBus::new()),
            goal: Some(Arc::new(FixedGoal { achieved, reason })),
            registry: Arc::new(crate::tools::create_default_registry()),
            llm_factory: Arc::new(ScriptedFactory(ScriptedLlm::new(vec![]))),
            cost: crate::llm::CostEstimator::new(),
            role_prompt: String::new(),
            mop_k: 0,
        }
    }

    fn state(iteration: u32, max_iterations: u32, stop_mode: StopMode) -> AgentState {
        let mut cfg = RunConfig::new("fixed", "/tmp");
        cfg.max_iterations = max_iterations;
        cfg.stop_mode = stop_mode;
        let mut state = AgentState::from_config(&cfg);
        state.iteration = iteration;
        state
    }

    #[tokio::test]
    async fn iteration_increments_by_exactly_one() {
        let ctx = ctx_with_goal(false, "still failing");
        let update = evaluate_node(&state(4, 10, StopMode::Hard), &ctx).await.unwrap();
        assert_eq!(update.iteration, Some(5));
    }

    #[tokio::test]
    async fn achieved_goal_resets_failures() {
        let ctx = ctx_with_goal(true, "All tests pass");
        let mut s = state(3, 10, StopMode::Hard);
        s.consecutive_failures = 4;
        let update = evaluate_node(&s, &ctx).await.unwrap();
        assert_eq!(update.goal_achieved, Some(true));
        assert_eq!(update.consecutive_failures, Some(0));
        assert!(update.messages[0].content.contains("Goal ACHIEVED"));
    }

    #[tokio::test]
    async fn failure_increments_consecutive() {
        let ctx = ctx_with_goal(false, "Tests still failing");
        let mut s = state(3, 10, StopMode::Hard);
        s.consecutive_failures = 1;
        let update = evaluate_node(&s, &ctx).await.unwrap();
        assert_eq!(update.consecutive_failures, Some(2));
        assert!(update.messages[0].content.contains("Goal NOT YET achieved"));
    }

    #[tokio::test]
    async fn hard_stop_no_summary_on_penultimate() {
        let ctx = ctx_with_goal(false, "Tests still failing");
        let update = evaluate_node(&state(8, 10, StopMode::Hard), &ctx).await.unwrap();
        let content = &update.messages[0].content;
        assert!(!content.contains("SOFT STOP"));
        assert!(!content.contains("summary report"));
        assert!(content.contains("Goal NOT YET achieved"));
    }

    #[tokio::test]
    async fn hard_stop_ends_at_max() {
        let ctx = ctx_with_goal(false, "Tests still failing");
        let update = evaluate_node(&state(9, 10, StopMode::Hard), &ctx).await.unwrap();
        assert_eq!(update.goal_achieved, Some(false));
        assert!(update.goal_reason.unwrap().contains("Max iterations"));
        assert!(update.messages[0].content.contains("Max iterations reached"));
    }

    #[tokio::test]
    async fn soft_stop_summary_on_penultimate() {
        let ctx = ctx_with_goal(false, "Tests still failing");
        let update = evaluate_node(&state(8, 10, StopMode::Soft), &ctx).await.unwrap();
        let content = &update.messages[0].content;
        assert!(content.contains("SOFT STOP"));
        assert!(content.contains("summary report"));
        assert_eq!(update.goal_achieved, Some(false));
        // The run continues - not forced terminal.
        assert!(!update.goal_reason.unwrap().contains("Max iterations"));
    }

    #[tokio::test]
    async fn soft_stop_ends_at_max_like_hard() {
        let ctx = ctx_with_goal(false, "Tests still failing");
        let update = evaluate_node(&state(9, 10, StopMode::Soft), &ctx).await.unwrap();
        assert_eq!(update.goal_achieved, Some(false));
        assert!(update.goal_reason.unwrap().contains("Max iterations"));
    }

    #[tokio::test]
    async fn soft_stop_achieved_skips_summary() {
        let ctx = ctx_with_goal(true, "All tests pass");
        let update = evaluate_node(&state(8, 10, StopMode::Soft), &ctx).await.unwrap();
        let content = &update.messages[0].content;
        assert!(!content.contains("SOFT STOP"));
        assert!(content.contains("ACHIEVED"));
        assert_eq!(update.goal_achieved, Some(true));
    }

    #[tokio::test]
    async fn budget_exhaustion_terminates() {
        let ctx = ctx_with_goal(false, "still going");
        let mut s = state(0, 10, StopMode::Hard);
        s.max_cost_usd = 0.10;
        s.estimated_cost_usd = 0.15;
        let update = evaluate_node(&s, &ctx).await.unwrap();
        assert_eq!(update.goal_achieved, Some(false));
        let reason = update.goal_reason.unwrap();
        assert!(reason.to_lowercase().contains("budget"));
    }

    #[tokio::test]
    async fn zero_budget_means_unlimited() {
        let ctx = ctx_with_goal(false, "still going");
        let mut s = state(0, 10, StopMode::Hard);
        s.max_cost_usd = 0.0;
        s.estimated_cost_usd = 123.0;
        let update = evaluate_node(&s, &ctx).await.unwrap();
        assert!(!update.goal_reason.unwrap().to_lowercase().contains("budget"));
    }

    #[tokio::test]
    async fn no_goal_defined() {
        let mut ctx = ctx_with_goal(false, "");
        ctx.goal = None;
        let update = evaluate_node(&state(0, 10, StopMode::Hard), &ctx).await.unwrap();
        assert!(update.messages[0].content.contains("No goal defined"));
    }

    #[test]
    fn details_truncation_recurses() {
        let long = "x".repeat(5000);
        let details = json!({"outer": {"inner": long}});
        let truncated = truncate_details(&details);
        let inner = truncated["outer"]["inner"].as_str().unwrap();
        assert!(inner.len() < 2100);
        assert!(inner.ends_with("..."));
    }
}
