//! Reflect node - detects stuck patterns and forces strategy shifts.

use std::collections::HashSet;

use serde_json::json;
use tracing::debug;

use crate::agent::state::{AgentState, StateUpdate};
use crate::agent::NodeContext;
use crate::error::Result;
use crate::events::{AgentEvent, EventKind};
use crate::llm::ChatMessage;

const RECENT_WINDOW: usize = 20;
const STUCK_SIMILARITY: f64 = 0.6;
const MAX_FAILED_STRATEGIES: usize = 10;

/// Detect stuck patterns and inject a strategy-shift message.
///
/// Runs between failed evaluate → plan transitions; passes through
/// below 2 consecutive failures or when the recent failures differ
/// enough that the agent is still making progress.
pub async fn reflect_node(state: &AgentState, ctx: &NodeContext) -> Result<StateUpdate> {
    let consecutive_failures = state.consecutive_failures;
    let mut failed_strategies = state.failed_strategies.clone();

    if consecutive_failures < 2 {
        return Ok(StateUpdate::default());
    }

    ctx.publish(AgentEvent::new(
        EventKind::Log,
        &state.run_id,
        state.iteration,
        json!({
            "message": format!(
                "Reflecting on {} consecutive failures. Analyzing stuck patterns...",
                consecutive_failures
            ),
            "level": "warning",
        }),
    ));

    let recent_failures = extract_recent_failures(state);
    if !detect_stuck_pattern(&recent_failures) {
        debug!("failures differ; no strategy shift needed");
        return Ok(StateUpdate::default());
    }

    let reflection =
        build_reflection_message(&failed_strategies, consecutive_failures);

    // Track the latest failure as a strategy to avoid repeating.
    if let Some(last) = recent_failures.last() {
        let summary: String = last.chars().take(200).collect();
        if !failed_strategies.contains(&summary) {
            failed_strategies.push(summary);
        }
        if failed_strategies.len() > MAX_FAILED_STRATEGIES {
            let excess = failed_strategies.len() - MAX_FAILED_STRATEGIES;
            failed_strategies.drain(..excess);
        }
    }

    ctx.publish(AgentEvent::new(
        EventKind::Log,
        &state.run_id,
        state.iteration,
        json!({
            "message": "Strategy shift triggered — injecting new approach",
            "level": "info",
        }),
    ));

    Ok(StateUpdate {
        messages: vec![ChatMessage::user(reflection)],
        failed_strategies: Some(failed_strategies),
        ..Default::default()
    })
}

/// Collect goal-failure texts from the recent message window.
fn extract_recent_failures(state: &AgentState) -> Vec<String> {
    let start = state.messages.len().saturating_sub(RECENT_WINDOW);
    state.messages[start..]
        .iter()
        .filter(|m| {
            m.content.contains("Goal NOT YET achieved")
                || m.content.to_uppercase().contains("NOT ACHIEVED")
        })
        .map(|m| m.content.clone())
        .collect()
}

/// Stuck iff the last two failures share more than 60% of their words.
fn detect_stuck_pattern(failures: &[String]) -> bool {
    if failures.len() < 2 {
        return false;
    }
    let last: HashSet<String> = failures[failures.len() - 1]
        .to_lowercase()
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();
    let prev: HashSet<String> = failures[failures.len() - 2]
        .to_lowercase()
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();
    if last.is_empty() || prev.is_empty() {
        return false;
    }
    let intersection = last.intersection(&prev).count();
    let union = last.union(&prev).count().max(1);
    intersection as f64 / union as f64 > STUCK_SIMILARITY
}

/// Build the strategy-shift message, escalating with the failure count.
fn build_reflection_message(failed_strategies: &[String], consecutive_failures: u32) -> String {
    let avoided = if failed_strategies.is_empty() {
        String::new()
    } else {
        let items: Vec<String> = failed_strategies
            .iter()
            .rev()
            .take(5)
            .rev()
            .map(|s| format!("- {}", s.chars().take(150).collect::<String>()))
            .collect();
        format!(
            "\n\n**Previously failed approaches (DO NOT repeat these):**\n{}",
            items.join("\n")
        )
    };

    let escalation = if consecutive_failures >= 5 {
        format!(
            "\n\n**CRITICAL**: You have failed {} times. \
             Take a COMPLETELY different approach:\n\
             - If you were editing code, try rewriting the entire function\n\
             - If tests are failing, look at the test expectations — maybe \
             the tests are wrong\n\
             - Consider importing a library instead of writing from scratch\n\
             - Read the whole file or module to understand the full picture",
            consecutive_failures
        )
    } else if consecutive_failures >= 3 {
        "\n\n**Strategy shift required.** Your previous approaches are \
         not working. Try something fundamentally different:\n\
         - Search the codebase more broadly with `grep_search`\n\
         - Read upstream/downstream files for context\n\
         - Try a simpler, more direct approach\n\
         - Check if there's a different root cause than what you assumed"
            .to_string()
    } else {
        String::new()
    };

    format!(
        "**REFLECTION** (after {} consecutive failures)\n\n\
         Your recent attempts have not succeeded. Before trying again, \
         STOP and think deeply about:\n\
         1. What is the ACTUAL root cause of the failure?\n\
         2. Why did your previous approach not work?\n\
         3. What DIFFERENT approach could solve this?\
         {}{}\n\n\
         Take a moment to reason step-by-step about a new strategy, \
         then execute it.",
        consecutive_failures, avoided, escalation
    )
}
