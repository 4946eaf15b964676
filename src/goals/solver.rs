//! SolverGoal - LLM-as-judge evaluation for natural language goals.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::agent::AgentState;
use crate::goals::judge::llm_json;
use crate::goals::{Goal, GoalResult};
use crate::llm::LlmFactory;
use crate::tools::git_diff_text;

/// A goal that asks an LLM judge whether the working-tree diff satisfies
/// a natural language description.
pub struct SolverGoal {
    description: String,
    factory: Arc<dyn LlmFactory>,
}

impl SolverGoal {
    pub fn new(description: impl Into<String>, factory: Arc<dyn LlmFactory>) -> Self {
        SolverGoal {
            description: description.into(),
            factory,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    async fn judge(&self, state: &AgentState, diff_text: &str) -> GoalResult {
        let prompt = format!(
            "You are a code review judge. Evaluate whether the following changes\n\
             satisfy the stated goal.\n\n\
             ## GOAL\n{}\n\n\
             ## CHANGES MADE (git diff)\n```diff\n{}\n```\n\n\
             ## EVALUATION\n\
             Respond with a JSON object:\n\
             {{\n  \"achieved\": true or false,\n  \"reason\": \"Brief explanation of why the goal is or isn't achieved\",\n  \"confidence\": 0.0 to 1.0\n}}\n\n\
             Rules:\n\
             - Set \"achieved\" to true ONLY if the changes clearly and fully address the goal\n\
             - If partial progress has been made but more work is needed, set \"achieved\" to false\n\
             - Be strict but fair — small imperfections are OK if the core goal is met\n\
             - The \"reason\" should be specific about what was done or what's missing\n\n\
             Respond with ONLY the JSON object.",
            self.description,
            diff_text.chars().take(6000).collect::<String>(),
        );

        let client = match self.factory.client(&state.model_name) {
            Ok(c) => c,
            Err(e) => {
                return GoalResult::not_achieved(format!(
                    "Judge evaluation failed: {}. Continue working on the goal.",
                    e
                ))
            }
        };

        match llm_json(&client, &prompt).await {
            Ok(value) => {
                let achieved = value.get("achieved").and_then(|v| v.as_bool()).unwrap_or(false);
                let reason = value
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .unwrap_or("No reason provided")
                    .to_string();
                let confidence = value.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.5);
                GoalResult {
                    achieved,
                    reason,
                    details: json!({
                        "confidence": confidence,
                        "judge_model": state.model_name,
                    }),
                }
            }
            Err(e) => {
                warn!("LLM judge failed: {}", e);
                GoalResult::not_achieved(format!(
                    "Judge evaluation failed: {}. Continue working on the goal.",
                    e
                ))
                .with_details(json!({"error": e}))
            }
        }
    }
}

#[async_trait]
impl Goal for SolverGoal {
    fn name(&self) -> &str {
        "solve"
    }

    async fn check(&self, state: &AgentState, cwd: &Path) -> GoalResult {
        // Nothing can have changed before the first plan/act round.
        if state.iteration < 1 {
            return GoalResult::not_achieved("Initial iteration — no changes made yet.");
        }

        let diff_text = git_diff_text(cwd, false).await;
        if diff_text.trim().is_empty() {
            return GoalResult::not_achieved(
                "No changes detected yet. Make code changes to satisfy the goal.",
            );
        }

        self.judge(state, &diff_text).await
    }

    fn system_prompt(&self, _cwd: &Path) -> String {
        format!(
            "## Goal: Solve a Problem\n\n\
             **Description**: {}\n\n\
             You must make changes to the codebase to satisfy this goal. \
             The goal will be evaluated by an LLM judge that reads your git diff.\n\n\
             **Important**: Make real, meaningful changes. The judge will verify \
             that the diff actually addresses the goal description.\n\n\
             **Strategy**:\n\
             1. First, understand the codebase by reading relevant files\n\
             2. Plan your approach — think about what needs to change\n\
             3. Make the changes using file_patch or file_write\n\
             4. Verify your changes work (run tests, type checks, etc.)\n\
             5. Review the diff to ensure it matches the goal",
            self.description
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::llm::testing::{ScriptedFactory, ScriptedLlm};
    use crate::llm::LlmReply;

    fn factory_with(reply: &str) -> Arc<dyn LlmFactory> {
        Arc::new(ScriptedFactory(ScriptedLlm::new(vec![LlmReply {
            content: reply.to_string(),
            tool_calls: vec![],
            usage: None,
        }])))
    }

    fn state_at(iteration: u32, dir: &Path) -> AgentState {
        let mut state = AgentState::from_config(&RunConfig::new("solve", dir));
        state.iteration = iteration;
        state
    }

    #[tokio::test]
    async fn first_iteration_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let goal = SolverGoal::new("add a greeting", factory_with("{}"));
        let result = goal.check(&state_at(0, dir.path()), dir.path()).await;
        assert!(!result.achieved);
        assert!(result.reason.contains("Initial iteration"));
    }

    #[tokio::test]
    async fn empty_diff_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        // Not a git repo, so the diff is empty.
        let goal = SolverGoal::new("add a greeting", factory_with("{}"));
        let result = goal.check(&state_at(2, dir.path()), dir.path()).await;
        assert!(!result.achieved);
        assert!(result.reason.contains("No changes detected"));
    }

    #[tokio::test]
    async fn judge_verdict_is_parsed_with_fences() {
        let dir = tempfile::tempdir().unwrap();
        let goal = SolverGoal::new(
            "x",
            factory_with("```json\n{\"achieved\": true, \"reason\": \"looks right\", \"confidence\": 0.9}\n```"),
        );
        let state = state_at(2, dir.path());
        let result = goal.judge(&state, "diff --git a b").await;
        assert!(result.achieved);
        assert_eq!(result.reason, "looks right");
        assert_eq!(result.details["confidence"], 0.9);
    }

    #[tokio::test]
    async fn malformed_judge_output_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let goal = SolverGoal::new("x", factory_with("sorry, I cannot produce JSON"));
        let state = state_at(2, dir.path());
        let result = goal.judge(&state, "diff --git a b").await;
        assert!(!result.achieved);
        assert!(result.reason.contains("Judge evaluation failed"));
    }
}
