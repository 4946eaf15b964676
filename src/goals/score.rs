//! Generic LLM-scored goal - any task with a custom rubric and target score.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::agent::AgentState;
use crate::config::{load_project_config, ProjectConfig};
use crate::goals::judge::llm_score;
use crate::goals::{Goal, GoalResult};
use crate::llm::LlmFactory;

/// Goal: produce output that scores at or above `target_score` against a
/// custom rubric.
///
/// `.retrai.yml`:
///
/// ```yaml
/// goal: score
/// task: "Summarise this research paper into a 1-page executive summary"
/// input_file: paper.md         # optional context file
/// output_file: summary.md      # where the agent writes its result
/// target_score: 8              # 0-10, default 8
/// rubric: |
///   Score 0-10 on accuracy, brevity, clarity, and actionability.
/// ```
pub struct ScoreGoal {
    factory: Arc<dyn LlmFactory>,
}

impl ScoreGoal {
    pub fn new(factory: Arc<dyn LlmFactory>) -> Self {
        ScoreGoal { factory }
    }

    fn config(cwd: &Path) -> ProjectConfig {
        load_project_config(cwd).ok().flatten().unwrap_or_default()
    }
}

#[async_trait]
impl Goal for ScoreGoal {
    fn name(&self) -> &str {
        "score"
    }

    async fn check(&self, state: &AgentState, cwd: &Path) -> GoalResult {
        let cfg = Self::config(cwd);
        let task = cfg.extra_str("task").unwrap_or("").to_string();
        let output_file = cfg.extra_str("output_file").unwrap_or("output.md").to_string();
        let target_score = cfg.extra_f64("target_score").unwrap_or(8.0);
        let rubric = cfg.extra_str("rubric").unwrap_or("").to_string();
        let input_file = cfg.extra_str("input_file").unwrap_or("").to_string();

        if task.is_empty() {
            return GoalResult::not_achieved("No task specified in .retrai.yml");
        }

        let out_path = cwd.join(&output_file);
        if !out_path.exists() {
            return GoalResult::not_achieved(format!(
                "No output yet at '{}'. Complete the task and write the result to that file.",
                output_file
            ))
            .with_details(json!({"output_file": output_file, "task": task}));
        }
        let output_text = std::fs::read_to_string(&out_path).unwrap_or_default();
        if output_text.trim().is_empty() {
            return GoalResult::not_achieved(format!(
                "Output file '{}' is empty. Write the result first.",
                output_file
            ));
        }

        let input_text = if input_file.is_empty() {
            String::new()
        } else {
            std::fs::read_to_string(cwd.join(&input_file))
                .map(|s| s.chars().take(4000).collect())
                .unwrap_or_default()
        };

        let client = match self.factory.client(&state.model_name) {
            Ok(c) => c,
            Err(e) => {
                return GoalResult::not_achieved(format!(
                    "LLM judge unavailable: {}. Retry.",
                    e
                ))
            }
        };
        let (score, feedback) =
            llm_score(&client, &task, &output_text, &rubric, &input_text).await;

        let Some(score) = score else {
            return GoalResult::not_achieved("LLM judge failed to score the output. Retry.")
                .with_details(json!({"feedback": feedback}));
        };

        if score >= target_score {
            GoalResult::achieved(format!(
                "Output scored {:.1}/{:.0} — {}",
                score, target_score, feedback
            ))
            .with_details(json!({
                "score": score,
                "target_score": target_score,
                "feedback": feedback,
            }))
        } else {
            let gap = target_score - score;
            GoalResult::not_achieved(format!(
                "Output scored {:.1}/{:.0} (need +{:.1} more). Feedback: {}",
                score, target_score, gap, feedback
            ))
            .with_details(json!({
                "score": score,
                "target_score": target_score,
                "gap": gap,
                "feedback": feedback,
            }))
        }
    }

    fn system_prompt(&self, cwd: &Path) -> String {
        let cfg = Self::config(cwd);
        let task = cfg.extra_str("task").unwrap_or("<task description>");
        let output_file = cfg.extra_str("output_file").unwrap_or("output.md");
        let target_score = cfg.extra_f64("target_score").unwrap_or(8.0);
        let input_file = cfg.extra_str("input_file").unwrap_or("");
        let rubric = cfg.extra_str("rubric").unwrap_or("");

        let input_str = if input_file.is_empty() {
            String::new()
        } else {
            format!("\n**Input/context file**: `{}`", input_file)
        };
        let rubric_str = if rubric.is_empty() {
            String::new()
        } else {
            format!("\n\n**Scoring rubric**:\n{}", rubric)
        };

        format!(
            "## Goal: Scored Task\n\n\
             **Task**: {task}\n\
             **Output file**: `{output_file}`\n\
             **Target score**: {target_score}/10{input_str}{rubric_str}\n\n\
             **Strategy**:\n\
             1. Read the task description and any input files carefully.\n\
             2. Produce the output and write it to `{output_file}`.\n\
             3. The goal will score your output against the rubric and give feedback.\n\
             4. Revise your output based on the feedback.\n\
             5. Repeat until the target score is reached.\n\n\
             **Tips**:\n\
             - Read the rubric carefully — it tells you exactly how you'll be scored\n\
             - Address every rubric criterion explicitly\n\
             - Each revision should meaningfully improve the lowest-scoring areas",
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

    fn state_for(dir: &Path) -> AgentState {
        AgentState::from_config(&RunConfig::new("score", dir))
    }

    #[tokio::test]
    async fn missing_task_explains_itself() {
        let dir = tempfile::tempdir().unwrap();
        let goal = ScoreGoal::new(factory_with("{}"));
        let result = goal.check(&state_for(dir.path()), dir.path()).await;
        assert!(!result.achieved);
        assert!(result.reason.contains("No task specified"));
    }

    #[tokio::test]
    async fn missing_output_file_points_at_it() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".retrai.yml"),
            "goal: score\ntask: write a haiku\noutput_file: haiku.md\n",
        )
        .unwrap();
        let goal = ScoreGoal::new(factory_with("{}"));
        let result = goal.check(&state_for(dir.path()), dir.path()).await;
        assert!(!result.achieved);
        assert!(result.reason.contains("haiku.md"));
    }

    #[tokio::test]
    async fn meets_target_score() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".retrai.yml"),
            "goal: score\ntask: write a haiku\noutput_file: haiku.md\ntarget_score: 8\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("haiku.md"), "an old silent pond").unwrap();
        let goal =
            ScoreGoal::new(factory_with(r#"{"score": 8.5, "feedback": "evocative"}"#));
        let result = goal.check(&state_for(dir.path()), dir.path()).await;
        assert!(result.achieved, "{}", result.reason);
        assert_eq!(result.details["score"], 8.5);
    }

    #[tokio::test]
    async fn below_target_reports_gap_and_feedback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".retrai.yml"),
            "goal: score\ntask: write a haiku\noutput_file: haiku.md\ntarget_score: 8\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("haiku.md"), "roses are red").unwrap();
        let goal =
            ScoreGoal::new(factory_with(r#"{"score": 5.0, "feedback": "not a haiku"}"#));
        let result = goal.check(&state_for(dir.path()), dir.path()).await;
        assert!(!result.achieved);
        assert!(result.reason.contains("need +3.0 more"));
        assert!(result.reason.contains("not a haiku"));
    }

    #[tokio::test]
    async fn judge_failure_degrades_gracefully() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".retrai.yml"),
            "goal: score\ntask: write a haiku\noutput_file: haiku.md\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("haiku.md"), "text").unwrap();
        let goal = ScoreGoal::new(factory_with("not json at all"));
        let result = goal.check(&state_for(dir.path()), dir.path()).await;
        assert!(!result.achieved);
        assert!(result.reason.contains("failed to score"));
    }
}
