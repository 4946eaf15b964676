//! Text improvement goal - iteratively improve a text file until the
//! judge scores it at or above the target.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::agent::AgentState;
use crate::config::{load_project_config, ProjectConfig};
use crate::goals::judge::llm_score;
use crate::goals::{Goal, GoalResult};
use crate::llm::LlmFactory;

/// Goal: improve a text file until an LLM judge scores it at or above
/// `target_score`.
///
/// `.retrai.yml`:
///
/// ```yaml
/// goal: text-improve
/// input_file: draft.md          # source text to improve
/// output_file: improved.md      # where the result goes (defaults to input_file)
/// target_score: 8               # 0-10, default 8
/// criteria:                     # optional rubric items
///   - clarity
///   - conciseness
///   - persuasiveness
/// ```
///
/// The agent reads the current text, improves it, writes the result,
/// and the goal re-scores on each iteration until the target is reached.
pub struct TextImproveGoal {
    factory: Arc<dyn LlmFactory>,
}

impl TextImproveGoal {
    pub fn new(factory: Arc<dyn LlmFactory>) -> Self {
        TextImproveGoal { factory }
    }

    fn config(cwd: &Path) -> ProjectConfig {
        load_project_config(cwd).ok().flatten().unwrap_or_default()
    }

    fn criteria(cfg: &ProjectConfig) -> Vec<String> {
        cfg.extra
            .get("criteria")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|c| c.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn criteria_str(criteria: &[String]) -> String {
        if criteria.is_empty() {
            "clarity, conciseness, coherence, and overall quality".to_string()
        } else {
            criteria.join(", ")
        }
    }
}

#[async_trait]
impl Goal for TextImproveGoal {
    fn name(&self) -> &str {
        "text-improve"
    }

    async fn check(&self, state: &AgentState, cwd: &Path) -> GoalResult {
        let cfg = Self::config(cwd);
        let input_file = cfg.extra_str("input_file").unwrap_or("").to_string();
        let output_file = cfg
            .extra_str("output_file")
            .unwrap_or(&input_file)
            .to_string();
        let target_score = cfg.extra_f64("target_score").unwrap_or(8.0);
        let criteria = Self::criteria(&cfg);

        if input_file.is_empty() {
            return GoalResult::not_achieved("No input_file specified in .retrai.yml");
        }

        // Prefer the output file if it exists, otherwise fall back to input.
        let mut text_path = cwd.join(&output_file);
        if !text_path.exists() {
            text_path = cwd.join(&input_file);
        }
        if !text_path.exists() {
            return GoalResult::not_achieved(format!(
                "Input file '{}' not found. Create it first.",
                input_file
            ))
            .with_details(json!({"input_file": input_file}));
        }

        let text = std::fs::read_to_string(&text_path).unwrap_or_default();
        if text.trim().is_empty() {
            return GoalResult::not_achieved("Text file is empty. Write some content first.")
                .with_details(json!({"file": text_path.display().to_string()}));
        }

        let client = match self.factory.client(&state.model_name) {
            Ok(c) => c,
            Err(e) => {
                return GoalResult::not_achieved(format!(
                    "LLM judge unavailable: {}. Retry.",
                    e
                ))
            }
        };
        let task = "Improve the text so it reads as genuinely excellent writing.";
        let rubric = format!("Score 0-10 on: {}", Self::criteria_str(&criteria));
        let (score, feedback) = llm_score(&client, task, &text, &rubric, "").await;

        let Some(score) = score else {
            return GoalResult::not_achieved("LLM judge failed to score the text. Retry.")
                .with_details(json!({"feedback": feedback}));
        };

        if score >= target_score {
            GoalResult::achieved(format!(
                "Text scored {:.1}/{:.0} — {}",
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
                "Text scored {:.1}/{:.0} (need +{:.1} more). Feedback: {}",
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
        let input_file = cfg.extra_str("input_file").unwrap_or("<input_file>");
        let output_file = cfg.extra_str("output_file").unwrap_or(input_file);
        let target_score = cfg.extra_f64("target_score").unwrap_or(8.0);
        let criteria = Self::criteria(&cfg);
        let criteria_str = Self::criteria_str(&criteria);

        format!(
            "## Goal: Text Improvement\n\n\
             Improve the text in `{input_file}` and write the result to `{output_file}`.\n\
             Target score: **{target_score}/10** on: {criteria_str}\n\n\
             **Strategy**:\n\
             1. Read `{input_file}` to understand the current text.\n\
             2. Identify weaknesses based on the scoring criteria.\n\
             3. Rewrite and improve the text — be bold, not just cosmetic.\n\
             4. Write the improved version to `{output_file}`.\n\
             5. The goal will score your output and tell you what still needs work.\n\
             6. Repeat until the target score is reached.\n\n\
             **Tips**:\n\
             - Each iteration should make a meaningful improvement, not just minor edits\n\
             - Read the feedback from the previous score carefully\n\
             - Focus on the lowest-scoring criteria first\n\
             - It's OK to restructure, reorder, or rewrite entire sections",
        )
    }
}
