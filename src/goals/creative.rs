//! Creative writing goal - generate and refine content until the judge
//! scores it at or above the target.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::agent::AgentState;
use crate::config::{load_project_config, ProjectConfig};
use crate::goals::judge::llm_score;
use crate::goals::{Goal, GoalResult};
use crate::llm::LlmFactory;

/// Goal: produce creative content that an LLM judge scores at or above
/// `target_score`.
///
/// `.retrai.yml`:
///
/// ```yaml
/// goal: creative
/// prompt: "Write a short story about a robot learning to paint"
/// output_file: story.md
/// target_score: 8                          # 0-10, default 8
/// style: "literary fiction, melancholic"   # optional style guidance
/// max_words: 1000                          # optional word count limit
/// ```
///
/// The agent generates content, then iteratively refines it based on
/// judge feedback until the target score is reached.
pub struct CreativeGoal {
    factory: Arc<dyn LlmFactory>,
}

impl CreativeGoal {
    pub fn new(factory: Arc<dyn LlmFactory>) -> Self {
        CreativeGoal { factory }
    }

    fn config(cwd: &Path) -> ProjectConfig {
        load_project_config(cwd).ok().flatten().unwrap_or_default()
    }

    /// Scoring rubric handed to the shared judge, folding in the
    /// optional style and word-limit constraints.
    fn rubric(style: &str, max_words: Option<f64>) -> String {
        let mut rubric = String::from(
            "Score 0-10 on:\n\
             - Adherence to brief (does it match what was asked?)\n\
             - Originality and creativity\n\
             - Quality of writing (voice, style, language)\n\
             - Structure and flow\n\
             - Emotional impact / engagement",
        );
        if !style.is_empty() {
            rubric.push_str(&format!("\nExpected style: {}", style));
        }
        if let Some(max_words) = max_words {
            rubric.push_str(&format!("\nWord limit: {:.0} words", max_words));
        }
        rubric
    }
}

#[async_trait]
impl Goal for CreativeGoal {
    fn name(&self) -> &str {
        "creative"
    }

    async fn check(&self, state: &AgentState, cwd: &Path) -> GoalResult {
        let cfg = Self::config(cwd);
        let prompt = cfg.extra_str("prompt").unwrap_or("").to_string();
        let output_file = cfg.extra_str("output_file").unwrap_or("output.md").to_string();
        let target_score = cfg.extra_f64("target_score").unwrap_or(8.0);
        let style = cfg.extra_str("style").unwrap_or("").to_string();
        let max_words = cfg.extra_f64("max_words");

        if prompt.is_empty() {
            return GoalResult::not_achieved("No prompt specified in .retrai.yml");
        }

        let out_path = cwd.join(&output_file);
        if !out_path.exists() {
            return GoalResult::not_achieved(format!(
                "No output yet at '{}'. Generate the creative content and write it to that file.",
                output_file
            ))
            .with_details(json!({"output_file": output_file, "prompt": prompt}));
        }
        let content = std::fs::read_to_string(&out_path).unwrap_or_default();
        if content.trim().is_empty() {
            return GoalResult::not_achieved(format!(
                "Output file '{}' is empty. Write the content first.",
                output_file
            ));
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
        let rubric = Self::rubric(&style, max_words);
        let (score, feedback) = llm_score(&client, &prompt, &content, &rubric, "").await;

        let Some(score) = score else {
            return GoalResult::not_achieved("LLM judge failed to score the content. Retry.")
                .with_details(json!({"feedback": feedback}));
        };

        if score >= target_score {
            GoalResult::achieved(format!(
                "Creative content scored {:.1}/{:.0} — {}",
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
                "Content scored {:.1}/{:.0} (need +{:.1} more). Feedback: {}",
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
        let prompt = cfg.extra_str("prompt").unwrap_or("<creative brief>");
        let output_file = cfg.extra_str("output_file").unwrap_or("output.md");
        let target_score = cfg.extra_f64("target_score").unwrap_or(8.0);
        let style = cfg.extra_str("style").unwrap_or("");
        let max_words = cfg.extra_f64("max_words");

        let style_str = if style.is_empty() {
            String::new()
        } else {
            format!(" Style: {}.", style)
        };
        let words_str = match max_words {
            Some(n) => format!(" Max words: {:.0}.", n),
            None => String::new(),
        };

        format!(
            "## Goal: Creative Writing\n\n\
             **Brief**: {prompt}\n\
             **Output file**: `{output_file}`\n\
             **Target score**: {target_score}/10{style_str}{words_str}\n\n\
             **Strategy**:\n\
             1. Read the brief carefully — understand the tone, subject, and constraints.\n\
             2. Generate the creative content and write it to `{output_file}`.\n\
             3. The goal will score your output and give specific feedback.\n\
             4. Revise based on the feedback — be willing to rewrite substantially.\n\
             5. Repeat until the target score is reached.\n\n\
             **Creative tips**:\n\
             - Strong opening hook — grab attention immediately\n\
             - Show, don't tell — use concrete details and sensory language\n\
             - Consistent voice and tone throughout\n\
             - Satisfying structure: beginning, middle, end (or equivalent)\n\
             - Read the judge feedback carefully — it tells you exactly what to fix",
        )
    }
}
