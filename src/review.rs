//! AI-powered code review of git diffs.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::goals::judge::llm_json;
use crate::llm::LlmFactory;
use crate::tools::git_diff_text;

const DIFF_CAP: usize = 8000;

/// A single finding from the code review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewFinding {
    /// "bug" | "issue" | "suggestion" | "praise"
    pub category: String,
    /// "critical" | "warning" | "info"
    pub severity: String,
    pub file: String,
    pub line: Option<u32>,
    pub message: String,
    #[serde(default)]
    pub suggestion: String,
}

/// Complete code review result.
#[derive(Debug, Clone, Default)]
pub struct ReviewResult {
    pub findings: Vec<ReviewFinding>,
    pub summary: String,
    /// 0-100 quality score.
    pub score: i64,
    pub model_name: String,
}

impl ReviewResult {
    pub fn bugs(&self) -> impl Iterator<Item = &ReviewFinding> {
        self.findings.iter().filter(|f| f.category == "bug")
    }

    pub fn by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a ReviewFinding> {
        self.findings.iter().filter(move |f| f.category == category)
    }
}

/// Run an AI-powered code review on the current diff.
///
/// An empty diff scores 100 with a "no changes" summary; malformed judge
/// output scores 0 with the error in the summary.
pub async fn run_review(
    cwd: &Path,
    factory: Arc<dyn LlmFactory>,
    model_name: &str,
    staged: bool,
) -> ReviewResult {
    let diff_text = git_diff_text(cwd, staged).await;
    if diff_text.trim().is_empty() {
        return ReviewResult {
            summary: "No changes to review.".to_string(),
            score: 100,
            model_name: model_name.to_string(),
            ..Default::default()
        };
    }

    let prompt = format!(
        "You are a senior software engineer performing a code review.\n\
         Review the following diff and provide structured feedback.\n\n\
         ## Diff\n```diff\n{}\n```\n\n\
         ## Instructions\n\
         Analyze the changes for:\n\
         1. **Bugs**: Logic errors, null pointer issues, race conditions, security flaws\n\
         2. **Issues**: Bad patterns, performance problems, missing error handling\n\
         3. **Suggestions**: Improvements, better naming, refactoring opportunities\n\
         4. **Praise**: Well-written code, good patterns, smart solutions\n\n\
         Respond with a JSON object:\n\
         ```json\n\
         {{\n  \"summary\": \"Brief overall assessment (1-2 sentences)\",\n  \"score\": 85,\n  \"findings\": [\n    {{\n      \"category\": \"bug\",\n      \"severity\": \"critical\",\n      \"file\": \"src/auth.rs\",\n      \"line\": 42,\n      \"message\": \"...\",\n      \"suggestion\": \"...\"\n    }}\n  ]\n}}\n\
         ```\n\n\
         Rules:\n\
         - Score 0-100 (100 = perfect, 70+ = good, <50 = needs work)\n\
         - Be specific about file names and line numbers when possible\n\
         - Include at least one praise if anything is done well\n\
         - severity: \"critical\" | \"warning\" | \"info\"\n\
         - Line can be null if it applies to the whole file\n\n\
         Respond with ONLY the JSON object.",
        diff_text.chars().take(DIFF_CAP).collect::<String>()
    );

    let client = match factory.client(model_name) {
        Ok(c) => c,
        Err(e) => {
            return ReviewResult {
                summary: format!("Review failed: {}", e),
                score: 0,
                model_name: model_name.to_string(),
                ..Default::default()
            }
        }
    };

    match llm_json(&client, &prompt).await {
        Ok(value) => {
            let findings = value
                .get("findings")
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .map(|f| ReviewFinding {
                            category: f
                                .get("category")
                                .and_then(|v| v.as_str())
                                .unwrap_or("issue")
                                .to_string(),
                            severity: f
                                .get("severity")
                                .and_then(|v| v.as_str())
                                .unwrap_or("info")
                                .to_string(),
                            file: f
                                .get("file")
                                .and_then(|v| v.as_str())
                                .unwrap_or("")
                                .to_string(),
                            line: f.get("line").and_then(|v| v.as_u64()).map(|n| n as u32),
                            message: f
                                .get("message")
                                .and_then(|v| v.as_str())
                                .unwrap_or("")
                                .to_string(),
                            suggestion: f
                                .get("suggestion")
                                .and_then(|v| v.as_str())
                                .unwrap_or("")
                                .to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default();

            ReviewResult {
                findings,
                summary: value
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Review complete.")
                    .to_string(),
                score: value.get("score").and_then(|v| v.as_i64()).unwrap_or(50),
                model_name: model_name.to_string(),
            }
        }
        Err(e) => {
            error!("Code review failed: {}", e);
            ReviewResult {
                summary: format!("Review failed: {}", e),
                score: 0,
                model_name: model_name.to_string(),
                ..Default::default()
            }
        }
    }
}

/// Format a ReviewResult as a markdown report.
pub fn format_review_markdown(result: &ReviewResult) -> String {
    let mut lines = vec![
        "# Code Review Report".to_string(),
        String::new(),
        format!("**Score**: {}/100", result.score),
        format!("**Model**: {}", result.model_name),
        String::new(),
        "## Summary".to_string(),
        result.summary.clone(),
        String::new(),
    ];

    for (category, title) in [
        ("bug", "Bugs"),
        ("issue", "Issues"),
        ("suggestion", "Suggestions"),
        ("praise", "Praise"),
    ] {
        let items: Vec<&ReviewFinding> = result.by_category(category).collect();
        if items.is_empty() {
            continue;
        }
        lines.push(format!("## {}", title));
        lines.push(String::new());
        for f in items {
            let mut loc = f.file.clone();
            if let Some(line) = f.line {
                loc.push_str(&format!(":{}", line));
            }
            lines.push(format!("### `{}` [{}]", loc, f.severity));
            lines.push(f.message.clone());
            if !f.suggestion.is_empty() {
                lines.push(String::new());
                lines.push(format!("> {}", f.suggestion));
            }
            lines.push(String::new());
        }
    }

    lines.join("\n")
}
