//! Shared LLM-as-judge helper.
//!
//! One parser serves every judge-based goal (solver, score, review):
//! it accepts raw JSON, ```json fenced blocks, and bare ``` fences, and
//! degrades gracefully on malformed output - callers receive the error
//! text and treat the check as not achieved.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::llm::{ChatMessage, LlmClient};

/// Strip a leading/trailing markdown fence from an LLM response.
pub fn strip_fences(content: &str) -> &str {
    let mut s = content.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Parse a JSON object out of a possibly-fenced LLM response.
pub fn parse_json_reply(content: &str) -> std::result::Result<Value, String> {
    serde_json::from_str(strip_fences(content)).map_err(|e| format!("JSON parse error: {}", e))
}

/// Send `prompt` as a single user message and parse the JSON reply.
///
/// Never panics or propagates: on transport or parse failure the error
/// message is returned for the caller to fold into a failed check.
pub async fn llm_json(llm: &Arc<dyn LlmClient>, prompt: &str) -> std::result::Result<Value, String> {
    let reply = llm
        .invoke(&[ChatMessage::user(prompt)], &[])
        .await
        .map_err(|e| e.to_string())?;
    parse_json_reply(&reply.content)
}

/// Ask the LLM to score `output_text` against a task and rubric.
///
/// Returns `(score, feedback)`; `score` is `None` when the judge failed,
/// with the error in `feedback`.
pub async fn llm_score(
    llm: &Arc<dyn LlmClient>,
    task: &str,
    output_text: &str,
    rubric: &str,
    input_text: &str,
) -> (Option<f64>, String) {
    let rubric_section = if rubric.is_empty() {
        "\n## SCORING CRITERIA\nScore 0-10 on overall quality, completeness, and how well the output satisfies the task.".to_string()
    } else {
        format!("\n## SCORING RUBRIC\n{}", rubric)
    };
    let input_section = if input_text.is_empty() {
        String::new()
    } else {
        format!(
            "\n## INPUT / CONTEXT\n{}",
            input_text.chars().take(3000).collect::<String>()
        )
    };

    let prompt = format!(
        "You are an expert evaluator. Score the following output against the task requirements.\n\
         \n## TASK\n{}\n{}\
         \n## OUTPUT TO EVALUATE\n{}\n{}\
         \n\n## RESPONSE FORMAT\n\
         Respond with a JSON object:\n\
         {{\n  \"score\": <number 0-10, one decimal place>,\n  \"feedback\": \"<2-3 sentences: what's good, what's missing or weak, specific actionable suggestions>\"\n}}\n\n\
         Be honest and specific. A score of 8+ means the output genuinely and fully satisfies the task.\n\
         Respond with ONLY the JSON object.",
        task,
        input_section,
        output_text.chars().take(6000).collect::<String>(),
        rubric_section,
    );

    match llm_json(llm, &prompt).await {
        Ok(value) => {
            let score = value.get("score").and_then(|v| v.as_f64());
            let feedback = value
                .get("feedback")
                .and_then(|v| v.as_str())
                .unwrap_or("No feedback provided")
                .to_string();
            match score {
                Some(s) => (Some(s), feedback),
                None => (None, "Judge reply had no numeric 'score' field".to_string()),
            }
        }
        Err(e) => {
            warn!("LLM scoring failed: {}", e);
            (None, e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{"achieved": true, "reason": "done", "confidence": 0.9}"#;

    #[test]
    fn parses_raw_json() {
        let value = parse_json_reply(PAYLOAD).unwrap();
        assert_eq!(value["achieved"], true);
    }

    #[test]
    fn parses_json_fenced() {
        let fenced = format!("```json\n{}\n```", PAYLOAD);
        let value = parse_json_reply(&fenced).unwrap();
        assert_eq!(value, parse_json_reply(PAYLOAD).unwrap());
    }

    #[test]
    fn parses_bare_fenced() {
        let fenced = format!("```\n{}\n```", PAYLOAD);
        let value = parse_json_reply(&fenced).unwrap();
        assert_eq!(value, parse_json_reply(PAYLOAD).unwrap());
    }

    #[test]
    fn malformed_json_degrades_to_error_string() {
        let err = parse_json_reply("definitely not json").unwrap_err();
        assert!(err.contains("JSON parse error"));
    }

    #[test]
    fn fence_stripping_keeps_inner_backticks() {
        let content = "```json\n{\"reason\": \"use `foo` here\"}\n```";
        let value = parse_json_reply(content).unwrap();
        assert_eq!(value["reason"], "use `foo` here");
    }
}
