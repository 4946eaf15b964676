//! LLM-powered goal decomposition for the swarm orchestrator.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::agent::build_auto_context;
use crate::error::Result;
use crate::goals::judge::strip_fences;
use crate::llm::{ChatMessage, LlmFactory};
use crate::swarm::types::SubTask;

/// Decompose a high-level goal into 2..`max_subtasks` independent
/// sub-tasks that can run in parallel.
///
/// Tolerates markdown-fenced output; on malformed output, falls back to
/// a single sub-task carrying the original description.
pub async fn decompose_goal(
    description: &str,
    cwd: &Path,
    factory: &Arc<dyn LlmFactory>,
    model_name: &str,
    max_subtasks: usize,
) -> Result<Vec<SubTask>> {
    let context = build_auto_context(cwd);
    let prompt = build_decompose_prompt(description, &context, max_subtasks);

    let client = factory.client(model_name)?;
    let reply = client.invoke(&[ChatMessage::user(prompt)], &[]).await?;

    Ok(parse_subtasks(&reply.content))
}

fn build_decompose_prompt(description: &str, context: &str, max_subtasks: usize) -> String {
    format!(
        "You are an expert software architect. Your job is to decompose a complex goal\n\
         into smaller, independent sub-tasks that can be worked on IN PARALLEL by separate AI agents.\n\n\
         ## GOAL\n{description}\n\n\
         ## PROJECT CONTEXT\n{context}\n\n\
         ## AVAILABLE SPECIALIST ROLES\n\
         You may assign a role to each sub-task to use a specialist agent:\n\
         - \"researcher\": Literature search, data collection, exploration\n\
         - \"analyst\": Statistical analysis, data processing, hypothesis testing\n\
         - \"reviewer\": Critical evaluation, methodology checking, quality assurance\n\
         - \"synthesizer\": Combining findings into conclusions and reports\n\n\
         Leave \"role\" empty for general-purpose tasks.\n\n\
         ## INSTRUCTIONS\n\
         Break the goal into 2-{max_subtasks} independent sub-tasks. Each sub-task should be:\n\
         1. **Self-contained**: Can be completed without depending on the results of other sub-tasks\n\
         2. **Focused**: Targets specific files or components\n\
         3. **Actionable**: Clear enough for an AI agent to execute without ambiguity\n\n\
         Respond with a JSON array of objects, each with these fields:\n\
         - \"id\": short unique identifier (e.g. \"task-1\")\n\
         - \"description\": detailed description of what to do\n\
         - \"focus_files\": list of file paths this task should focus on (can be globs)\n\
         - \"strategy_hint\": a hint about what approach to take\n\
         - \"role\": optional specialist role\n\n\
         Respond with ONLY the JSON array, no other text.",
    )
}

/// Parse the LLM response into SubTask records.
pub(crate) fn parse_subtasks(content: &str) -> Vec<SubTask> {
    let stripped = strip_fences(content);

    let raw: Vec<serde_json::Value> = match serde_json::from_str(stripped) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(other) => vec![other],
        Err(_) => {
            warn!("Failed to parse decomposition response, creating single task");
            return vec![SubTask {
                id: format!("task-{}", &Uuid::new_v4().to_string()[..6]),
                description: content.chars().take(500).collect(),
                focus_files: vec![],
                strategy_hint: String::new(),
                role: String::new(),
            }];
        }
    };

    let mut subtasks: Vec<SubTask> = raw
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let obj = item.as_object()?;
            Some(SubTask {
                id: obj
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("task-{}", i + 1)),
                description: obj
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                focus_files: obj
                    .get("focus_files")
                    .and_then(|v| v.as_array())
                    .map(|a| {
                        a.iter()
                            .filter_map(|f| f.as_str().map(|s| s.to_string()))
                            .collect()
                    })
                    .unwrap_or_default(),
                strategy_hint: obj
                    .get("strategy_hint")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                role: obj
                    .get("role")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
            })
        })
        .collect();

    if subtasks.is_empty() {
        subtasks.push(SubTask {
            id: format!("task-{}", &Uuid::new_v4().to_string()[..6]),
            description: "Complete the goal".to_string(),
            focus_files: vec![],
            strategy_hint: String::new(),
            role: String::new(),
        });
    }
    subtasks
}
