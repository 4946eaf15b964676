//! Act node - dispatches pending tool calls and collects results.
//!
//! Calls are partitioned left-to-right: runs of parallel-safe tools form
//! one batch executed concurrently; every mutating call gets a singleton
//! batch, preserving the LLM's declared order among mutations. Read-only
//! results are cached per run and served without re-executing the
//! adapter.

use std::collections::HashMap;

use futures::future::join_all;
use serde_json::{json, Value};
use tracing::debug;

use crate::agent::state::{AgentState, StateUpdate, ToolCall, ToolResult};
use crate::agent::NodeContext;
use crate::error::Result;
use crate::events::{AgentEvent, EventKind};
use crate::llm::ChatMessage;
use crate::safety::SafetyGuard;
use crate::tools::ToolRegistry;

/// Canonical cache key for a read-only tool call. `serde_json` sorts
/// object keys, so identical args always fingerprint identically.
pub(crate) fn cache_fingerprint(name: &str, args: &Value) -> String {
    format!("{}:{}", name, serde_json::to_string(args).unwrap_or_default())
}

/// Partition tool calls into batches for parallel/sequential execution.
///
/// The flattened batch order equals the input order, and every batch
/// containing a mutating call has length 1.
pub(crate) fn partition_tool_calls(
    calls: &[ToolCall],
    registry: &ToolRegistry,
) -> Vec<Vec<ToolCall>> {
    let mut batches: Vec<Vec<ToolCall>> = Vec::new();
    let mut current_parallel: Vec<ToolCall> = Vec::new();

    for tc in calls {
        if registry.is_parallel_safe(&tc.name) {
            current_parallel.push(tc.clone());
        } else {
            if !current_parallel.is_empty() {
                batches.push(std::mem::take(&mut current_parallel));
            }
            batches.push(vec![tc.clone()]);
        }
    }
    if !current_parallel.is_empty() {
        batches.push(current_parallel);
    }
    batches
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Execute all pending tool calls and return results.
pub async fn act_node(state: &AgentState, ctx: &NodeContext) -> Result<StateUpdate> {
    if state.pending_tool_calls.is_empty() {
        return Ok(StateUpdate {
            pending_tool_calls: Some(Vec::new()),
            tool_results: Some(Vec::new()),
            ..Default::default()
        });
    }

    let guard = SafetyGuard::from_project(&state.cwd);
    let mut cache = state.tool_cache.clone();

    // Pre-dispatch safety screen. Blocked calls are answered with a
    // synthesized error result and never reach an adapter.
    let mut blocked: HashMap<String, String> = HashMap::new();
    for tc in &state.pending_tool_calls {
        let violations = guard.check_tool_call(&tc.name, &tc.args);
        if guard.should_block(&violations) {
            blocked.insert(
                tc.id.clone(),
                format!(
                    "Safety guard BLOCKED this operation:\n{}",
                    guard.format_violations(&violations)
                ),
            );
        }
    }

    // Every surviving call is announced before any execution begins.
    for tc in &state.pending_tool_calls {
        if blocked.contains_key(&tc.id) {
            continue;
        }
        ctx.publish(AgentEvent::new(
            EventKind::ToolCall,
            &state.run_id,
            state.iteration,
            json!({"tool": tc.name, "args": tc.args}),
        ));
    }

    let mut tool_results: Vec<ToolResult> = Vec::new();
    let mut tool_messages: Vec<ChatMessage> = Vec::new();
    let batches = partition_tool_calls(&state.pending_tool_calls, &ctx.registry);
    let mut cancelled = false;

    for batch in batches {
        // Closing the bus cancels the run; remaining calls are answered
        // without dispatch so accounting stays exact.
        if ctx.event_bus.is_closed() {
            cancelled = true;
        }

        let mut outcomes: Vec<Option<(String, bool)>> = vec![None; batch.len()];
        let mut dispatch_indices: Vec<usize> = Vec::new();

        for (i, tc) in batch.iter().enumerate() {
            if let Some(content) = blocked.get(&tc.id) {
                outcomes[i] = Some((content.clone(), true));
            } else if cancelled {
                outcomes[i] = Some(("Cancelled before dispatch".to_string(), true));
            } else if ctx.registry.is_parallel_safe(&tc.name) {
                if let Some(content) = cache.get(&cache_fingerprint(&tc.name, &tc.args)) {
                    debug!("tool cache hit: {}", tc.name);
                    outcomes[i] = Some((content.clone(), false));
                } else {
                    dispatch_indices.push(i);
                }
            } else {
                dispatch_indices.push(i);
            }
        }

        if dispatch_indices.len() > 1 {
            ctx.publish(AgentEvent::new(
                EventKind::Log,
                &state.run_id,
                state.iteration,
                json!({
                    "message": format!("Executing {} tools in parallel", dispatch_indices.len()),
                    "level": "info",
                }),
            ));
        }

        if dispatch_indices.len() == 1 {
            let i = dispatch_indices[0];
            let tc = &batch[i];
            outcomes[i] = Some(ctx.registry.dispatch(&tc.name, &tc.args, &state.cwd).await);
        } else if !dispatch_indices.is_empty() {
            let futures = dispatch_indices.iter().map(|&i| {
                let tc = &batch[i];
                ctx.registry.dispatch(&tc.name, &tc.args, &state.cwd)
            });
            let results = join_all(futures).await;
            for (&i, outcome) in dispatch_indices.iter().zip(results) {
                outcomes[i] = Some(outcome);
            }
        }

        // Record in issue order: events, state results, history messages.
        for (tc, outcome) in batch.iter().zip(outcomes) {
            let (content, error) =
                outcome.unwrap_or_else(|| ("Tool produced no output".to_string(), true));

            if !blocked.contains_key(&tc.id) {
                ctx.publish(AgentEvent::new(
                    EventKind::ToolResult,
                    &state.run_id,
                    state.iteration,
                    json!({
                        "tool": tc.name,
                        "content": truncate_chars(&content, 500),
                        "error": error,
                    }),
                ));
            }

            if !error && ctx.registry.is_parallel_safe(&tc.name) {
                cache.insert(cache_fingerprint(&tc.name, &tc.args), content.clone());
            }

            tool_results.push(ToolResult {
                tool_call_id: tc.id.clone(),
                name: tc.name.clone(),
                content: content.clone(),
                error,
            });
            tool_messages.push(ChatMessage::tool(&tc.id, &tc.name, content));
        }
    }

    Ok(StateUpdate {
        messages: tool_messages,
        tool_results: Some(tool_results),
        pending_tool_calls: Some(Vec::new()),
        tool_cache: Some(cache),
        ..Default::default()
    })
}
