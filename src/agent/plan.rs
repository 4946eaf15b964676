//! Plan node - calls the LLM and extracts pending tool calls.

use futures::future::join_all;
use serde_json::json;
use tracing::warn;

use crate::agent::context::build_auto_context;
use crate::agent::state::{AgentState, StateUpdate, ToolCall};
use crate::agent::NodeContext;
use crate::error::Result;
use crate::events::{AgentEvent, EventKind};
use crate::llm::{AssistantToolCall, ChatMessage, FunctionCall, LlmReply, Usage};
use crate::memory::MemoryStore;

/// Keep the conversation bounded: the system message plus the most
/// recent 59 messages are sent to the LLM.
const MAX_MESSAGES: usize = 60;

/// Persona prefixes for Mixture-of-Personas planning.
const MOP_PERSONAS: &[&str] = &[
    "You are a cautious senior engineer. Prioritize correctness, small \
     reversible steps, and verifying assumptions before acting.",
    "You are a pragmatic debugger. Prioritize reproducing the problem, \
     reading error output closely, and bisecting to the root cause.",
    "You are a creative problem solver. Prioritize unconventional angles: \
     different libraries, different algorithms, restructuring the code.",
];

/// Call the LLM to decide the next actions.
pub async fn plan_node(state: &AgentState, ctx: &NodeContext) -> Result<StateUpdate> {
    ctx.publish(AgentEvent::new(
        EventKind::StepStart,
        &state.run_id,
        state.iteration,
        json!({"node": "plan", "iteration": state.iteration}),
    ));

    // First iteration: build the system prompt.
    let mut new_messages: Vec<ChatMessage> = Vec::new();
    let mut messages = state.messages.clone();
    if messages.is_empty() {
        let system = build_system_prompt(state, ctx);
        let system_message = ChatMessage::system(system);
        messages.push(system_message.clone());
        new_messages.push(system_message);
    }

    let messages = trim_messages(messages);
    let definitions = ctx.registry.list_definitions();

    let client = match ctx.llm_factory.client(&state.model_name) {
        Ok(c) => c,
        Err(e) => return Ok(planner_error_update(state, new_messages, e.to_string())),
    };

    let reply = if ctx.mop_enabled() {
        plan_with_mop(state, ctx, &messages, &definitions, ctx.mop_k as usize).await
    } else {
        client.invoke(&messages, &definitions).await
    };

    let reply = match reply {
        Ok(reply) => reply,
        Err(e) => {
            warn!("LLM invocation failed: {}", e);
            return Ok(planner_error_update(state, new_messages, e.to_string()));
        }
    };

    // Token accounting. A reply without usage metadata counts as zero;
    // cost caps see no progress in that regime.
    let usage = reply.usage.clone().unwrap_or_default();
    if reply.usage.is_some() {
        ctx.publish(AgentEvent::new(
            EventKind::LlmUsage,
            &state.run_id,
            state.iteration,
            json!({
                "prompt_tokens": usage.prompt_tokens,
                "completion_tokens": usage.completion_tokens,
                "total_tokens": usage.prompt_tokens + usage.completion_tokens,
                "model": state.model_name,
            }),
        ));
    }

    if !reply.content.trim().is_empty() {
        ctx.publish(AgentEvent::new(
            EventKind::Reasoning,
            &state.run_id,
            state.iteration,
            json!({
                "text": reply.content,
                "model": state.model_name,
                "has_tool_calls": !reply.tool_calls.is_empty(),
            }),
        ));
    }

    let pending: Vec<ToolCall> = reply.tool_calls.clone();
    new_messages.push(assistant_message(&reply));

    let total_tokens = state.total_tokens + usage.prompt_tokens + usage.completion_tokens;
    let cost = state.estimated_cost_usd
        + ctx
            .cost
            .estimate(&state.model_name, usage.prompt_tokens, usage.completion_tokens);

    Ok(StateUpdate {
        messages: new_messages,
        pending_tool_calls: Some(pending),
        tool_results: Some(Vec::new()),
        total_tokens: Some(total_tokens),
        estimated_cost_usd: Some(cost),
        ..Default::default()
    })
}

/// Mixture-of-Personas: k parallel persona completions, then one
/// aggregation call with tools bound. Only the final call's tool calls
/// are kept; usage is accumulated across all calls.
async fn plan_with_mop(
    state: &AgentState,
    ctx: &NodeContext,
    messages: &[ChatMessage],
    definitions: &[crate::llm::ToolDefinition],
    k: usize,
) -> Result<LlmReply> {
    let client = ctx.llm_factory.client(&state.model_name)?;

    let persona_calls = (0..k).map(|i| {
        let persona = MOP_PERSONAS[i % MOP_PERSONAS.len()];
        let mut persona_messages = messages.to_vec();
        persona_messages.push(ChatMessage::user(format!(
            "{}\n\nPropose your plan for the next step. Text only, no tool calls.",
            persona
        )));
        let client = client.clone();
        async move { client.invoke(&persona_messages, &[]).await }
    });
    let persona_replies = join_all(persona_calls).await;

    let mut total_usage = Usage::default();
    let mut proposals: Vec<String> = Vec::new();
    for (i, reply) in persona_replies.into_iter().enumerate() {
        match reply {
            Ok(reply) => {
                if let Some(usage) = reply.usage {
                    total_usage.prompt_tokens += usage.prompt_tokens;
                    total_usage.completion_tokens += usage.completion_tokens;
                }
                proposals.push(format!("### Persona {}\n{}", i + 1, reply.content));
            }
            Err(e) => warn!("MoP persona call {} failed: {}", i + 1, e),
        }
    }

    let mut final_messages = messages.to_vec();
    final_messages.push(ChatMessage::user(format!(
        "Several independent plans were proposed:\n\n{}\n\n\
         Synthesize the best elements into ONE plan and execute its first \
         step now, using tool calls.",
        proposals.join("\n\n")
    )));

    let mut final_reply = client.invoke(&final_messages, definitions).await?;
    if let Some(usage) = final_reply.usage.take() {
        total_usage.prompt_tokens += usage.prompt_tokens;
        total_usage.completion_tokens += usage.completion_tokens;
    }
    total_usage.total_tokens = total_usage.prompt_tokens + total_usage.completion_tokens;
    final_reply.usage = Some(total_usage);
    Ok(final_reply)
}

/// On transport failure the error text becomes the assistant message and
/// no tool calls are dispatched; the next evaluate proceeds normally.
fn planner_error_update(
    state: &AgentState,
    mut new_messages: Vec<ChatMessage>,
    error: String,
) -> StateUpdate {
    new_messages.push(ChatMessage::assistant(format!("LLM error: {}", error)));
    StateUpdate {
        messages: new_messages,
        pending_tool_calls: Some(Vec::new()),
        tool_results: Some(Vec::new()),
        total_tokens: Some(state.total_tokens),
        estimated_cost_usd: Some(state.estimated_cost_usd),
        ..Default::default()
    }
}

fn assistant_message(reply: &LlmReply) -> ChatMessage {
    let mut message = ChatMessage::assistant(reply.content.clone());
    if !reply.tool_calls.is_empty() {
        message.tool_calls = Some(
            reply
                .tool_calls
                .iter()
                .map(|tc| AssistantToolCall {
                    id: tc.id.clone(),
                    call_type: "function".to_string(),
                    function: FunctionCall {
                        name: tc.name.clone(),
                        arguments: serde_json::to_string(&tc.args).unwrap_or_default(),
                    },
                })
                .collect(),
        );
    }
    message
}

/// Keep the first (system) message and the most recent tail.
fn trim_messages(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    if messages.len() <= MAX_MESSAGES {
        return messages;
    }
    let mut trimmed = vec![messages[0].clone()];
    trimmed.extend(
        messages[messages.len() - (MAX_MESSAGES - 1)..]
            .iter()
            .cloned(),
    );
    trimmed
}

fn build_system_prompt(state: &AgentState, ctx: &NodeContext) -> String {
    let goal_prompt = match &ctx.goal {
        Some(goal) => goal.system_prompt(&state.cwd),
        None => "Complete the task.".to_string(),
    };

    let mut system = format!(
        "You are retrAI, an autonomous software engineering agent. \
         You are an expert programmer who solves problems methodically \
         and NEVER gives up.\n\n\
         **Project directory**: `{}`\n\
         **Max iterations**: {}\n\n\
         ## Your Goal\n{}\n\n\
         ## Strategy\n\
         1. **Understand first**: Use `grep_search` and `find_files` to \
         quickly locate relevant code. Read key files.\n\
         2. **Search code, not files**: Prefer `grep_search` over manually \
         reading files to find definitions and usages.\n\
         3. **Execute scripts**: You can run any CLI tool via `bash_exec` \
         to test ideas, validate hypotheses, or generate data.\n\
         4. **Iterate**: After each change, run tests/checks to verify. \
         If tests fail, read the error output carefully, diagnose the \
         root cause, and fix it.\n\
         5. **Try alternatives**: If your first approach doesn't work, \
         step back and try a completely different strategy.\n\n\
         ## Critical Rules\n\
         - **NEVER give up** while you have iterations remaining.\n\
         - Prefer `file_patch` over `file_write` for targeted edits.\n\
         - Prefer `grep_search` over `bash_exec` with grep — it's faster \
         and returns structured results.\n\
         - Always verify your changes by running the relevant tests or checks.\n\
         - Be precise with file paths (relative to project root).\n\
         - Think step-by-step. Show your reasoning before acting.",
        state.cwd.display(),
        state.max_iterations,
        goal_prompt,
    );

    if !ctx.role_prompt.is_empty() {
        system.push_str("\n\n");
        system.push_str(&ctx.role_prompt);
    }

    let context = build_auto_context(&state.cwd);
    if !context.is_empty() {
        system.push_str("\n\n## Project Context (auto-detected)\n");
        system.push_str(&context);
    }

    let memories = MemoryStore::new(&state.cwd).format_for_prompt(10);
    if !memories.is_empty() {
        system.push_str("\n\n");
        system.push_str(&memories);
    }

    system
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::events::EventBus;
    use crate::llm::testing::{ScriptedFactory, ScriptedLlm};
    use crate::llm::ToolCallRequest;
    use std::sync::Arc;

    fn ctx_with(llm: Arc<ScriptedLlm>) -> NodeContext {
        NodeContext {
            event_bus: Arc::new(EventBus::new()),
            goal: None,
            registry: Arc::new(crate::tools::create_default_registry()),
            llm_factory: Arc::new(ScriptedFactory(llm)),
            cost: crate::llm::CostEstimator::new(),
            role_prompt: String::new(),
            mop_k: 0,
        }
    }

    fn state_in(dir: &std::path::Path) -> AgentState {
        let mut cfg = RunConfig::new("cargo-test", dir);
        cfg.model_name = "claude-sonnet-4-6".to_string();
        AgentState::from_config(&cfg)
    }

    #[tokio::test]
    async fn first_plan_injects_system_prompt_and_extracts_calls() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new(vec![crate::llm::LlmReply {
            content: "let me look around".to_string(),
            tool_calls: vec![ToolCallRequest {
                id: "c1".to_string(),
                name: "file_read".to_string(),
                args: serde_json::json!({"path": "Cargo.toml"}),
            }],
            usage: Some(Usage {
                prompt_tokens: 100,
                completion_tokens: 20,
                total_tokens: 120,
            }),
        }]);
        let ctx = ctx_with(llm);
        let state = state_in(dir.path());

        let update = plan_node(&state, &ctx).await.unwrap();

        assert_eq!(update.messages.len(), 2);
        assert_eq!(update.messages[0].role, crate::llm::Role::System);
        assert!(update.messages[0].content.contains("retrAI"));
        let pending = update.pending_tool_calls.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "file_read");
        assert_eq!(update.total_tokens, Some(120));
        assert!(update.estimated_cost_usd.unwrap() > 0.0);
        assert_eq!(update.tool_results.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn second_plan_keeps_existing_system_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new(vec![ScriptedLlm::text_reply("done", 10, 5)]);
        let ctx = ctx_with(llm);
        let mut state = state_in(dir.path());
        state.messages.push(ChatMessage::system("existing"));
        state.messages.push(ChatMessage::user("go"));

        let update = plan_node(&state, &ctx).await.unwrap();
        // Only the assistant reply is appended.
        assert_eq!(update.messages.len(), 1);
        assert_eq!(update.messages[0].role, crate::llm::Role::Assistant);
    }

    #[tokio::test]
    async fn tokens_accumulate_monotonically() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new(vec![ScriptedLlm::text_reply("a", 50, 10)]);
        let ctx = ctx_with(llm);
        let mut state = state_in(dir.path());
        state.total_tokens = 1000;
        state.estimated_cost_usd = 0.5;

        let update = plan_node(&state, &ctx).await.unwrap();
        assert_eq!(update.total_tokens, Some(1060));
        assert!(update.estimated_cost_usd.unwrap() >= 0.5);
    }

    #[tokio::test]
    async fn missing_usage_counts_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new(vec![crate::llm::LlmReply {
            content: "no metadata".to_string(),
            tool_calls: vec![],
            usage: None,
        }]);
        let ctx = ctx_with(llm);
        let state = state_in(dir.path());

        let update = plan_node(&state, &ctx).await.unwrap();
        assert_eq!(update.total_tokens, Some(0));
        assert_eq!(update.estimated_cost_usd, Some(0.0));
    }

    #[test]
    fn trim_keeps_system_message_and_recent_tail() {
        let mut messages = vec![ChatMessage::system("sys")];
        for i in 0..100 {
            messages.push(ChatMessage::user(format!("m{}", i)));
        }
        let trimmed = trim_messages(messages);
        assert_eq!(trimmed.len(), MAX_MESSAGES);
        assert_eq!(trimmed[0].content, "sys");
        assert_eq!(trimmed.last().unwrap().content, "m99");
    }

    #[tokio::test]
    async fn mop_runs_personas_then_aggregates() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm::new(vec![
            ScriptedLlm::text_reply("persona plan 1", 10, 5),
            ScriptedLlm::text_reply("persona plan 2", 10, 5),
            crate::llm::LlmReply {
                content: "final plan".to_string(),
                tool_calls: vec![ToolCallRequest {
                    id: "c1".to_string(),
                    name: "grep_search".to_string(),
                    args: serde_json::json!({"pattern": "todo"}),
                }],
                usage: Some(Usage {
                    prompt_tokens: 30,
                    completion_tokens: 10,
                    total_tokens: 40,
                }),
            },
        ]);
        let mut ctx = ctx_with(llm.clone());
        ctx.mop_k = 2;
        let state = state_in(dir.path());

        let update = plan_node(&state, &ctx).await.unwrap();
        // 2 persona calls + 1 aggregation call
        assert_eq!(llm.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        // Only the final call's tool calls are kept.
        let pending = update.pending_tool_calls.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "grep_search");
        // Usage accumulated across all three calls.
        assert_eq!(update.total_tokens, Some(70));
    }
}
