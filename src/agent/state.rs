//! Shared agent state threaded through the graph.
//!
//! `AgentState` is a single flat record. Nodes never mutate it directly;
//! each node returns a [`StateUpdate`] partial record which the graph
//! runner merges with fixed reducer rules: `messages` is append-only,
//! every other field is overwrite-if-set.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{RunConfig, StopMode};
use crate::llm::ChatMessage;

pub use crate::llm::ToolCallRequest as ToolCall;

/// Result of one executed tool call, paired via `tool_call_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
    pub error: bool,
}

/// The single shared record driven through plan → act → evaluate → reflect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    /// Full conversation history; system message (if any) is index 0.
    pub messages: Vec<ChatMessage>,
    /// Tool calls requested by the LLM in the last plan step.
    pub pending_tool_calls: Vec<ToolCall>,
    /// Results of the most recent act batch.
    pub tool_results: Vec<ToolResult>,
    pub goal_achieved: bool,
    pub goal_reason: String,
    /// Incremented exactly once per evaluate.
    pub iteration: u32,
    pub max_iterations: u32,
    pub stop_mode: StopMode,
    pub hitl_enabled: bool,
    pub model_name: String,
    pub cwd: PathBuf,
    pub run_id: String,
    pub total_tokens: u64,
    pub estimated_cost_usd: f64,
    /// 0 means no cost limit.
    pub max_cost_usd: f64,
    /// Short summaries of previously failed approaches (last 10 kept).
    pub failed_strategies: Vec<String>,
    pub consecutive_failures: u32,
    /// Read-only tool result cache, keyed by canonical (name, args) JSON.
    pub tool_cache: HashMap<String, String>,
}

impl AgentState {
    /// Fresh state at run start: all accumulators zero, collections empty.
    pub fn from_config(cfg: &RunConfig) -> Self {
        AgentState {
            messages: Vec::new(),
            pending_tool_calls: Vec::new(),
            tool_results: Vec::new(),
            goal_achieved: false,
            goal_reason: String::new(),
            iteration: 0,
            max_iterations: cfg.max_iterations,
            stop_mode: cfg.stop_mode,
            hitl_enabled: cfg.hitl_enabled,
            model_name: cfg.model_name.clone(),
            cwd: cfg.cwd.clone(),
            run_id: cfg.run_id.clone(),
            total_tokens: 0,
            estimated_cost_usd: 0.0,
            max_cost_usd: cfg.max_cost_usd,
            failed_strategies: Vec::new(),
            consecutive_failures: 0,
            tool_cache: HashMap::new(),
        }
    }
}

/// Partial update returned by a node.
///
/// Unset fields leave the state untouched. `messages` is the one field
/// with append semantics.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub messages: Vec<ChatMessage>,
    pub pending_tool_calls: Option<Vec<ToolCall>>,
    pub tool_results: Option<Vec<ToolResult>>,
    pub goal_achieved: Option<bool>,
    pub goal_reason: Option<String>,
    pub iteration: Option<u32>,
    pub total_tokens: Option<u64>,
    pub estimated_cost_usd: Option<f64>,
    pub failed_strategies: Option<Vec<String>>,
    pub consecutive_failures: Option<u32>,
    pub tool_cache: Option<HashMap<String, String>>,
}

impl StateUpdate {
    /// Merge this update into `state` with the reducer rules.
    pub fn apply(self, state: &mut AgentState) {
        state.messages.extend(self.messages);
        if let Some(v) = self.pending_tool_calls {
            state.pending_tool_calls = v;
        }
        if let Some(v) = self.tool_results {
            state.tool_results = v;
        }
        if let Some(v) = self.goal_achieved {
            state.goal_achieved = v;
        }
        if let Some(v) = self.goal_reason {
            state.goal_reason = v;
        }
        if let Some(v) = self.iteration {
            state.iteration = v;
        }
        if let Some(v) = self.total_tokens {
            state.total_tokens = v;
        }
        if let Some(v) = self.estimated_cost_usd {
            state.estimated_cost_usd = v;
        }
        if let Some(v) = self.failed_strategies {
            state.failed_strategies = v;
        }
        if let Some(v) = self.consecutive_failures {
            state.consecutive_failures = v;
        }
        if let Some(v) = self.tool_cache {
            state.tool_cache = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;

    fn test_state() -> AgentState {
        AgentState::from_config(&RunConfig::new("cargo-test", "/tmp"))
    }

    #[test]
    fn fresh_state_is_zeroed() {
        let state = test_state();
        assert_eq!(state.iteration, 0);
        assert_eq!(state.total_tokens, 0);
        assert_eq!(state.estimated_cost_usd, 0.0);
        assert!(state.messages.is_empty());
        assert!(state.pending_tool_calls.is_empty());
        assert!(!state.goal_achieved);
    }

    #[test]
    fn reducer_appends_messages_and_overwrites_scalars() {
        let mut state = test_state();
        state.messages.push(ChatMessage::system("sys"));

        let update = StateUpdate {
            messages: vec![ChatMessage::assistant("hi")],
            iteration: Some(3),
            total_tokens: Some(100),
            ..Default::default()
        };
        update.apply(&mut state);

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].content, "sys");
        assert_eq!(state.messages[1].content, "hi");
        assert_eq!(state.iteration, 3);
        assert_eq!(state.total_tokens, 100);
        // untouched fields stay
        assert_eq!(state.max_iterations, 50);
    }

    #[test]
    fn unset_fields_leave_state_alone() {
        let mut state = test_state();
        state.goal_reason = "earlier".to_string();
        StateUpdate::default().apply(&mut state);
        assert_eq!(state.goal_reason, "earlier");
    }

    #[test]
    fn state_round_trips_through_json() {
        let state = test_state();
        let json = serde_json::to_string(&state).unwrap();
        let back: AgentState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.run_id, state.run_id);
        assert_eq!(back.max_iterations, state.max_iterations);
    }
}
