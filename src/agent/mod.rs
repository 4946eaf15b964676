//! Agent module - the iterative controller at the heart of retrAI
//!
//! Four nodes composed into a loop: `plan` calls the LLM and extracts
//! tool calls, `act` dispatches them, `evaluate` checks the goal and
//! decides termination, and `reflect` breaks stuck patterns. The
//! [`GraphRunner`] binds them together with a conditional edge table.

mod act;
mod context;
mod evaluate;
mod graph;
mod plan;
mod reflect;
mod state;

use std::sync::Arc;

use crate::events::{AgentEvent, EventBus};
use crate::goals::Goal;
use crate::llm::{CostEstimator, LlmFactory};
use crate::tools::ToolRegistry;

pub use context::build_auto_context;
pub use graph::{GraphRunner, Node, RunOutcome};
pub use state::{AgentState, StateUpdate, ToolCall, ToolResult};

/// Everything a node needs besides the state: the bus, the goal, the
/// tool registry, and the LLM factory.
pub struct NodeContext {
    pub event_bus: Arc<EventBus>,
    pub goal: Option<Arc<dyn Goal>>,
    pub registry: Arc<ToolRegistry>,
    pub llm_factory: Arc<dyn LlmFactory>,
    pub cost: CostEstimator,
    /// Role-specific prompt appended for swarm workers.
    pub role_prompt: String,
    /// Mixture-of-Personas fan-out; 0 or 1 disables MoP.
    pub mop_k: u32,
}

impl NodeContext {
    pub fn new(
        event_bus: Arc<EventBus>,
        goal: Option<Arc<dyn Goal>>,
        registry: Arc<ToolRegistry>,
        llm_factory: Arc<dyn LlmFactory>,
    ) -> Self {
        NodeContext {
            event_bus,
            goal,
            registry,
            llm_factory,
            cost: CostEstimator::new(),
            role_prompt: String::new(),
            mop_k: 0,
        }
    }

    pub(crate) fn publish(&self, event: AgentEvent) {
        self.event_bus.publish(event);
    }

    pub(crate) fn mop_enabled(&self) -> bool {
        self.mop_k > 1
    }
}
