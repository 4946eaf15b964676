//! Swarm - parallel multi-agent execution of a decomposed goal
//!
//! Three phases: an LLM decomposes the goal into independent sub-tasks,
//! one worker graph runs per sub-task fully in parallel, and a final
//! LLM call synthesizes the findings.

mod decomposer;
mod orchestrator;
mod roles;
mod types;
mod worker;

pub use decomposer::decompose_goal;
pub use orchestrator::SwarmOrchestrator;
pub use roles::{get_role, list_roles, role_prompt, WorkerRole};
pub use types::{SubTask, SwarmResult, WorkerResult};
pub use worker::run_worker;
