//! # retrAI
//!
//! A self-driving agent runtime: it repeatedly invokes an LLM to achieve
//! a user-stated goal over a project working tree, executing tools
//! between LLM turns until the goal is judged achieved or a budget is
//! exhausted.
//!
//! ## Architecture
//!
//! - **Agent** (`agent`): the plan → act → evaluate → reflect state
//!   graph and its runner
//! - **Events** (`events`): async fan-out bus streaming observations to
//!   subscribers
//! - **Tools** (`tools`): registry of self-contained adapters with
//!   parallel-safe classification
//! - **Safety** (`safety`): pattern-based pre-dispatch guard with risk
//!   classification
//! - **Goals** (`goals`): pluggable "what does done look like" objects
//! - **LLM** (`llm`): provider trait, OpenRouter-compatible client, and
//!   cost accounting
//! - **Swarm** (`swarm`): goal decomposition, parallel workers, and
//!   synthesis
//! - **Pipeline / Watcher / Benchmark / Review**: higher-level drivers
//!   built on the graph runner
//!
//! ## Design Principles
//!
//! 1. **Trait seams**: tools, goals, and LLM transports are traits so
//!    hosts can extend every surface
//! 2. **Graph as data**: nodes are wired by an explicit edge table and
//!    driven by a plain loop
//! 3. **Errors in band**: tool failures and judge parse errors are
//!    results the LLM sees, not exceptions
//! 4. **Safety first**: every tool call is screened before dispatch and
//!    sandboxed execution never inherits the host environment
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use retrai::config::RunConfig;
//! use retrai::llm::OpenRouterFactory;
//! use retrai::runner::run_cli;
//!
//! #[tokio::main]
//! async fn main() -> retrai::Result<()> {
//!     let factory = Arc::new(OpenRouterFactory::from_env()?);
//!     let cfg = RunConfig::new("cargo-test", ".");
//!     std::process::exit(run_cli(cfg, factory).await);
//! }
//! ```

// The iterative controller: nodes and graph runner
pub mod agent;

// Model comparison harness
pub mod benchmark;

// Run and project configuration
pub mod config;

// Error types
pub mod error;

// Async event bus
pub mod events;

// Experiment tracking
pub mod experiment;

// Goal protocol and built-in goal families
pub mod goals;

// Run history persistence
pub mod history;

// LLM transport and cost accounting
pub mod llm;

// Cross-run memory store
pub mod memory;

// Sequential multi-goal composition
pub mod pipeline;

// AI code review
pub mod review;

// CLI runner functions
pub mod runner;

// Safety guardrails
pub mod safety;

// Sandboxed subprocess execution
pub mod sandbox;

// Parallel multi-agent coordination
pub mod swarm;

// Tool trait, registry, and built-in adapters
pub mod tools;

// File watcher
pub mod watcher;

// Re-export commonly used items
pub use error::{Error, Result};

pub use agent::{AgentState, GraphRunner, NodeContext, RunOutcome, StateUpdate};
pub use config::{AgentPattern, RunConfig, StopMode};
pub use events::{AgentEvent, EventBus, EventKind, Subscription};
pub use goals::{Goal, GoalResult};
pub use llm::{LlmClient, LlmFactory};
pub use tools::{Tool, ToolOutput, ToolRegistry, ToolSchema};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
