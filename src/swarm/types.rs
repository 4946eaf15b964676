//! Shared types for the swarm module.

use serde::{Deserialize, Serialize};

/// A single sub-task produced by the decomposer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub focus_files: Vec<String>,
    #[serde(default)]
    pub strategy_hint: String,
    /// Optional specialist role: researcher, analyst, reviewer, synthesizer.
    #[serde(default)]
    pub role: String,
}

/// Result from a single worker agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    pub task_id: String,
    pub description: String,
    /// "achieved" | "failed"
    pub status: String,
    pub findings: String,
    pub iterations_used: u32,
    pub tokens_used: u64,
    pub cost_usd: f64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Aggregated result from a swarm run.
#[derive(Debug, Clone)]
pub struct SwarmResult {
    /// "achieved" | "partial" | "failed"
    pub status: String,
    pub worker_results: Vec<WorkerResult>,
    /// LLM-generated synthesis of all findings.
    pub synthesis: String,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub total_iterations: u32,
}
