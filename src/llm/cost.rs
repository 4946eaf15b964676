//! Dollar-cost estimation for LLM token usage.
//!
//! A registered lookup function is tried first; on miss, a built-in
//! per-1M-token price table keyed by model-name prefix is consulted.
//! Unknown models cost 0.0.

use std::sync::Arc;

/// Host-provided price lookup: `(model, prompt_tokens, completion_tokens) -> cost`.
pub type CostLookup = dyn Fn(&str, u64, u64) -> Option<f64> + Send + Sync;

/// Fallback prices in USD per 1M tokens: (model prefix, input, output).
const FALLBACK_PRICES: &[(&str, f64, f64)] = &[
    ("claude-sonnet-4-6", 3.0, 15.0),
    ("claude-opus-4-6", 15.0, 75.0),
    ("gpt-4o", 2.5, 10.0),
    ("gpt-4.1", 2.0, 8.0),
    ("o4-mini", 1.1, 4.4),
    ("gemini-2.5-pro", 1.25, 10.0),
];

/// Estimates run cost from token counts.
#[derive(Clone, Default)]
pub struct CostEstimator {
    lookup: Option<Arc<CostLookup>>,
    table: Vec<(String, f64, f64)>,
}

impl CostEstimator {
    /// Estimator with the built-in fallback table only.
    pub fn new() -> Self {
        CostEstimator {
            lookup: None,
            table: FALLBACK_PRICES
                .iter()
                .map(|(p, i, o)| (p.to_string(), *i, *o))
                .collect(),
        }
    }

    /// Install a host lookup that is consulted before the table.
    pub fn with_lookup(mut self, lookup: Arc<CostLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Replace the fallback table with a richer one.
    pub fn with_table(mut self, table: Vec<(String, f64, f64)>) -> Self {
        self.table = table;
        self
    }

    /// Estimate cost in USD for one LLM call.
    pub fn estimate(&self, model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        if let Some(ref lookup) = self.lookup {
            if let Some(cost) = lookup(model, prompt_tokens, completion_tokens) {
                return cost;
            }
        }
        for (prefix, input_price, output_price) in &self.table {
            if model.contains(prefix.as_str()) {
                return (prompt_tokens as f64 * input_price
                    + completion_tokens as f64 * output_price)
                    / 1_000_000.0;
            }
        }
        0.0
    }
}
