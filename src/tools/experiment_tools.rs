//! Experiment tools - log and list experiments from the agent loop

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::traits::{Tool, ToolOutput};
use crate::error::Result;
use crate::experiment::{Experiment, ExperimentTracker};

/// Built-in tool: record an experiment
pub struct ExperimentLogTool;

#[async_trait]
impl Tool for ExperimentLogTool {
    fn name(&self) -> &str {
        "experiment_log"
    }

    fn description(&self) -> &str {
        "Log an experiment with hypothesis, parameters, metrics, and result for reproducibility"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Experiment name"},
                "hypothesis": {"type": "string", "description": "What is being tested"},
                "parameters": {"type": "object", "description": "Input parameters"},
                "metrics": {"type": "object", "description": "Numeric outcome metrics"},
                "result": {"type": "string", "description": "confirmed | rejected | inconclusive | error"},
                "notes": {"type": "string", "description": "Free-form notes"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Tags for filtering"}
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, args: &Value, cwd: &Path) -> Result<ToolOutput> {
        let name = match args.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => return Ok(ToolOutput::err("Missing 'name' parameter")),
        };

        let mut experiment = Experiment::new(name);
        if let Some(h) = args.get("hypothesis").and_then(|v| v.as_str()) {
            experiment.hypothesis = h.to_string();
        }
        if let Some(params) = args.get("parameters").and_then(|v| v.as_object()) {
            for (k, v) in params {
                experiment.parameters.insert(k.clone(), v.clone());
            }
        }
        if let Some(metrics) = args.get("metrics").and_then(|v| v.as_object()) {
            for (k, v) in metrics {
                if let Some(n) = v.as_f64() {
                    experiment.metrics.insert(k.clone(), n);
                }
            }
        }
        if let Some(r) = args.get("result").and_then(|v| v.as_str()) {
            experiment.result = r.to_string();
            if !r.is_empty() {
                experiment.status = "completed".to_string();
                experiment.completed_at =
                    Some(Utc::now().timestamp_millis() as f64 / 1000.0);
            }
        }
        if let Some(n) = args.get("notes").and_then(|v| v.as_str()) {
            experiment.notes = n.to_string();
        }
        if let Some(tags) = args.get("tags").and_then(|v| v.as_array()) {
            experiment.tags = tags
                .iter()
                .filter_map(|t| t.as_str().map(|s| s.to_string()))
                .collect();
        }

        let tracker = ExperimentTracker::new(cwd);
        match tracker.log(&experiment) {
            Ok(id) => Ok(ToolOutput::ok(
                serde_json::to_string_pretty(&json!({
                    "experiment_id": id,
                    "status": experiment.status,
                }))
                .unwrap_or_default(),
            )),
            Err(e) => Ok(ToolOutput::err(format!("Failed to log experiment: {}", e))),
        }
    }
}

/// Built-in tool: list or compare past experiments
pub struct ExperimentListTool;

#[async_trait]
impl Tool for ExperimentListTool {
    fn name(&self) -> &str {
        "experiment_list"
    }

    fn description(&self) -> &str {
        "List or compare past experiments"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "tag": {"type": "string", "description": "Filter by tag"},
                "status": {"type": "string", "description": "Filter by status"},
                "compare_ids": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Compare metrics across these experiment ids"
                }
            },
            "required": []
        })
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Value, cwd: &Path) -> Result<ToolOutput> {
        let tracker = ExperimentTracker::new(cwd);

        if let Some(ids) = args.get("compare_ids").and_then(|v| v.as_array()) {
            let ids: Vec<String> = ids
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect();
            if !ids.is_empty() {
                let comparison = tracker.compare(&ids);
                return Ok(ToolOutput::ok(
                    serde_json::to_string_pretty(&comparison).unwrap_or_default(),
                ));
            }
        }

        let tag = args.get("tag").and_then(|v| v.as_str());
        let status = args.get("status").and_then(|v| v.as_str());
        let experiments = tracker.list(tag, status);
        let items: Vec<Value> = experiments
            .iter()
            .map(|e| {
                json!({
                    "id": e.id,
                    "name": e.name,
                    "result": e.result,
                    "status": e.status,
                    "metrics": e.metrics,
                    "tags": e.tags,
                })
            })
            .collect();

        Ok(ToolOutput::ok(
            serde_json::to_string_pretty(&json!({
                "total": items.len(),
                "experiments": items,
            }))
            .unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn log_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let out = ExperimentLogTool
            .execute(
                &json!({
                    "name": "lr-sweep",
                    "metrics": {"accuracy": 0.93},
                    "result": "confirmed",
                    "tags": ["ml"]
                }),
                dir.path(),
            )
            .await
            .unwrap();
        assert!(!out.error, "{}", out.content);

        let out = ExperimentListTool
            .execute(&json!({"tag": "ml"}), dir.path())
            .await
            .unwrap();
        assert!(out.content.contains("lr-sweep"));
        assert!(out.content.contains("\"total\": 1"));
    }
}
