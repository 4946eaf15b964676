//! Experiment tracking - local JSON-backed experiment registry.
//!
//! One file per experiment under `.retrai/experiments/`, single writer
//! per file, no cross-file invariants.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::Result;

const EXPERIMENTS_DIR: &str = ".retrai/experiments";

/// A recorded experiment with hypothesis, parameters, and results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub hypothesis: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// "confirmed" | "rejected" | "inconclusive" | "error" | ""
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub notes: String,
    /// "running" | "completed" | "failed"
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: f64,
    #[serde(default)]
    pub completed_at: Option<f64>,
}

impl Experiment {
    pub fn new(name: impl Into<String>) -> Self {
        Experiment {
            id: Uuid::new_v4().to_string()[..8].to_string(),
            name: name.into(),
            hypothesis: String::new(),
            parameters: BTreeMap::new(),
            metrics: BTreeMap::new(),
            result: String::new(),
            notes: String::new(),
            status: "running".to_string(),
            tags: Vec::new(),
            created_at: Utc::now().timestamp_millis() as f64 / 1000.0,
            completed_at: None,
        }
    }
}

/// JSON-backed experiment tracker for a project.
pub struct ExperimentTracker {
    dir: PathBuf,
}

impl ExperimentTracker {
    pub fn new(cwd: &Path) -> Self {
        ExperimentTracker {
            dir: cwd.join(EXPERIMENTS_DIR),
        }
    }

    /// Save an experiment; returns its id.
    pub fn log(&self, experiment: &Experiment) -> Result<String> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.json", experiment.id));
        std::fs::write(&path, serde_json::to_string_pretty(experiment)?)?;
        Ok(experiment.id.clone())
    }

    /// Load an experiment by id.
    pub fn get(&self, id: &str) -> Option<Experiment> {
        let path = self.dir.join(format!("{}.json", id));
        let data = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&data).ok()
    }

    /// List experiments, newest file first, optionally filtered.
    pub fn list(&self, tag: Option<&str>, status: Option<&str>) -> Vec<Experiment> {
        let Ok(rd) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = rd
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        paths.sort();
        paths.reverse();

        paths
            .into_iter()
            .filter_map(|p| {
                let data = std::fs::read_to_string(p).ok()?;
                serde_json::from_str::<Experiment>(&data).ok()
            })
            .filter(|e| tag.map(|t| e.tags.iter().any(|x| x == t)).unwrap_or(true))
            .filter(|e| status.map(|s| e.status == s).unwrap_or(true))
            .collect()
    }

    /// Compare metrics across experiments, ranking best/worst per metric.
    pub fn compare(&self, ids: &[String]) -> Value {
        let experiments: Vec<Experiment> =
            ids.iter().filter_map(|id| self.get(id)).collect();
        if experiments.is_empty() {
            return json!({"error": "No experiments found"});
        }

        let mut all_metrics: Vec<String> = experiments
            .iter()
            .flat_map(|e| e.metrics.keys().cloned())
            .collect();
        all_metrics.sort();
        all_metrics.dedup();

        let rows: Vec<Value> = experiments
            .iter()
            .map(|e| {
                json!({
                    "id": e.id,
                    "name": e.name,
                    "result": e.result,
                    "metrics": e.metrics,
                    "parameters": e.parameters,
                })
            })
            .collect();

        let mut comparison = json!({
            "experiments": rows,
            "metrics_compared": all_metrics,
        });

        if experiments.len() > 1 {
            let mut rankings = serde_json::Map::new();
            for metric in comparison["metrics_compared"]
                .as_array()
                .cloned()
                .unwrap_or_default()
            {
                let metric = metric.as_str().unwrap_or_default().to_string();
                let values: Vec<(&str, f64)> = experiments
                    .iter()
                    .filter_map(|e| e.metrics.get(&metric).map(|v| (e.id.as_str(), *v)))
                    .collect();
                if let (Some(best), Some(worst)) = (
                    values
                        .iter()
                        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)),
                    values
                        .iter()
                        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)),
                ) {
                    rankings.insert(
                        metric,
                        json!({
                            "best": format!("{} ({})", best.0, best.1),
                            "worst": format!("{} ({})", worst.0, worst.1),
                        }),
                    );
                }
            }
            comparison["rankings"] = Value::Object(rankings);
        }

        comparison
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp(name: &str, metric: f64, tag: &str) -> Experiment {
        let mut e = Experiment::new(name);
        e.metrics.insert("accuracy".to_string(), metric);
        e.tags.push(tag.to_string());
        e.result = "confirmed".to_string();
        e.status = "completed".to_string();
        e
    }

    #[test]
    fn log_and_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ExperimentTracker::new(dir.path());
        let e = exp("baseline", 0.8, "ml");
        let id = tracker.log(&e).unwrap();
        let loaded = tracker.get(&id).unwrap();
        assert_eq!(loaded.name, "baseline");
        assert_eq!(loaded.metrics["accuracy"], 0.8);
    }

    #[test]
    fn list_filters_by_tag_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ExperimentTracker::new(dir.path());
        tracker.log(&exp("a", 0.7, "ml")).unwrap();
        tracker.log(&exp("b", 0.9, "nlp")).unwrap();

        assert_eq!(tracker.list(Some("ml"), None).len(), 1);
        assert_eq!(tracker.list(None, Some("completed")).len(), 2);
        assert_eq!(tracker.list(None, Some("running")).len(), 0);
    }

    #[test]
    fn compare_ranks_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ExperimentTracker::new(dir.path());
        let a = exp("a", 0.7, "ml");
        let b = exp("b", 0.9, "ml");
        let ids = vec![tracker.log(&a).unwrap(), tracker.log(&b).unwrap()];

        let comparison = tracker.compare(&ids);
        let best = comparison["rankings"]["accuracy"]["best"].as_str().unwrap();
        assert!(best.starts_with(&b.id));
    }

    #[test]
    fn missing_dir_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ExperimentTracker::new(dir.path());
        assert!(tracker.list(None, None).is_empty());
    }
}
