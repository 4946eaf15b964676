//! Run history persistence - append-only run summaries on disk.
//!
//! One JSON file per run at `.retrai/history/<run_id>.json`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;

const HISTORY_DIR: &str = ".retrai/history";

/// A persisted summary of an agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub goal: String,
    pub model: String,
    /// "achieved" | "failed" | "aborted"
    pub status: String,
    pub iterations: u32,
    pub max_iterations: u32,
    pub total_tokens: u64,
    pub estimated_cost_usd: f64,
    /// Unix timestamps in seconds.
    pub started_at: f64,
    pub finished_at: f64,
    pub duration_seconds: f64,
    pub reason: String,
    pub cwd: String,
    #[serde(default)]
    pub files_changed: Vec<String>,
}

/// Current time as fractional Unix seconds.
pub fn now_ts() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Save a run record to `.retrai/history/<run_id>.json`, returning the
/// path to the saved file.
#[allow(clippy::too_many_arguments)]
pub fn save_run_history(
    cwd: &Path,
    run_id: &str,
    goal: &str,
    model: &str,
    status: &str,
    iterations: u32,
    max_iterations: u32,
    total_tokens: u64,
    estimated_cost_usd: f64,
    started_at: f64,
    reason: &str,
    files_changed: Vec<String>,
) -> Result<PathBuf> {
    let finished_at = now_ts();
    let record = RunRecord {
        run_id: run_id.to_string(),
        goal: goal.to_string(),
        model: model.to_string(),
        status: status.to_string(),
        iterations,
        max_iterations,
        total_tokens,
        estimated_cost_usd,
        started_at,
        finished_at,
        duration_seconds: ((finished_at - started_at) * 100.0).round() / 100.0,
        reason: reason.to_string(),
        cwd: cwd.display().to_string(),
        files_changed,
    };

    let history_dir = cwd.join(HISTORY_DIR);
    std::fs::create_dir_all(&history_dir)?;
    let out_path = history_dir.join(format!("{}.json", run_id));
    std::fs::write(&out_path, serde_json::to_string_pretty(&record)?)?;
    Ok(out_path)
}

/// Load recent run records, newest first.
pub fn load_run_history(cwd: &Path, limit: usize) -> Vec<RunRecord> {
    let history_dir = cwd.join(HISTORY_DIR);
    let Ok(rd) = std::fs::read_dir(&history_dir) else {
        return Vec::new();
    };

    let mut entries: Vec<(std::time::SystemTime, PathBuf)> = rd
        .flatten()
        .filter(|e| e.path().extension().map(|x| x == "json").unwrap_or(false))
        .filter_map(|e| {
            let mtime = e.metadata().ok()?.modified().ok()?;
            Some((mtime, e.path()))
        })
        .collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    entries
        .into_iter()
        .take(limit)
        .filter_map(|(_, path)| {
            let data = std::fs::read_to_string(path).ok()?;
            serde_json::from_str(&data).ok()
        })
        .collect()
}

/// Load a single run record by id.
pub fn get_run_record(cwd: &Path, run_id: &str) -> Option<RunRecord> {
    let path = cwd.join(HISTORY_DIR).join(format!("{}.json", run_id));
    let data = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn save(dir: &Path, run_id: &str, status: &str) {
        save_run_history(
            dir,
            run_id,
            "cargo-test",
            "test-model",
            status,
            5,
            20,
            1234,
            0.05,
            now_ts() - 2.0,
            "done",
            vec!["src/lib.rs".to_string()],
        )
        .unwrap();
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), "run-1", "achieved");

        let record = get_run_record(dir.path(), "run-1").unwrap();
        assert_eq!(record.status, "achieved");
        assert_eq!(record.iterations, 5);
        assert_eq!(record.total_tokens, 1234);
        assert!(record.duration_seconds >= 2.0);
        assert_eq!(record.files_changed, vec!["src/lib.rs"]);
    }

    #[test]
    fn history_is_append_only_per_run() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), "run-1", "failed");
        save(dir.path(), "run-2", "achieved");

        let records = load_run_history(dir.path(), 20);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn load_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            save(dir.path(), &format!("run-{}", i), "achieved");
        }
        assert_eq!(load_run_history(dir.path(), 2).len(), 2);
    }

    #[test]
    fn missing_history_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_run_history(dir.path(), 10).is_empty());
        assert!(get_run_record(dir.path(), "nope").is_none());
    }

    #[test]
    fn corrupt_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), "run-1", "achieved");
        let history = dir.path().join(HISTORY_DIR);
        std::fs::write(history.join("broken.json"), "{not json").unwrap();
        assert_eq!(load_run_history(dir.path(), 10).len(), 1);
    }
}
