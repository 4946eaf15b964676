//! Project memory store - learnings persisted across runs.
//!
//! A small JSON file at `.retrai/memory.json`; entries are appended
//! after runs and rendered into the first-iteration system prompt.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;

const MEMORY_FILE: &str = ".retrai/memory.json";

/// One remembered learning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub text: String,
    pub run_id: Option<String>,
    pub created_at: String,
}

/// File-backed memory store for a project.
pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    pub fn new(cwd: &Path) -> Self {
        MemoryStore {
            path: cwd.join(MEMORY_FILE),
        }
    }

    fn load(&self) -> Vec<MemoryEntry> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok())
            .unwrap_or_default()
    }

    /// Append a learning.
    pub fn add(&self, text: impl Into<String>, run_id: Option<&str>) -> Result<()> {
        let mut entries = self.load();
        entries.push(MemoryEntry {
            text: text.into(),
            run_id: run_id.map(|s| s.to_string()),
            created_at: Utc::now().to_rfc3339(),
        });
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }

    /// Render the most recent learnings as a prompt section. Empty string
    /// when there is nothing to recall.
    pub fn format_for_prompt(&self, limit: usize) -> String {
        let entries = self.load();
        if entries.is_empty() {
            return String::new();
        }
        let recent: Vec<String> = entries
            .iter()
            .rev()
            .take(limit)
            .rev()
            .map(|e| format!("- {}", e.text))
            .collect();
        format!("## Past Learnings\n{}", recent.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_renders_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        assert_eq!(store.format_for_prompt(10), "");
    }

    #[test]
    fn add_then_render() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store.add("tests live under tests/unit", Some("run-1")).unwrap();
        store.add("use make check, not make test", None).unwrap();

        let section = store.format_for_prompt(10);
        assert!(section.starts_with("## Past Learnings"));
        assert!(section.contains("- tests live under tests/unit"));
        assert!(section.contains("- use make check, not make test"));
    }

    #[test]
    fn limit_keeps_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        for i in 0..5 {
            store.add(format!("note {}", i), None).unwrap();
        }
        let section = store.format_for_prompt(2);
        assert!(!section.contains("note 0"));
        assert!(section.contains("note 3"));
        assert!(section.contains("note 4"));
    }
}
