//! Find files by glob pattern in the project tree

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use walkdir::WalkDir;

use super::traits::{Tool, ToolOutput};
use super::{glob_to_regex, SKIP_DIRS};
use crate::error::Result;

const MAX_RESULTS: usize = 100;

fn human_size(size: u64) -> String {
    let mut size = size as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return if unit == "B" {
                format!("{:.0} {}", size, unit)
            } else {
                format!("{:.1} {}", size, unit)
            };
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}

/// Built-in tool: find files by glob pattern
pub struct FindFilesTool;

#[async_trait]
impl Tool for FindFilesTool {
    fn name(&self) -> &str {
        "find_files"
    }

    fn description(&self) -> &str {
        "Find files by glob pattern in the project tree (e.g. '**/*.rs')"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern (e.g. '*.rs', '**/test_*.py')"
                }
            },
            "required": ["pattern"]
        })
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Value, cwd: &Path) -> Result<ToolOutput> {
        let pattern = match args.get("pattern").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return Ok(ToolOutput::err("Missing 'pattern' parameter")),
        };
        // Patterns without a separator match the file name at any depth.
        let match_full_path = pattern.contains('/');
        let re = match glob_to_regex(&pattern) {
            Ok(re) => re,
            Err(e) => return Ok(ToolOutput::err(e.to_string())),
        };

        let cwd = cwd.to_path_buf();
        let output = tokio::task::spawn_blocking(move || {
            let mut lines: Vec<String> = Vec::new();
            let walker = WalkDir::new(&cwd)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| {
                    e.depth() == 0
                        || e.file_name()
                            .to_str()
                            .map(|n| !SKIP_DIRS.contains(&n))
                            .unwrap_or(true)
                });

            for entry in walker.flatten() {
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = match entry.path().strip_prefix(&cwd) {
                    Ok(r) => r.to_string_lossy().to_string(),
                    Err(_) => continue,
                };
                let candidate = if match_full_path {
                    rel.clone()
                } else {
                    entry.file_name().to_string_lossy().to_string()
                };
                if !re.is_match(&candidate) {
                    continue;
                }
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                lines.push(format!("  {}  ({})", rel, human_size(size)));
                if lines.len() >= MAX_RESULTS {
                    break;
                }
            }

            if lines.is_empty() {
                return ToolOutput::ok(format!("No files found matching: {}", pattern));
            }
            let capped = lines.len() >= MAX_RESULTS;
            let mut result = lines.join("\n");
            if capped {
                result.push_str(&format!("\n\n[... capped at {} results ...]", MAX_RESULTS));
            }
            ToolOutput::ok(result)
        })
        .await
        .map_err(|e| crate::Error::Internal(format!("find task panicked: {}", e)))?;

        Ok(output)
    }
}
