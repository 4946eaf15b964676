//! Recursive code search - find patterns across project files

use std::path::Path;

use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::Value;
use walkdir::WalkDir;

use super::traits::{Tool, ToolOutput};
use super::{glob_to_regex, in_skipped_dir, SKIP_DIRS};
use crate::error::Result;

const MAX_RESULTS: usize = 50;
const MAX_FILE_BYTES: u64 = 1_000_000;

/// Extensions never worth grepping.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "svg", "woff", "woff2", "ttf", "eot",
    "otf", "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "pdf", "doc", "docx", "xls", "xlsx",
    "exe", "dll", "so", "dylib", "o", "a", "pyc", "pyo", "class", "jar", "war", "mp3", "mp4",
    "avi", "mov", "wmv", "flv", "db", "sqlite", "sqlite3", "wasm", "lock",
];

fn is_binary(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| BINARY_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Built-in tool: search file contents across the project tree
pub struct GrepSearchTool;

#[async_trait]
impl Tool for GrepSearchTool {
    fn name(&self) -> &str {
        "grep_search"
    }

    fn description(&self) -> &str {
        "Search for text/regex patterns across all project files (like ripgrep)"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "The search term (literal or regex)"},
                "is_regex": {"type": "boolean", "description": "Treat pattern as a regex (default false)"},
                "case_insensitive": {"type": "boolean", "description": "Case-insensitive matching (default true)"},
                "include_glob": {"type": "string", "description": "Optional glob to filter files (e.g. '*.rs')"}
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
        let is_regex = args
            .get("is_regex")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let case_insensitive = args
            .get("case_insensitive")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let include_glob = args
            .get("include_glob")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let cwd = cwd.to_path_buf();
        // Tree walk is blocking work; keep it off the async executor.
        let result = tokio::task::spawn_blocking(move || {
            search_sync(&pattern, &cwd, is_regex, case_insensitive, include_glob)
        })
        .await
        .map_err(|e| crate::Error::Internal(format!("search task panicked: {}", e)))?;

        Ok(result)
    }
}

fn search_sync(
    pattern: &str,
    cwd: &Path,
    is_regex: bool,
    case_insensitive: bool,
    include_glob: Option<String>,
) -> ToolOutput {
    let source = if is_regex {
        pattern.to_string()
    } else {
        regex::escape(pattern)
    };
    let compiled = match RegexBuilder::new(&source)
        .case_insensitive(case_insensitive)
        .build()
    {
        Ok(re) => re,
        Err(e) => return ToolOutput::err(format!("Invalid regex: {}", e)),
    };

    // Patterns with a separator match the relative path; bare patterns
    // match the file name at any depth.
    let glob_matches_path = include_glob
        .as_deref()
        .map(|g| g.contains('/'))
        .unwrap_or(false);
    let glob_re = match include_glob.as_deref() {
        Some(g) => match glob_to_regex(g) {
            Ok(re) => Some(re),
            Err(e) => return ToolOutput::err(e.to_string()),
        },
        None => None,
    };

    let mut matches: Vec<String> = Vec::new();

    let walker = WalkDir::new(cwd)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || e.file_name()
                    .to_str()
                    .map(|n| !SKIP_DIRS.contains(&n))
                    .unwrap_or(true)
        });

    'outer: for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel = match path.strip_prefix(cwd) {
            Ok(r) => r,
            Err(_) => continue,
        };
        if in_skipped_dir(rel) || is_binary(path) {
            continue;
        }
        if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
            continue;
        }
        if let Some(ref glob_re) = glob_re {
            let candidate = if glob_matches_path {
                rel.to_string_lossy().to_string()
            } else {
                entry.file_name().to_string_lossy().to_string()
            };
            if !glob_re.is_match(&candidate) {
                continue;
            }
        }

        let Ok(text) = std::fs::read_to_string(path) else {
            continue;
        };
        for (i, line) in text.lines().enumerate() {
            if compiled.is_match(line) {
                let trimmed = line.trim();
                let snippet: String = trimmed.chars().take(200).collect();
                matches.push(format!("{}:{}: {}", rel.display(), i + 1, snippet));
                if matches.len() >= MAX_RESULTS {
                    break 'outer;
                }
            }
        }
    }

    if matches.is_empty() {
        return ToolOutput::ok(format!("No matches found for: {}", pattern));
    }
    let mut result = matches.join("\n");
    if matches.len() >= MAX_RESULTS {
        result.push_str(&format!("\n\n[... capped at {} results ...]", MAX_RESULTS));
    }
    ToolOutput::ok(result)
}
