//! Tools module - self-contained adapters the LLM can invoke
//!
//! Each tool is its own module implementing the `Tool` trait. Tools are
//! registered into a `ToolRegistry` and their JSON schemas are bound to
//! the LLM for function calling.
//!
//! ## Adding a New Tool
//!
//! 1. Create a new file in `src/tools/` (e.g., `my_tool.rs`)
//! 2. Implement the `Tool` trait (declare `parallel_safe` only for
//!    read-only, idempotent tools)
//! 3. Add `mod my_tool;` and `pub use` in this file
//! 4. Register it in [`create_default_registry`]

mod bash_exec;
mod experiment_tools;
mod file_ops;
mod find_files;
mod git;
mod grep_search;
mod python_exec;
mod registry;
mod traits;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};

// Core trait and types
pub use traits::{Tool, ToolOutput, ToolSchema};

// Registry
pub use registry::ToolRegistry;

// Built-in tools
pub use bash_exec::BashExecTool;
pub use experiment_tools::{ExperimentListTool, ExperimentLogTool};
pub use file_ops::{FileDeleteTool, FileListTool, FilePatchTool, FileReadTool, FileWriteTool};
pub use find_files::FindFilesTool;
pub use git::{GitDiffTool, GitLogTool, GitStatusTool};
pub(crate) use git::git_diff_text;
pub use grep_search::GrepSearchTool;
pub use python_exec::PythonExecTool;

/// Byte cap applied to raw tool output (stdout + stderr).
pub(crate) const OUTPUT_CAP: usize = 8000;
/// Shorter cap for status-like outputs (git status, log).
pub(crate) const STATUS_CAP: usize = 4000;

/// Directories excluded from search and listing tools.
pub(crate) const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".ruff_cache",
    ".pytest_cache",
    "dist",
    "build",
    ".eggs",
    "target",
    "vendor",
];

/// Build the default registry with every built-in tool.
pub fn create_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(BashExecTool::new()),
        Arc::new(FileReadTool),
        Arc::new(FileListTool),
        Arc::new(FileWriteTool),
        Arc::new(FilePatchTool),
        Arc::new(FileDeleteTool),
        Arc::new(GrepSearchTool),
        Arc::new(FindFilesTool),
        Arc::new(GitDiffTool),
        Arc::new(GitStatusTool),
        Arc::new(GitLogTool),
        Arc::new(PythonExecTool::new()),
        Arc::new(ExperimentLogTool),
        Arc::new(ExperimentListTool),
    ];
    for tool in tools {
        // Built-in names are never empty.
        let _ = registry.register(tool);
    }
    registry
}

/// Resolve `raw` against the project root, rejecting any path that would
/// escape it. Works for paths that do not exist yet (pure lexical
/// normalization, no filesystem access).
pub(crate) fn resolve_in_cwd(cwd: &Path, raw: &str) -> Result<PathBuf> {
    let traversal = || {
        Error::InvalidInput(format!(
            "Path traversal blocked: '{}' resolves outside project root",
            raw
        ))
    };

    let requested = Path::new(raw);
    let relative = if requested.is_absolute() {
        requested
            .strip_prefix(cwd)
            .map_err(|_| traversal())?
            .to_path_buf()
    } else {
        requested.to_path_buf()
    };

    let mut resolved = cwd.to_path_buf();
    let mut depth: usize = 0;
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(traversal());
                }
                resolved.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            _ => return Err(traversal()),
        }
    }
    Ok(resolved)
}

/// Truncate output to `cap` bytes on a char boundary.
pub(crate) fn truncate_output(s: &str, cap: usize) -> String {
    if s.len() <= cap {
        return s.to_string();
    }
    let mut end = cap;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n[... output truncated ...]", &s[..end])
}

/// True when any path component is in the ignore set.
pub(crate) fn in_skipped_dir(rel: &Path) -> bool {
    rel.components().any(|c| match c {
        Component::Normal(part) => part
            .to_str()
            .map(|s| SKIP_DIRS.contains(&s))
            .unwrap_or(false),
        _ => false,
    })
}

/// Convert a glob pattern (`*`, `?`, `**`) into an anchored regex.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<regex::Regex> {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // `**/` matches zero or more directories
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        out.push_str("(?:[^/]+/)*");
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '.' | '+' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push('$');
    regex::Regex::new(&out)
        .map_err(|e| Error::InvalidInput(format!("Invalid glob pattern '{}': {}", pattern, e)))
}
