//! File tools - read, list, write, patch, delete
//!
//! All paths are resolved against the project root; anything that would
//! escape it is rejected before touching the filesystem.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{Tool, ToolOutput};
use super::{in_skipped_dir, resolve_in_cwd};
use crate::error::Result;

fn required_str<'a>(args: &'a Value, key: &str) -> std::result::Result<&'a str, ToolOutput> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolOutput::err(format!("Missing '{}' parameter", key)))
}

/// Built-in tool: read a file
pub struct FileReadTool;

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to read (relative to project root)"
                }
            },
            "required": ["path"]
        })
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Value, cwd: &Path) -> Result<ToolOutput> {
        let path = match required_str(args, "path") {
            Ok(p) => p,
            Err(out) => return Ok(out),
        };
        let full = match resolve_in_cwd(cwd, path) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::err(e.to_string())),
        };
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(ToolOutput::ok(content)),
            Err(e) => Ok(ToolOutput::err(format!("Failed to read file: {}", e))),
        }
    }
}

/// Built-in tool: list a directory
pub struct FileListTool;

#[async_trait]
impl Tool for FileListTool {
    fn name(&self) -> &str {
        "file_list"
    }

    fn description(&self) -> &str {
        "List directory contents"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (default: project root)"
                }
            },
            "required": []
        })
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Value, cwd: &Path) -> Result<ToolOutput> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let full = match resolve_in_cwd(cwd, path) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::err(e.to_string())),
        };
        let mut rd = match tokio::fs::read_dir(&full).await {
            Ok(rd) => rd,
            Err(e) => return Ok(ToolOutput::err(format!("Failed to list directory: {}", e))),
        };
        let mut entries = Vec::new();
        while let Ok(Some(entry)) = rd.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(if is_dir { format!("{}/", name) } else { name });
        }
        entries.sort();
        Ok(ToolOutput::ok(entries.join("\n")))
    }
}

/// Built-in tool: write a file
pub struct FileWriteTool;

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to write (relative to project root)"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: &Value, cwd: &Path) -> Result<ToolOutput> {
        let path = match required_str(args, "path") {
            Ok(p) => p,
            Err(out) => return Ok(out),
        };
        let content = match required_str(args, "content") {
            Ok(c) => c,
            Err(out) => return Ok(out),
        };
        let full = match resolve_in_cwd(cwd, path) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::err(e.to_string())),
        };
        if let Some(parent) = full.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(ToolOutput::err(format!(
                    "Failed to create directories: {}",
                    e
                )));
            }
        }
        match tokio::fs::write(&full, content).await {
            Ok(()) => Ok(ToolOutput::ok(format!(
                "Written: {} ({} bytes)",
                path,
                content.len()
            ))),
            Err(e) => Ok(ToolOutput::err(format!("Failed to write file: {}", e))),
        }
    }
}

/// Built-in tool: surgical text replacement
///
/// Replaces an exact occurrence of `old` with `new`. The default
/// requires a unique match; `occurrence: N` targets the N-th match and
/// `occurrence: 0` replaces all.
pub struct FilePatchTool;

#[async_trait]
impl Tool for FilePatchTool {
    fn name(&self) -> &str {
        "file_patch"
    }

    fn description(&self) -> &str {
        "Surgically replace exact text in a file (preferred for targeted edits)"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File to patch"},
                "old": {"type": "string", "description": "Exact text to find"},
                "new": {"type": "string", "description": "Replacement text"},
                "occurrence": {
                    "type": "integer",
                    "description": "Which match to replace: 1 = unique match (default), N = N-th, 0 = all"
                }
            },
            "required": ["path", "old", "new"]
        })
    }

    async fn execute(&self, args: &Value, cwd: &Path) -> Result<ToolOutput> {
        let path = match required_str(args, "path") {
            Ok(p) => p,
            Err(out) => return Ok(out),
        };
        let old = match required_str(args, "old") {
            Ok(o) => o,
            Err(out) => return Ok(out),
        };
        let new = match required_str(args, "new") {
            Ok(n) => n,
            Err(out) => return Ok(out),
        };
        let occurrence = args
            .get("occurrence")
            .and_then(|v| v.as_u64())
            .unwrap_or(1) as usize;

        let full = match resolve_in_cwd(cwd, path) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::err(e.to_string())),
        };
        let content = match tokio::fs::read_to_string(&full).await {
            Ok(c) => c,
            Err(e) => return Ok(ToolOutput::err(format!("Failed to read file: {}", e))),
        };

        let count = content.matches(old).count();
        if count == 0 {
            return Ok(ToolOutput::err(format!(
                "Target text not found in {}. Searched for: {:?}",
                path,
                &old[..old.len().min(200)]
            )));
        }
        if occurrence == 1 && count > 1 {
            return Ok(ToolOutput::err(format!(
                "Target text found {} times in {} — must be unique. \
                 Use occurrence=N to target a specific match.",
                count, path
            )));
        }

        if occurrence == 0 {
            let patched = content.replace(old, new);
            if let Err(e) = tokio::fs::write(&full, patched).await {
                return Ok(ToolOutput::err(format!("Failed to write file: {}", e)));
            }
            return Ok(ToolOutput::ok(format!(
                "Patched all {} occurrences in {} ({} chars → {} chars each)",
                count,
                path,
                old.len(),
                new.len()
            )));
        }

        if occurrence > count {
            return Ok(ToolOutput::err(format!(
                "Requested occurrence {} but only {} match(es) found in {}",
                occurrence, count, path
            )));
        }

        let Some((offset, _)) = content.match_indices(old).nth(occurrence - 1) else {
            return Ok(ToolOutput::err(format!(
                "Requested occurrence {} but only {} match(es) found in {}",
                occurrence, count, path
            )));
        };
        let line_number = content[..offset].matches('\n').count() + 1;
        let patched = format!(
            "{}{}{}",
            &content[..offset],
            new,
            &content[offset + old.len()..]
        );
        if let Err(e) = tokio::fs::write(&full, patched).await {
            return Ok(ToolOutput::err(format!("Failed to write file: {}", e)));
        }
        Ok(ToolOutput::ok(format!(
            "Patched {} at line {} ({} chars → {} chars)",
            path,
            line_number,
            old.len(),
            new.len()
        )))
    }
}

/// Built-in tool: delete a file
pub struct FileDeleteTool;

#[async_trait]
impl Tool for FileDeleteTool {
    fn name(&self) -> &str {
        "file_delete"
    }

    fn description(&self) -> &str {
        "Delete a single file (directories are refused)"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File to delete"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: &Value, cwd: &Path) -> Result<ToolOutput> {
        let path = match required_str(args, "path") {
            Ok(p) => p,
            Err(out) => return Ok(out),
        };
        let full = match resolve_in_cwd(cwd, path) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::err(e.to_string())),
        };
        if in_skipped_dir(Path::new(path)) {
            return Ok(ToolOutput::err(format!(
                "Refusing to delete inside an ignored directory: {}",
                path
            )));
        }
        if full.is_dir() {
            return Ok(ToolOutput::err(format!("Path is a directory: {}", path)));
        }
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(ToolOutput::ok(format!("Deleted: {}", path))),
            Err(e) => Ok(ToolOutput::err(format!("Failed to delete file: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn read_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let write = FileWriteTool;
        let out = write
            .execute(
                &json!({"path": "notes/todo.md", "content": "- fix bug"}),
                dir.path(),
            )
            .await
            .unwrap();
        assert!(!out.error, "{}", out.content);

        let read = FileReadTool;
        let out = read
            .execute(&json!({"path": "notes/todo.md"}), dir.path())
            .await
            .unwrap();
        assert_eq!(out.content, "- fix bug");
    }

    #[tokio::test]
    async fn read_outside_root_is_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let read = FileReadTool;
        let out = read
            .execute(&json!({"path": "../../etc/passwd"}), dir.path())
            .await
            .unwrap();
        assert!(out.error);
        assert!(out.content.contains("Path traversal blocked"));
    }

    #[tokio::test]
    async fn list_marks_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("README.md"), "x").unwrap();

        let out = FileListTool
            .execute(&json!({}), dir.path())
            .await
            .unwrap();
        assert!(out.content.contains("src/"));
        assert!(out.content.contains("README.md"));
    }

    #[tokio::test]
    async fn patch_requires_unique_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "foo bar foo").unwrap();

        let patch = FilePatchTool;
        let out = patch
            .execute(
                &json!({"path": "a.txt", "old": "foo", "new": "baz"}),
                dir.path(),
            )
            .await
            .unwrap();
        assert!(out.error);
        assert!(out.content.contains("must be unique"));
    }

    #[tokio::test]
    async fn patch_nth_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "foo bar foo").unwrap();

        let out = FilePatchTool
            .execute(
                &json!({"path": "a.txt", "old": "foo", "new": "baz", "occurrence": 2}),
                dir.path(),
            )
            .await
            .unwrap();
        assert!(!out.error, "{}", out.content);
        let content = std::fs::read_to_string(dir.path().join("a.txt")).unwrap();
        assert_eq!(content, "foo bar baz");
    }

    #[tokio::test]
    async fn patch_all_occurrences() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x y x").unwrap();

        let out = FilePatchTool
            .execute(
                &json!({"path": "a.txt", "old": "x", "new": "z", "occurrence": 0}),
                dir.path(),
            )
            .await
            .unwrap();
        assert!(!out.error);
        let content = std::fs::read_to_string(dir.path().join("a.txt")).unwrap();
        assert_eq!(content, "z y z");
    }

    #[tokio::test]
    async fn patch_missing_text_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();

        let out = FilePatchTool
            .execute(
                &json!({"path": "a.txt", "old": "absent", "new": "x"}),
                dir.path(),
            )
            .await
            .unwrap();
        assert!(out.error);
        assert!(out.content.contains("not found"));
    }

    #[tokio::test]
    async fn delete_removes_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scratch.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();

        let del = FileDeleteTool;
        let out = del
            .execute(&json!({"path": "scratch.txt"}), dir.path())
            .await
            .unwrap();
        assert!(!out.error);
        assert!(!dir.path().join("scratch.txt").exists());

        let out = del.execute(&json!({"path": "src"}), dir.path()).await.unwrap();
        assert!(out.error);
        assert!(out.content.contains("directory"));
    }
}
