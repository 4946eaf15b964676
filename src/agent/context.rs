//! Project auto-context - first-iteration overview of the working tree.
//!
//! Injected into the system prompt so the agent doesn't burn iterations
//! exploring: a depth-2 directory tree plus the head of recognized
//! manifest files.

use std::path::Path;

/// Directories excluded from the tree listing.
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

/// Manifest files worth quoting at the top of a run.
const MANIFEST_FILES: &[&str] = &[
    "Cargo.toml",
    "pyproject.toml",
    "package.json",
    "go.mod",
    ".retrai.yml",
    "Makefile",
];

/// How many manifest lines to include before truncating.
const MANIFEST_HEAD_LINES: usize = 150;

fn visible(name: &str) -> bool {
    (!name.starts_with('.') || name == ".retrai.yml") && !SKIP_DIRS.contains(&name)
}

fn sorted_entries(dir: &Path) -> Vec<std::fs::DirEntry> {
    let mut entries: Vec<_> = match std::fs::read_dir(dir) {
        Ok(rd) => rd.flatten().collect(),
        Err(_) => return Vec::new(),
    };
    entries.sort_by_key(|e| e.file_name());
    entries
}

/// Build the project overview for `cwd`. Empty string when there is
/// nothing worth showing.
pub fn build_auto_context(cwd: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();

    let mut tree_lines: Vec<String> = Vec::new();
    for entry in sorted_entries(cwd) {
        let name = entry.file_name().to_string_lossy().to_string();
        if !visible(&name) {
            continue;
        }
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            tree_lines.push(format!("  {}/", name));
            for sub in sorted_entries(&entry.path()) {
                let sub_name = sub.file_name().to_string_lossy().to_string();
                if !visible(&sub_name) {
                    continue;
                }
                let suffix = if sub.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    "/"
                } else {
                    ""
                };
                tree_lines.push(format!("    {}{}", sub_name, suffix));
            }
        } else {
            tree_lines.push(format!("  {}", name));
        }
    }
    if !tree_lines.is_empty() {
        parts.push(format!(
            "### Directory Structure\n```\n{}\n```",
            tree_lines.join("\n")
        ));
    }

    for fname in MANIFEST_FILES {
        let path = cwd.join(fname);
        if !path.is_file() {
            continue;
        }
        if let Ok(content) = std::fs::read_to_string(&path) {
            let total = content.lines().count();
            let mut snippet: String = content
                .lines()
                .take(MANIFEST_HEAD_LINES)
                .collect::<Vec<_>>()
                .join("\n");
            if total > MANIFEST_HEAD_LINES {
                snippet.push_str("\n... (truncated)");
            }
            parts.push(format!("### {}\n```\n{}\n```", fname, snippet));
        }
    }

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_tree_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();

        let context = build_auto_context(dir.path());
        assert!(context.contains("Directory Structure"));
        assert!(context.contains("  src/"));
        assert!(context.contains("    main.rs"));
        assert!(context.contains("### Cargo.toml"));
        assert!(context.contains("name = \"x\""));
    }

    #[test]
    fn skips_ignored_and_hidden_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("target")).unwrap();
        std::fs::create_dir(dir.path().join(".hidden")).unwrap();
        std::fs::write(dir.path().join(".retrai.yml"), "goal: cargo-test\n").unwrap();

        let context = build_auto_context(dir.path());
        assert!(!context.contains("target/"));
        assert!(!context.contains(".hidden"));
        assert!(context.contains(".retrai.yml"));
    }

    #[test]
    fn truncates_long_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let long = (0..300).map(|i| format!("# line {}", i)).collect::<Vec<_>>().join("\n");
        std::fs::write(dir.path().join("Makefile"), long).unwrap();

        let context = build_auto_context(dir.path());
        assert!(context.contains("... (truncated)"));
        assert!(!context.contains("# line 200"));
    }

    #[test]
    fn empty_dir_yields_empty_context() {
        let dir = tempfile::tempdir().unwrap();
        assert!(build_auto_context(dir.path()).is_empty());
    }
}
