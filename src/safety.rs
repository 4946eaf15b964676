//! Safety guardrails - pre-dispatch checks on tool arguments.
//!
//! Every tool call passes through a [`SafetyGuard`] before execution.
//! The guard matches shell commands against a blocked-command list and a
//! dangerous-pattern regex set, screens sandbox code, URLs, file sizes,
//! and delete targets, and decides whether the call must be blocked.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::load_project_config;

/// Risk classification, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// Tunable safety settings, read from the `safety` section of `.retrai.yml`.
///
/// `blocked_commands` and `allowed_domains` EXTEND the built-in lists;
/// configuration can never reduce them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetySettings {
    pub max_file_size_mb: f64,
    pub max_download_size_mb: f64,
    pub max_execution_time_seconds: u64,
    pub allow_network_access: bool,
    pub require_approval_above: RiskLevel,
    pub blocked_commands: Vec<String>,
    pub allowed_domains: Vec<String>,
}

impl Default for SafetySettings {
    fn default() -> Self {
        SafetySettings {
            max_file_size_mb: 10.0,
            max_download_size_mb: 50.0,
            max_execution_time_seconds: 300,
            allow_network_access: true,
            require_approval_above: RiskLevel::High,
            blocked_commands: Vec::new(),
            allowed_domains: Vec::new(),
        }
    }
}

/// A detected safety violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub rule: String,
    pub description: String,
    pub risk_level: RiskLevel,
    pub blocked: bool,
}

impl Violation {
    fn new(rule: &str, description: impl Into<String>, risk_level: RiskLevel) -> Self {
        Violation {
            rule: rule.to_string(),
            description: description.into(),
            risk_level,
            blocked: true,
        }
    }
}

/// Built-in command substrings that are always blocked.
const DEFAULT_BLOCKED_COMMANDS: &[&str] = &[
    "rm -rf /",
    "rm -rf ~",
    "rm -rf /*",
    "mkfs",
    "dd if=",
    ":(){:|:&};:",
    "chmod -R 777 /",
    "curl | sh",
    "wget | sh",
    "curl | bash",
    "wget | bash",
];

/// Built-in trusted download domains.
const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    "arxiv.org",
    "export.arxiv.org",
    "huggingface.co",
    "raw.githubusercontent.com",
    "data.gov",
    "zenodo.org",
    "figshare.com",
    "kaggle.com",
    "crates.io",
    "static.crates.io",
    "pypi.org",
    "registry.npmjs.org",
];

/// Dangerous shell patterns: (regex, description, risk).
const SHELL_PATTERNS: &[(&str, &str, RiskLevel)] = &[
    (
        r"(?i)\brm\s+(-[rf]+\s+)*(/|~/|\$HOME)",
        "Recursive deletion of system/home directory",
        RiskLevel::Critical,
    ),
    (r"(?i)\bmkfs\b", "Filesystem format command", RiskLevel::Critical),
    (r"(?i)\bdd\s+if=", "Raw disk write", RiskLevel::Critical),
    (r"(?i):\(\)\{.*\}", "Fork bomb", RiskLevel::Critical),
    (
        r"(?i)\bchmod\s+-R\s+777\s+/",
        "Recursive permission change on root",
        RiskLevel::Critical,
    ),
    (
        r"(?i)\bcurl\b.*\|\s*(sh|bash)\b",
        "Remote code execution via curl",
        RiskLevel::High,
    ),
    (
        r"(?i)\bwget\b.*\|\s*(sh|bash)\b",
        "Remote code execution via wget",
        RiskLevel::High,
    ),
    (
        r"(?i)\bnc\s+-[le]",
        "Netcat listener (potential backdoor)",
        RiskLevel::High,
    ),
    (r"(?i)\bsudo\b", "Privileged command execution", RiskLevel::Medium),
    (
        r"(?i)\bsystemctl\s+(stop|disable|mask)",
        "Stopping system services",
        RiskLevel::Medium,
    ),
    (r"(?i)\bkill\s+-9", "Force kill process", RiskLevel::Low),
    (r"(?i)\brm\s+-rf\b", "Recursive force deletion", RiskLevel::Medium),
];

/// Dangerous patterns in sandboxed interpreter code.
const SANDBOX_PATTERNS: &[(&str, &str, RiskLevel)] = &[
    (
        r"(?i)\bos\.system\b",
        "OS command execution inside the sandbox",
        RiskLevel::Medium,
    ),
    (
        r"(?i)\bsubprocess\.\w+\b.*shell\s*=\s*True",
        "Shell subprocess inside the sandbox",
        RiskLevel::Medium,
    ),
    (
        r#"(?i)\bshutil\.rmtree\s*\(\s*['"]?/"#,
        "Deleting root directory tree",
        RiskLevel::Critical,
    ),
    (
        r#"(?i)\bopen\s*\(\s*['"]?/etc/"#,
        "Reading system configuration files",
        RiskLevel::Low,
    ),
    (
        r"(?i)\bsocket\.socket\b",
        "Raw socket creation",
        RiskLevel::Medium,
    ),
    (
        r#"(?i)__import__\s*\(\s*['"]?ctypes"#,
        "Loading native C library",
        RiskLevel::High,
    ),
];

/// Files whose deletion would break the project.
const CRITICAL_FILES: &[&str] = &[
    ".retrai.yml",
    ".git",
    ".gitignore",
    "Cargo.toml",
    "pyproject.toml",
    "package.json",
    "go.mod",
    "Makefile",
    "LICENSE",
];

/// Checks tool calls against safety rules before dispatch.
pub struct SafetyGuard {
    settings: SafetySettings,
    blocked_commands: Vec<String>,
    allowed_domains: Vec<String>,
    shell_patterns: Vec<(Regex, &'static str, RiskLevel)>,
    sandbox_patterns: Vec<(Regex, &'static str, RiskLevel)>,
}

impl Default for SafetyGuard {
    fn default() -> Self {
        Self::new(SafetySettings::default())
    }
}

impl SafetyGuard {
    /// Build a guard, merging configured list extensions into the defaults.
    pub fn new(settings: SafetySettings) -> Self {
        let mut blocked_commands: Vec<String> = DEFAULT_BLOCKED_COMMANDS
            .iter()
            .map(|s| s.to_string())
            .collect();
        blocked_commands.extend(settings.blocked_commands.iter().cloned());

        let mut allowed_domains: Vec<String> = DEFAULT_ALLOWED_DOMAINS
            .iter()
            .map(|s| s.to_string())
            .collect();
        allowed_domains.extend(settings.allowed_domains.iter().cloned());

        let compile = |set: &[(&'static str, &'static str, RiskLevel)]| {
            set.iter()
                .filter_map(|(pattern, desc, risk)| {
                    Regex::new(pattern).ok().map(|re| (re, *desc, *risk))
                })
                .collect()
        };

        SafetyGuard {
            blocked_commands,
            allowed_domains,
            shell_patterns: compile(SHELL_PATTERNS),
            sandbox_patterns: compile(SANDBOX_PATTERNS),
            settings,
        }
    }

    /// Load the guard from the project's `.retrai.yml`, falling back to
    /// defaults when the file or section is missing.
    pub fn from_project(cwd: &std::path::Path) -> Self {
        let settings = load_project_config(cwd)
            .ok()
            .flatten()
            .and_then(|cfg| cfg.safety)
            .unwrap_or_default();
        Self::new(settings)
    }

    pub fn settings(&self) -> &SafetySettings {
        &self.settings
    }

    /// Check a shell command for violations.
    pub fn check_shell(&self, command: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        let lowered = command.to_lowercase();

        for blocked in &self.blocked_commands {
            if lowered.contains(&blocked.to_lowercase()) {
                violations.push(Violation::new(
                    "blocked_command",
                    format!("Blocked command pattern detected: '{}'", blocked),
                    RiskLevel::Critical,
                ));
            }
        }

        for (re, desc, risk) in &self.shell_patterns {
            if re.is_match(command) {
                violations.push(Violation::new("dangerous_pattern", *desc, *risk));
            }
        }

        violations
    }

    /// Check code destined for a sandboxed interpreter.
    pub fn check_sandbox_code(&self, code: &str) -> Vec<Violation> {
        self.sandbox_patterns
            .iter()
            .filter(|(re, _, _)| re.is_match(code))
            .map(|(_, desc, risk)| Violation::new("dangerous_sandbox_code", *desc, *risk))
            .collect()
    }

    /// Check a URL against the allowed-domains list.
    ///
    /// A domain is allowed on exact hostname match or dotted-suffix match.
    pub fn check_url(&self, raw: &str) -> Vec<Violation> {
        let host = Url::parse(raw)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default();

        let allowed = self
            .allowed_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{}", d)));

        if allowed {
            Vec::new()
        } else {
            vec![Violation::new(
                "untrusted_domain",
                format!("Domain '{}' is not in the allowed domains list", host),
                RiskLevel::Medium,
            )]
        }
    }

    /// Check a prospective file write against the size limit.
    pub fn check_file_size(&self, size_bytes: u64) -> Vec<Violation> {
        let max_bytes = (self.settings.max_file_size_mb * 1024.0 * 1024.0) as u64;
        if size_bytes > max_bytes {
            vec![Violation::new(
                "file_too_large",
                format!(
                    "File size ({:.1} MB) exceeds limit ({} MB)",
                    size_bytes as f64 / 1024.0 / 1024.0,
                    self.settings.max_file_size_mb
                ),
                RiskLevel::Medium,
            )]
        } else {
            Vec::new()
        }
    }

    /// Check whether a deletion targets critical project files.
    pub fn check_file_delete(&self, path: &str) -> Vec<Violation> {
        let normalised = path.trim_start_matches("./").trim_end_matches('/');
        let basename = normalised.rsplit('/').next().unwrap_or(normalised);

        if normalised == ".git" || normalised.starts_with(".git/") {
            return vec![Violation::new(
                "vcs_delete",
                "Attempted to delete the VCS metadata directory or its contents",
                RiskLevel::Critical,
            )];
        }
        if CRITICAL_FILES.contains(&normalised) || CRITICAL_FILES.contains(&basename) {
            return vec![Violation::new(
                "critical_file_delete",
                format!("Attempted to delete critical project file: '{}'", path),
                RiskLevel::High,
            )];
        }
        Vec::new()
    }

    /// Main entry point - check any tool call before dispatch.
    pub fn check_tool_call(&self, tool_name: &str, args: &Value) -> Vec<Violation> {
        let str_arg = |key: &str| args.get(key).and_then(|v| v.as_str()).unwrap_or("");

        match tool_name {
            "bash_exec" => self.check_shell(str_arg("command")),
            "python_exec" => self.check_sandbox_code(str_arg("code")),
            "js_exec" => {
                let code = str_arg("code");
                if code.contains("child_process") || code.contains("execSync") {
                    vec![Violation::new(
                        "js_shell_exec",
                        "JavaScript code attempts to execute shell commands",
                        RiskLevel::Medium,
                    )]
                } else {
                    Vec::new()
                }
            }
            "dataset_fetch" if str_arg("source") == "url" => self.check_url(str_arg("query")),
            "file_write" => self.check_file_size(str_arg("content").len() as u64),
            "file_delete" => self.check_file_delete(str_arg("path")),
            _ => Vec::new(),
        }
    }

    /// True iff any violation is at or above the approval threshold.
    pub fn should_block(&self, violations: &[Violation]) -> bool {
        violations
            .iter()
            .any(|v| v.risk_level >= self.settings.require_approval_above)
    }

    /// Render violations into the text surfaced to the LLM.
    pub fn format_violations(&self, violations: &[Violation]) -> String {
        let mut lines = vec!["## Safety Check Results".to_string()];
        for v in violations {
            let status = if v.blocked { "BLOCKED" } else { "WARNING" };
            lines.push(format!(
                "- [{}] {} (risk: {})",
                status, v.description, v.risk_level
            ));
        }
        lines.join("\n")
    }
}
