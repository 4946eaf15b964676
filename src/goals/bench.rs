//! Benchmark threshold goal - drive a benchmark under a target ns/iter.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tokio::process::Command;

use crate::agent::AgentState;
use crate::config::load_project_config;
use crate::goals::{Goal, GoalResult};

const BENCH_TIMEOUT: Duration = Duration::from_secs(600);

/// Goal: a named benchmark must run at or below `target_ns` ns/iter.
///
/// `.retrai.yml`:
///
/// ```yaml
/// goal: bench
/// bench_name: parse_large
/// target_ns: 120000
/// ```
pub struct BenchThresholdGoal;

struct BenchConfig {
    bench_name: String,
    target_ns: f64,
}

impl BenchThresholdGoal {
    fn config(cwd: &Path) -> Option<BenchConfig> {
        let cfg = load_project_config(cwd).ok().flatten()?;
        Some(BenchConfig {
            bench_name: cfg.extra_str("bench_name")?.to_string(),
            target_ns: cfg.extra_f64("target_ns")?,
        })
    }

    /// Pull the best `N ns/iter` figure for the benchmark out of cargo
    /// bench output.
    fn parse_ns_per_iter(output: &str, bench_name: &str) -> Option<f64> {
        let re = Regex::new(r"([\d,]+(?:\.\d+)?)\s*ns/iter").ok()?;
        output
            .lines()
            .filter(|line| line.contains(bench_name))
            .filter_map(|line| {
                let captures = re.captures(line)?;
                captures[1].replace(',', "").parse::<f64>().ok()
            })
            .fold(None, |best: Option<f64>, ns| {
                Some(best.map_or(ns, |b| b.min(ns)))
            })
    }
}

#[async_trait]
impl Goal for BenchThresholdGoal {
    fn name(&self) -> &str {
        "bench"
    }

    async fn check(&self, _state: &AgentState, cwd: &Path) -> GoalResult {
        let Some(config) = Self::config(cwd) else {
            return GoalResult::not_achieved(
                "Missing 'bench_name'/'target_ns' in .retrai.yml — configure the bench goal first.",
            );
        };

        let command = format!("cargo bench --bench {} 2>&1", config.bench_name);
        let child = Command::new("bash")
            .arg("-c")
            .arg(&command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let output = match child {
            Ok(c) => match tokio::time::timeout(BENCH_TIMEOUT, c.wait_with_output()).await {
                Ok(Ok(o)) => String::from_utf8_lossy(&o.stdout).to_string(),
                Ok(Err(e)) => return GoalResult::not_achieved(format!("Benchmark failed: {}", e)),
                Err(_) => return GoalResult::not_achieved("Benchmark run timed out"),
            },
            Err(e) => return GoalResult::not_achieved(format!("Failed to spawn benchmark: {}", e)),
        };

        let Some(measured) = Self::parse_ns_per_iter(&output, &config.bench_name) else {
            return GoalResult::not_achieved(format!(
                "Could not find an 'ns/iter' figure for benchmark '{}' in the output.",
                config.bench_name
            ));
        };

        let details = json!({
            "bench_name": config.bench_name,
            "measured_ns": measured,
            "target_ns": config.target_ns,
        });
        if measured <= config.target_ns {
            GoalResult::achieved(format!(
                "Benchmark '{}' at {:.0} ns/iter (target {:.0})",
                config.bench_name, measured, config.target_ns
            ))
            .with_details(details)
        } else {
            GoalResult::not_achieved(format!(
                "Benchmark '{}' at {:.0} ns/iter — target is {:.0} ns/iter ({:.1}% over)",
                config.bench_name,
                measured,
                config.target_ns,
                (measured / config.target_ns - 1.0) * 100.0
            ))
            .with_details(details)
        }
    }

    fn system_prompt(&self, cwd: &Path) -> String {
        let (bench_name, target) = Self::config(cwd)
            .map(|c| (c.bench_name, format!("{:.0}", c.target_ns)))
            .unwrap_or_else(|| ("<bench_name>".to_string(), "<target_ns>".to_string()));
        format!(
            "## Goal: Optimize a benchmark\n\n\
             Bring the `{}` benchmark down to {} ns/iter or better.\n\n\
             **Strategy**:\n\
             1. Run the benchmark to get a baseline\n\
             2. Profile or read the hot path to find the bottleneck\n\
             3. Apply one optimization at a time and re-measure\n\
             4. Never sacrifice correctness — keep the test suite green",
            bench_name, target
        )
    }
}
