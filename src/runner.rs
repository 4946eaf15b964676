//! Async runner functions for CLI commands - stream events to the
//! terminal, persist history, and map outcomes to exit codes.

use std::path::Path;
use std::sync::Arc;

use console::style;
use serde_json::Value;

use crate::agent::{AgentState, GraphRunner, NodeContext, RunOutcome};
use crate::benchmark::{format_benchmark_table, BenchmarkRunner};
use crate::config::{AgentPattern, RunConfig};
use crate::events::{AgentEvent, EventBus, EventKind, Subscription};
use crate::goals::{get_goal, get_solver_goal, Goal};
use crate::history::{load_run_history, now_ts, save_run_history};
use crate::llm::LlmFactory;
use crate::pipeline::PipelineRunner;
use crate::review::{format_review_markdown, run_review};
use crate::swarm::SwarmOrchestrator;
use crate::tools::create_default_registry;
use crate::watcher::FileWatcher;

fn fmt_args(args: &Value) -> String {
    match args.as_object() {
        Some(map) => map
            .iter()
            .map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => format!("{:?}", s.chars().take(80).collect::<String>()),
                    other => other.to_string(),
                };
                format!("{}={}", k, rendered)
            })
            .collect::<Vec<_>>()
            .join(", "),
        None => args.to_string(),
    }
}

/// Render one AgentEvent to the terminal.
fn render_event(event: &AgentEvent) {
    let payload = &event.payload;
    match event.kind {
        EventKind::StepStart => {
            let node = payload["node"].as_str().unwrap_or("?");
            println!(
                "\n{}",
                style(format!("[{}] {}", event.iteration, node.to_uppercase()))
                    .blue()
                    .bold()
            );
        }
        EventKind::ToolCall => {
            let tool = payload["tool"].as_str().unwrap_or("?");
            println!(
                "  {}({})",
                style(format!("-> {}", tool)).cyan(),
                fmt_args(&payload["args"])
            );
        }
        EventKind::ToolResult => {
            let tool = payload["tool"].as_str().unwrap_or("?");
            let err = payload["error"].as_bool().unwrap_or(false);
            let content: String = payload["content"]
                .as_str()
                .unwrap_or("")
                .chars()
                .take(200)
                .collect();
            let line = format!("{} {}: {:?}", if err { "x" } else { "ok" }, tool, content);
            if err {
                println!("  {}", style(line).red());
            } else {
                println!("  {}", style(line).green());
            }
        }
        EventKind::Reasoning => {
            let text: String = payload["text"]
                .as_str()
                .unwrap_or("")
                .chars()
                .take(300)
                .collect();
            println!("  {}", style(text).dim());
        }
        EventKind::GoalCheck => {
            let achieved = payload["achieved"].as_bool().unwrap_or(false);
            let reason = payload["reason"].as_str().unwrap_or("");
            let line = format!("Goal: {}", reason);
            if achieved {
                println!("  {}", style(line).green());
            } else {
                println!("  {}", style(line).yellow());
            }
        }
        EventKind::IterationComplete => {
            let iteration = payload["iteration"].as_u64().unwrap_or(0);
            println!(
                "  {}",
                style(format!("--- iteration {} complete ---", iteration)).dim()
            );
        }
        EventKind::HumanCheckRequired => {
            println!("\n{}", style("Human check required").yellow().bold());
            println!(
                "  {}",
                style("Resume this run with `retrai resume <run-id>` once approved.").dim()
            );
        }
        EventKind::Log => {
            let message = payload["message"].as_str().unwrap_or("");
            println!("  {}", style(message).dim());
        }
        EventKind::LlmUsage => {}
        EventKind::RunEnd => {
            let status = payload["status"].as_str().unwrap_or("?");
            println!("\n{}", style(format!("Run ended: {}", status)).bold());
        }
        EventKind::Error => {
            let err = payload["error"].as_str().unwrap_or("unknown error");
            println!("\n{}", style(format!("ERROR: {}", err)).red().bold());
        }
    }
}

fn spawn_renderer(mut sub: Subscription) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = sub.next().await {
            render_event(&event);
        }
    })
}

fn print_summary(state: &AgentState, elapsed: f64) {
    let mut info = vec![format!("Iterations: {}", state.iteration)];
    if state.total_tokens > 0 {
        info.push(format!("Tokens: {}", state.total_tokens));
    }
    if state.estimated_cost_usd > 0.0 {
        info.push(format!("Cost: ${:.4}", state.estimated_cost_usd));
    }
    info.push(format!("Time: {:.1}s", elapsed));
    let info_line = info.join("  ·  ");

    if state.goal_achieved {
        println!(
            "\n{}\n{}\n{}",
            style("GOAL ACHIEVED").green().bold(),
            state.goal_reason,
            style(info_line).dim()
        );
    } else {
        println!(
            "\n{}\n{}\n{}",
            style("GOAL NOT ACHIEVED").red().bold(),
            state.goal_reason,
            style(info_line).dim()
        );
    }
}

fn persist_history(cfg: &RunConfig, state: &AgentState, status: &str, started_at: f64) {
    // History is best effort; IO problems never fail the run itself.
    let _ = save_run_history(
        &cfg.cwd,
        &cfg.run_id,
        &cfg.goal,
        &cfg.model_name,
        status,
        state.iteration,
        cfg.max_iterations,
        state.total_tokens,
        state.estimated_cost_usd,
        started_at,
        &state.goal_reason,
        Vec::new(),
    );
}

async fn run_with_goal(
    cfg: RunConfig,
    goal: Arc<dyn Goal>,
    factory: Arc<dyn LlmFactory>,
) -> i32 {
    let bus = Arc::new(EventBus::new());
    let renderer = spawn_renderer(bus.subscribe());

    let mut ctx = NodeContext::new(
        bus.clone(),
        Some(goal),
        Arc::new(create_default_registry()),
        factory,
    );
    if cfg.agent_pattern == AgentPattern::Mop {
        ctx.mop_k = cfg.mop_k;
    }

    let runner = GraphRunner::new(ctx);
    let state = AgentState::from_config(&cfg);
    let started_at = now_ts();

    let outcome = runner.run(state).await;
    bus.close();
    let _ = renderer.await;
    let elapsed = now_ts() - started_at;

    match outcome {
        Ok(RunOutcome::Completed(state)) => {
            print_summary(&state, elapsed);
            let status = if state.goal_achieved { "achieved" } else { "failed" };
            persist_history(&cfg, &state, status, started_at);
            if state.goal_achieved {
                0
            } else {
                1
            }
        }
        Ok(RunOutcome::Suspended { run_id }) => {
            println!(
                "{}",
                style(format!(
                    "Run {} suspended awaiting human approval.",
                    run_id
                ))
                .yellow()
            );
            1
        }
        Err(e) => {
            eprintln!("{}", style(format!("Run failed: {}", e)).red());
            let state = AgentState::from_config(&cfg);
            persist_history(&cfg, &state, "failed", started_at);
            1
        }
    }
}

/// `retrai run <goal>` - run a named goal from the registry.
pub async fn run_cli(cfg: RunConfig, factory: Arc<dyn LlmFactory>) -> i32 {
    let goal = match get_goal(&cfg.goal, factory.clone()) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("{}", style(e.to_string()).red());
            return 1;
        }
    };
    run_with_goal(cfg, goal, factory).await
}

/// `retrai solve <description>` - run with an LLM-judged solver goal.
pub async fn run_solve(
    mut cfg: RunConfig,
    description: String,
    factory: Arc<dyn LlmFactory>,
) -> i32 {
    cfg.goal = description.clone();
    let goal = get_solver_goal(description, factory.clone());
    run_with_goal(cfg, goal, factory).await
}

/// `retrai resume <run-id>` - continue a suspended HITL run.
pub async fn run_resume(
    cwd: &Path,
    run_id: &str,
    goal_name: &str,
    factory: Arc<dyn LlmFactory>,
) -> i32 {
    let goal = match get_goal(goal_name, factory.clone()) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("{}", style(e.to_string()).red());
            return 1;
        }
    };

    let bus = Arc::new(EventBus::new());
    let renderer = spawn_renderer(bus.subscribe());
    let ctx = NodeContext::new(
        bus.clone(),
        Some(goal),
        Arc::new(create_default_registry()),
        factory,
    );
    let runner = GraphRunner::new(ctx);
    let started_at = now_ts();
    let outcome = runner.resume(cwd, run_id).await;
    bus.close();
    let _ = renderer.await;

    match outcome {
        Ok(RunOutcome::Completed(state)) => {
            print_summary(&state, now_ts() - started_at);
            if state.goal_achieved {
                0
            } else {
                1
            }
        }
        Ok(RunOutcome::Suspended { run_id }) => {
            println!(
                "{}",
                style(format!("Run {} suspended again.", run_id)).yellow()
            );
            1
        }
        Err(e) => {
            eprintln!("{}", style(format!("Resume failed: {}", e)).red());
            1
        }
    }
}

/// `retrai swarm <description>` - decompose and run parallel workers.
pub async fn run_swarm(
    description: String,
    cwd: &Path,
    factory: Arc<dyn LlmFactory>,
    model_name: &str,
    max_workers: usize,
    max_iterations: u32,
) -> i32 {
    println!("{}", style("Phase 1: Decomposing goal…").blue().bold());
    let orchestrator = SwarmOrchestrator::new(
        description,
        cwd,
        factory,
        model_name,
        max_workers,
        max_iterations,
    );

    let result = match orchestrator.run().await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}", style(format!("Swarm failed: {}", e)).red());
            return 1;
        }
    };

    println!("\n{}", style("Worker Results:").blue().bold());
    for wr in &result.worker_results {
        let icon = if wr.status == "achieved" { "ok" } else { "x" };
        println!(
            "  {} {}: {}",
            icon,
            style(&wr.task_id).bold(),
            wr.description.chars().take(60).collect::<String>()
        );
        if !wr.findings.is_empty() {
            println!(
                "     {}",
                style(wr.findings.chars().take(120).collect::<String>()).dim()
            );
        }
        println!(
            "     {}",
            style(format!(
                "iters={}  tokens={}  cost=${:.4}",
                wr.iterations_used, wr.tokens_used, wr.cost_usd
            ))
            .dim()
        );
    }

    println!(
        "\n{}\n{}",
        style(result.status.to_uppercase()).bold(),
        result.synthesis
    );
    println!(
        "{}",
        style(format!(
            "Workers: {}  ·  Total iterations: {}  ·  Total tokens: {}  ·  Total cost: ${:.4}",
            result.worker_results.len(),
            result.total_iterations,
            result.total_tokens,
            result.total_cost
        ))
        .dim()
    );

    if result.status == "achieved" {
        0
    } else {
        1
    }
}

/// `retrai pipeline <goals…>` - run goals sequentially.
pub async fn run_pipeline(
    steps: Vec<String>,
    cwd: &Path,
    factory: Arc<dyn LlmFactory>,
    model_name: &str,
    max_iterations: u32,
    continue_on_error: bool,
) -> i32 {
    let runner = match PipelineRunner::new(
        steps,
        cwd,
        factory,
        model_name,
        max_iterations,
        continue_on_error,
    ) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}", style(e.to_string()).red());
            return 1;
        }
    };

    let result = runner.run().await;
    for step in &result.steps {
        let icon = if step.achieved { "ok" } else { "x" };
        println!(
            "  {} {}: {}",
            icon,
            style(&step.goal_name).bold(),
            step.reason.chars().take(100).collect::<String>()
        );
    }
    println!(
        "\n{} ({} passed, {} failed, {:.1}s)",
        style(result.status.to_uppercase()).bold(),
        result.passed(),
        result.failed(),
        result.total_duration
    );

    if result.status == "achieved" {
        0
    } else {
        1
    }
}

/// `retrai bench` - compare models on a goal.
pub async fn run_bench(
    models: Vec<String>,
    goal_name: String,
    cwd: &Path,
    factory: Arc<dyn LlmFactory>,
    max_iterations: u32,
    rounds: u32,
) -> i32 {
    let runner = BenchmarkRunner::new(models, goal_name, cwd, factory, max_iterations, rounds);
    let result = runner.run().await;
    println!("{}", format_benchmark_table(&result));
    let all_achieved = result
        .models
        .iter()
        .all(|m| m.runs.iter().all(|r| r.achieved));
    if all_achieved {
        0
    } else {
        1
    }
}

/// `retrai review` - AI code review of the current diff.
pub async fn run_review_cmd(
    cwd: &Path,
    factory: Arc<dyn LlmFactory>,
    model_name: &str,
    staged: bool,
) -> i32 {
    let result = run_review(cwd, factory, model_name, staged).await;
    println!("{}", format_review_markdown(&result));
    if result.score >= 70 {
        0
    } else {
        1
    }
}

/// `retrai watch` - rerun the goal whenever project files change.
pub async fn run_watch(
    cwd: &Path,
    goal_name: Option<String>,
    factory: Arc<dyn LlmFactory>,
    model_name: &str,
    max_iterations: u32,
    debounce_ms: u64,
) -> i32 {
    let watcher = FileWatcher::new(
        cwd,
        goal_name,
        factory,
        model_name,
        max_iterations,
        debounce_ms,
        500,
    );
    match watcher.run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{}", style(format!("Watcher failed: {}", e)).red());
            1
        }
    }
}

/// `retrai history` - list recent runs.
pub fn show_history(cwd: &Path, limit: usize) -> i32 {
    let records = load_run_history(cwd, limit);
    if records.is_empty() {
        println!("No run history found.");
        return 0;
    }
    for record in records {
        let status = match record.status.as_str() {
            "achieved" => style(record.status.clone()).green(),
            "aborted" => style(record.status.clone()).yellow(),
            _ => style(record.status.clone()).red(),
        };
        println!(
            "{}  {}  {}  iters={}/{}  tokens={}  ${:.4}  {:.1}s",
            style(&record.run_id[..record.run_id.len().min(8)]).bold(),
            status,
            record.goal,
            record.iterations,
            record.max_iterations,
            record.total_tokens,
            record.estimated_cost_usd,
            record.duration_seconds,
        );
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{ScriptedFactory, ScriptedLlm};
    use serde_json::json;

    #[test]
    fn args_formatting_truncates_long_strings() {
        let args = json!({"path": "x".repeat(300), "count": 3});
        let rendered = fmt_args(&args);
        assert!(rendered.contains("count=3"));
        assert!(rendered.len() < 300);
    }

    #[tokio::test]
    async fn run_cli_rejects_unknown_goal() {
        let dir = tempfile::tempdir().unwrap();
        let factory: Arc<dyn LlmFactory> =
            Arc::new(ScriptedFactory(ScriptedLlm::new(vec![])));
        let cfg = RunConfig::new("no-such-goal", dir.path());
        assert_eq!(run_cli(cfg, factory).await, 1);
    }

    #[tokio::test]
    async fn achieved_run_exits_zero_and_persists_history() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".retrai.yml"), "goal: shell\ncommand: \"true\"\n")
            .unwrap();
        let factory: Arc<dyn LlmFactory> = Arc::new(ScriptedFactory(ScriptedLlm::new(vec![
            ScriptedLlm::text_reply("checking", 10, 5),
        ])));
        let mut cfg = RunConfig::new("shell", dir.path());
        cfg.max_iterations = 2;
        let run_id = cfg.run_id.clone();

        let code = run_cli(cfg, factory).await;
        assert_eq!(code, 0);
        let record = crate::history::get_run_record(dir.path(), &run_id).unwrap();
        assert_eq!(record.status, "achieved");
        assert_eq!(record.iterations, 1);
    }

    #[tokio::test]
    async fn failed_run_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".retrai.yml"), "goal: shell\ncommand: \"false\"\n")
            .unwrap();
        let factory: Arc<dyn LlmFactory> = Arc::new(ScriptedFactory(ScriptedLlm::new(vec![
            ScriptedLlm::text_reply("trying", 10, 5),
        ])));
        let mut cfg = RunConfig::new("shell", dir.path());
        cfg.max_iterations = 1;

        assert_eq!(run_cli(cfg, factory).await, 1);
    }

    #[test]
    fn history_listing_handles_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(show_history(dir.path(), 10), 0);
    }
}
