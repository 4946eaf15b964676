//! retrAI CLI
//!
//! Command-line entry points for running, resuming, and inspecting
//! agent runs. Exit code is 0 iff the aggregate status is "achieved".

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use retrai::config::{load_project_config, AgentPattern, RunConfig, StopMode};
use retrai::goals::list_goals;
use retrai::llm::{LlmFactory, OpenRouterFactory};
use retrai::runner::{
    run_bench, run_cli, run_pipeline, run_resume, run_review_cmd, run_solve, run_swarm,
    run_watch, show_history,
};
use retrai::VERSION;

#[derive(Parser)]
#[command(
    name = "retrai",
    author = "retrAI Contributors",
    version = VERSION,
    about = "retrAI - self-driving agent runtime",
    long_about = None
)]
struct Cli {
    /// Project directory (defaults to the current directory)
    #[arg(long, global = true, default_value = ".")]
    cwd: PathBuf,

    /// Model identifier
    #[arg(long, short, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a named goal from the registry
    Run {
        /// Goal name (see `retrai goals`)
        goal: Option<String>,
        /// Maximum plan/act/evaluate iterations
        #[arg(long, default_value_t = 50)]
        max_iterations: u32,
        /// Stop mode: soft warns the agent to write a summary before the cap
        #[arg(long, value_enum, default_value = "soft")]
        stop_mode: StopModeArg,
        /// Pause after each evaluation for human approval
        #[arg(long)]
        hitl: bool,
        /// Enable Mixture-of-Personas planning
        #[arg(long)]
        mop: bool,
        /// Persona count for MoP
        #[arg(long, default_value_t = 3)]
        mop_k: u32,
        /// Cost ceiling in USD (0 = unlimited)
        #[arg(long, default_value_t = 0.0)]
        max_cost: f64,
    },

    /// Solve a natural-language problem (LLM-judged)
    Solve {
        /// Problem description
        description: String,
        #[arg(long, default_value_t = 30)]
        max_iterations: u32,
        #[arg(long, default_value_t = 0.0)]
        max_cost: f64,
    },

    /// Resume a suspended human-in-the-loop run
    Resume {
        /// Run id printed when the run suspended
        run_id: String,
        /// Goal the run was started with
        #[arg(long)]
        goal: String,
    },

    /// Decompose a goal and run parallel worker agents
    Swarm {
        /// Goal description
        description: String,
        #[arg(long, default_value_t = 3)]
        max_workers: usize,
        #[arg(long, default_value_t = 10)]
        max_iterations: u32,
    },

    /// Run several goals in sequence
    Pipeline {
        /// Goal names, in order
        goals: Vec<String>,
        #[arg(long, default_value_t = 30)]
        max_iterations: u32,
        /// Keep going when a step fails
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Compare models on the same goal with clean git resets
    Bench {
        /// Goal name
        goal: String,
        /// Models to compare
        #[arg(long, required = true, num_args = 1..)]
        models: Vec<String>,
        #[arg(long, default_value_t = 20)]
        max_iterations: u32,
        #[arg(long, default_value_t = 1)]
        rounds: u32,
    },

    /// AI code review of the current diff
    Review {
        /// Review staged changes only
        #[arg(long)]
        staged: bool,
    },

    /// Watch the project and rerun the goal on changes
    Watch {
        /// Goal name (auto-detected when omitted)
        #[arg(long)]
        goal: Option<String>,
        #[arg(long, default_value_t = 20)]
        max_iterations: u32,
        /// Debounce in milliseconds
        #[arg(long, default_value_t = 1000)]
        debounce: u64,
    },

    /// Show recent run history
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// List available goals
    Goals,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum StopModeArg {
    Soft,
    Hard,
}

impl From<StopModeArg> for StopMode {
    fn from(arg: StopModeArg) -> Self {
        match arg {
            StopModeArg::Soft => StopMode::Soft,
            StopModeArg::Hard => StopMode::Hard,
        }
    }
}

fn resolve_model(cli_model: &Option<String>, cwd: &PathBuf) -> String {
    if let Some(model) = cli_model {
        return model.clone();
    }
    load_project_config(cwd)
        .ok()
        .flatten()
        .and_then(|cfg| cfg.model)
        .unwrap_or_else(|| "claude-sonnet-4-6".to_string())
}

fn resolve_goal(cli_goal: Option<String>, cwd: &PathBuf) -> Option<String> {
    cli_goal.or_else(|| {
        load_project_config(cwd)
            .ok()
            .flatten()
            .and_then(|cfg| cfg.goal)
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("retrai=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cwd = cli.cwd.canonicalize().unwrap_or_else(|_| cli.cwd.clone());
    let model = resolve_model(&cli.model, &cwd);

    // Goal listing needs no credentials; everything else does.
    if let Commands::Goals = cli.command {
        for name in list_goals() {
            println!("{}", name);
        }
        return Ok(());
    }

    let factory: Arc<dyn LlmFactory> = Arc::new(OpenRouterFactory::from_env()?);

    let exit_code = match cli.command {
        Commands::Run {
            goal,
            max_iterations,
            stop_mode,
            hitl,
            mop,
            mop_k,
            max_cost,
        } => {
            let Some(goal) = resolve_goal(goal, &cwd) else {
                eprintln!("No goal given and none configured in .retrai.yml");
                std::process::exit(1);
            };
            let mut cfg = RunConfig::new(goal, &cwd);
            cfg.model_name = model;
            cfg.max_iterations = max_iterations;
            cfg.stop_mode = stop_mode.into();
            cfg.hitl_enabled = hitl;
            cfg.agent_pattern = if mop {
                AgentPattern::Mop
            } else {
                AgentPattern::Default
            };
            cfg.mop_k = mop_k;
            cfg.max_cost_usd = max_cost;
            run_cli(cfg, factory).await
        }

        Commands::Solve {
            description,
            max_iterations,
            max_cost,
        } => {
            let mut cfg = RunConfig::new("solve", &cwd);
            cfg.model_name = model;
            cfg.max_iterations = max_iterations;
            cfg.max_cost_usd = max_cost;
            run_solve(cfg, description, factory).await
        }

        Commands::Resume { run_id, goal } => run_resume(&cwd, &run_id, &goal, factory).await,

        Commands::Swarm {
            description,
            max_workers,
            max_iterations,
        } => run_swarm(description, &cwd, factory, &model, max_workers, max_iterations).await,

        Commands::Pipeline {
            goals,
            max_iterations,
            continue_on_error,
        } => run_pipeline(goals, &cwd, factory, &model, max_iterations, continue_on_error).await,

        Commands::Bench {
            goal,
            models,
            max_iterations,
            rounds,
        } => run_bench(models, goal, &cwd, factory, max_iterations, rounds).await,

        Commands::Review { staged } => run_review_cmd(&cwd, factory, &model, staged).await,

        Commands::Watch {
            goal,
            max_iterations,
            debounce,
        } => run_watch(&cwd, goal, factory, &model, max_iterations, debounce).await,

        Commands::History { limit } => show_history(&cwd, limit),

        Commands::Goals => unreachable!("handled above"),
    };

    std::process::exit(exit_code);
}
