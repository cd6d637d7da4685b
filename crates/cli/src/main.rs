//! `ci-engine` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — load a workflow file and print the action order.
//! - `plan`     — show which workflows an event triggers and what they run.
//! - `run`      — execute the workflows an event triggers.
//!
//! Exit codes: 0 when every triggered action succeeded, 1 when any run
//! failed, 2 when the workflow file could not be loaded (config, reference or
//! cycle error), 3 for anything else that stopped the command (unusable
//! workspace, output failure).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use actions::RunnerRegistry;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use engine::{
    ActionGraph, ActionStatus, Engine, EngineError, ExecutionPlan, ExecutorConfig, RunReport,
    WorkflowExecutor,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Parser)]
#[command(
    name = "ci-engine",
    about = "Run CI workflows declared as a graph of actions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Show the workflows an event triggers and their execution plans.
    Plan {
        /// Path to the workflow JSON file.
        path: PathBuf,
        #[arg(long, env = "CI_ENGINE_EVENT", default_value = "push")]
        event: String,
        /// Print the plans as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run the workflows an event triggers.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Path to the workflow JSON file.
    path: PathBuf,
    #[arg(long, env = "CI_ENGINE_EVENT", default_value = "push")]
    event: String,
    /// Repository checkout the actions run in.
    #[arg(long, env = "CI_ENGINE_WORKSPACE", default_value = ".")]
    workspace: PathBuf,
    /// Maximum number of actions running at once.
    #[arg(long, env = "CI_ENGINE_MAX_PARALLEL")]
    max_parallel: Option<usize>,
    /// Per-action timeout in seconds.
    #[arg(long, env = "CI_ENGINE_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,
    /// Times a failed action is retried.
    #[arg(long, env = "CI_ENGINE_RETRIES", default_value_t = 0)]
    retries: u32,
    /// Print the run reports as JSON.
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_parallel: self.max_parallel,
            action_timeout: self.timeout_secs.map(Duration::from_secs),
            max_retries: self.retries,
            ..ExecutorConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match execute(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::from(failure_code(&e))
        }
    }
}

const EXIT_LOAD_ERROR: u8 = 2;
const EXIT_OTHER_ERROR: u8 = 3;

fn failure_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<EngineError>() {
        Some(e) if e.is_load_error() => EXIT_LOAD_ERROR,
        _ => EXIT_OTHER_ERROR,
    }
}

async fn execute(command: Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::Validate { path } => {
            let graph = load(&path)?;
            println!(
                "✅ Workflow file is valid. Action order: {:?}",
                graph.topological_order()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Plan { path, event, json } => {
            let graph = load(&path)?;
            let plans: Vec<ExecutionPlan> = engine::match_event(&graph, &event)
                .into_iter()
                .map(|workflow| graph.plan(workflow))
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&plans)?);
            } else if plans.is_empty() {
                println!("No workflow is triggered by '{event}'.");
            } else {
                for plan in &plans {
                    print_plan(plan);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Run(args) => {
            let graph = load(&args.path)?;
            let executor = WorkflowExecutor::new(RunnerRegistry::with_builtins(), args.executor_config());
            let workspace = args
                .workspace
                .canonicalize()
                .with_context(|| format!("workspace {} is not accessible", args.workspace.display()))?;
            let ci = Engine::new(Arc::new(graph), executor, workspace);

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling workflow runs");
                    on_interrupt.cancel();
                }
            });

            let reports = ci.dispatch(&args.event, cancel).await?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else if reports.is_empty() {
                println!("No workflow is triggered by '{}'.", args.event);
            } else {
                for report in &reports {
                    print_report(report);
                }
            }

            Ok(match engine::exit_code(&reports) {
                0 => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            })
        }
    }
}

fn load(path: &std::path::Path) -> anyhow::Result<ActionGraph> {
    ActionGraph::load_file(path).with_context(|| format!("cannot load {}", path.display()))
}

fn print_plan(plan: &ExecutionPlan) {
    println!("workflow '{}' (on {})", plan.workflow, plan.event);
    for step in &plan.steps {
        let after = if step.upstream.is_empty() {
            String::new()
        } else {
            format!("  after {}", step.upstream.join(", "))
        };
        println!("  {:<16} uses {}{after}", step.action.name, step.action.uses);
    }
}

fn print_report(report: &RunReport) {
    let marker = if report.succeeded() { "✅" } else { "❌" };
    let cancelled = if report.cancelled { " (cancelled)" } else { "" };
    println!(
        "{marker} workflow '{}' {}{cancelled}  [run {}]",
        report.workflow, report.status, report.run_id
    );

    for action in &report.actions {
        let symbol = match action.status {
            ActionStatus::Succeeded => "✓",
            ActionStatus::Failed => "✗",
            _ => "-",
        };
        match &action.reason {
            Some(reason) => println!("  {symbol} {:<16} {}: {reason}", action.name, action.status),
            None => println!("  {symbol} {:<16} {}", action.name, action.status),
        }
        if action.status == ActionStatus::Failed {
            for line in action.stderr.lines().chain(action.stdout.lines()).take(20) {
                println!("      | {line}");
            }
        }
    }
}
