use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crew::checks::{CheckRunner, ShellCheckCommand};
use crew::config::OrchestratorConfig;
use crew::gates::QualityGateEngine;
use crew::monitor::MonitoringEngine;
use crew::orchestrator::WorkflowOrchestrator;
use crew::task::TaskSpec;
use crew::traits::{
    AlwaysPassValidator, MemoryLedger, StaticContextProvider, TemplateGenerator,
    TracingErrorSink, Validator,
};
use crew::validation::ValidationCoordinator;
use crew::worker::WorkerExecutor;

#[derive(Parser)]
#[command(name = "crew")]
#[command(version, about = "Task orchestration and quality-gate pipeline")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a quality gate against the current directory (CI entry point)
    Gate {
        /// Gate name: pre-commit, pre-push, pre-deploy, post-deploy
        name: String,
        /// Map a check name to a shell command, e.g. --check lint='cargo clippy'
        #[arg(long = "check", value_parser = parse_check)]
        checks: Vec<(String, String)>,
        /// Working directory for check commands
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Submit a demo batch through the full pipeline with in-memory collaborators
    Demo,
}

fn parse_check(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, cmd)| (name.to_string(), cmd.to_string()))
        .ok_or_else(|| format!("expected NAME=COMMAND, got '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    match cli.command {
        Commands::Gate { name, checks, dir } => run_gate(&name, checks, dir).await,
        Commands::Demo => run_demo().await,
    }
}

async fn run_gate(name: &str, checks: Vec<(String, String)>, dir: Option<PathBuf>) -> Result<()> {
    let dir = match dir {
        Some(d) => d,
        None => std::env::current_dir().context("failed to resolve working directory")?,
    };

    let mut command = ShellCheckCommand::new(&dir);
    for (check, cmd) in checks {
        command = command.with_command(&check, &cmd);
    }

    let config = OrchestratorConfig::standard();
    let monitor = Arc::new(MonitoringEngine::new());
    let sink = Arc::new(TracingErrorSink::new());
    let engine = QualityGateEngine::new(
        &config,
        CheckRunner::new(Arc::new(command)),
        sink,
        monitor,
    )?;

    let result = engine.run_gate(name).await;

    for check in &result.checks {
        let mark = if check.passed {
            style("pass").green()
        } else {
            style("FAIL").red()
        };
        println!("  {} {} ({:.1}s)", mark, check.name, check.duration.as_secs_f64());
    }
    for warning in &result.warnings {
        println!("  {} {}", style("warn").yellow(), warning);
    }

    if result.bypassed {
        println!("{} gate '{name}' bypassed", style("ok").dim());
    } else if result.passed {
        println!("{} gate '{name}' passed", style("ok").green().bold());
    } else {
        println!(
            "{} gate '{name}' failed: [{}]",
            style("error").red().bold(),
            result.blocking_failures.join(", ")
        );
        std::process::exit(1);
    }
    Ok(())
}

async fn run_demo() -> Result<()> {
    let config = OrchestratorConfig::standard();
    let monitor = Arc::new(MonitoringEngine::new());
    let sink = Arc::new(TracingErrorSink::new());
    let ledger = Arc::new(MemoryLedger::new());
    let context = Arc::new(StaticContextProvider::default());
    let generator = Arc::new(TemplateGenerator);

    // Every standard check succeeds in the demo.
    let mut command = ShellCheckCommand::new(std::env::current_dir()?);
    for gate in &config.gates {
        for check in &gate.checks {
            command = command.with_command(&check.name, "true");
        }
    }

    let engine = Arc::new(QualityGateEngine::new(
        &config,
        CheckRunner::new(Arc::new(command)),
        sink.clone(),
        monitor.clone(),
    )?);

    let mut validators: HashMap<String, Arc<dyn Validator>> = HashMap::new();
    for ids in config.areas.values() {
        for id in ids {
            validators.insert(id.clone(), Arc::new(AlwaysPassValidator));
        }
    }
    let coordinator = Arc::new(ValidationCoordinator::new(&config, validators)?);

    let executor = Arc::new(WorkerExecutor::new(
        &config,
        generator.clone(),
        ledger.clone(),
        context.clone(),
        sink.clone(),
        monitor.clone(),
    ));

    let orchestrator = WorkflowOrchestrator::new(
        &config,
        executor,
        engine,
        coordinator,
        context,
        generator,
        ledger,
        monitor,
    );

    let run_id = orchestrator
        .submit_batch(
            "demo",
            vec![
                TaskSpec::new("bug-fix", "null pointer in session handler", "backend"),
                TaskSpec::new("optimize", "slow query on tasks table", "backend"),
                TaskSpec::new("ui", "button color off-brand", "frontend"),
            ],
        )
        .await;

    let run = orchestrator
        .get_run(run_id)
        .context("run vanished from the store")?;

    println!(
        "{} run '{}' reached {:?}: {}/{} tasks completed",
        style("done").green().bold(),
        run.name,
        run.phase,
        run.metrics.completed_tasks,
        run.metrics.total_tasks
    );
    for error in &run.errors {
        println!("  {} {error}", style("error").red());
    }
    for warning in &run.warnings {
        println!("  {} {warning}", style("warn").yellow());
    }

    let dashboard = orchestrator.dashboard();
    println!("{} {}", style("dashboard").bold(), dashboard.summary);
    Ok(())
}
