use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{miette, IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use skein::event_bus::ChannelSink;
use skein::runtime::{EventBusConfig, RunReport, RuntimeConfig, WorkflowRuntime};
use skein::telemetry::{PlainFormatter, TelemetryFormatter};
use skein::tools::ToolRegistry;
use skein::workflow::{discover_workflows, load_workflow_file, Workflow};

#[derive(Parser)]
#[command(name = "skein", version, about = "Declarative workflow engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow in headless mode
    Run {
        /// Path to the workflow YAML file
        file: PathBuf,
        /// Where to write the execution trace
        #[arg(long, default_value = "trace.json")]
        trace: PathBuf,
    },
    /// Run a workflow with a live event renderer; with no file argument an
    /// interactive selector is shown over *.yaml in the working directory
    Tui {
        /// Path to the workflow YAML file
        file: Option<PathBuf>,
        /// Where to write the execution trace
        #[arg(long, default_value = "trace.json")]
        trace: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { file, trace } => run_headless(&file, trace).await,
        Commands::Tui { file, trace } => run_tui(file, trace).await,
    }
}

async fn run_headless(file: &Path, trace: PathBuf) -> Result<()> {
    let workflow = load_workflow_file(file)?;
    let config = RuntimeConfig::default().with_trace_path(trace);
    let mut runtime =
        WorkflowRuntime::with_config(workflow, ToolRegistry::with_builtins(), config);
    let report = runtime.run().await?;
    finish(report)
}

async fn run_tui(file: Option<PathBuf>, trace: PathBuf) -> Result<()> {
    let file = match file {
        Some(file) => file,
        None => select_workflow()?,
    };
    let workflow = load_workflow_file(&file)?;

    // The renderer is the only consumer; events stream through a channel
    // sink instead of the default stdout sink.
    let config = RuntimeConfig::default()
        .with_trace_path(trace)
        .with_event_bus(EventBusConfig::silent());
    let mut runtime =
        WorkflowRuntime::with_config(workflow, ToolRegistry::with_builtins(), config);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    runtime.add_event_sink(ChannelSink::new(tx));
    let renderer = tokio::spawn(async move {
        let formatter = PlainFormatter::new();
        while let Some(event) = rx.recv().await {
            print!("{}", formatter.render_event(&event));
        }
    });

    let report = runtime.run().await?;
    // Dropping the runtime drops the channel sink, which ends the renderer.
    drop(runtime);
    renderer.await.into_diagnostic()?;
    finish(report)
}

fn finish(report: RunReport) -> Result<()> {
    println!(
        "{} supersteps, {} steps merged",
        report.supersteps,
        report.executed.len()
    );
    if report.failed() {
        return Err(miette!(
            "workflow failed at: {}",
            report.failed_steps.join(", ")
        ));
    }
    Ok(())
}

fn select_workflow() -> Result<PathBuf> {
    let cwd = std::env::current_dir().into_diagnostic()?;
    let mut found = discover_workflows(&cwd)?;
    if found.is_empty() {
        found = discover_workflows(&cwd.join("example"))?;
    }
    if found.is_empty() {
        return Err(miette!(
            "no workflow files (*.yaml) found in {} or example/",
            cwd.display()
        ));
    }

    let labels: Vec<String> = found.iter().map(|(path, wf)| label(path, wf)).collect();
    let selection = dialoguer::Select::new()
        .with_prompt("Select a workflow")
        .items(&labels)
        .default(0)
        .interact()
        .into_diagnostic()?;
    Ok(found.swap_remove(selection).0)
}

fn label(path: &Path, workflow: &Workflow) -> String {
    let file = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    format!("{file} ({})", workflow.name)
}
