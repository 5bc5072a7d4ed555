use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use weft_flow::Project;
use weft_runtime::{LogKind, Runtime, Settings};

/// Weft - a flow execution engine for component-graph programs
#[derive(Parser)]
#[command(name = "weft")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate a project file
  Validate {
    /// Path to the project file (JSON)
    project_file: PathBuf,
  },

  /// Run a flow from a project file
  Run {
    /// Path to the project file (JSON)
    project_file: PathBuf,

    /// Flow to start (default: the project's first flow)
    #[arg(long)]
    flow: Option<String>,

    /// Print the execution log when the run ends
    #[arg(long)]
    logs: bool,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Validate { project_file }) => {
      let project = load_project(&project_file)?;
      project.validate().context("project validation failed")?;
      eprintln!(
        "Project '{}' is valid ({} flows)",
        project.name,
        project.flows.len()
      );
    }
    Some(Commands::Run {
      project_file,
      flow,
      logs,
    }) => {
      run_flow(project_file, flow, logs)?;
    }
    None => {
      println!("weft - use --help to see available commands");
    }
  }

  Ok(())
}

fn load_project(project_file: &PathBuf) -> Result<Project> {
  let content = std::fs::read_to_string(project_file)
    .with_context(|| format!("failed to read project file: {}", project_file.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse project file: {}", project_file.display()))
}

fn run_flow(project_file: PathBuf, flow: Option<String>, print_logs: bool) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_flow_async(project_file, flow, print_logs).await })
}

async fn run_flow_async(
  project_file: PathBuf,
  flow: Option<String>,
  print_logs: bool,
) -> Result<()> {
  let project = load_project(&project_file)?;
  project.validate().context("project validation failed")?;

  let flow_id = match flow {
    Some(flow) => flow,
    None => project
      .flows
      .first()
      .map(|flow| flow.id.clone())
      .context("project contains no flows")?,
  };

  eprintln!("Loaded project: {} ({} flows)", project.name, project.flows.len());

  let mut runtime = Runtime::new(project);
  *runtime.settings_mut() = Settings::with_path(Settings::sidecar_path(&project_file));
  runtime.settings_mut().load().await?;

  let flow_state = runtime
    .start(&flow_id)
    .with_context(|| format!("failed to start flow '{}'", flow_id))?;
  eprintln!("Started flow '{}' as {}", flow_id, flow_state);

  // Ctrl-C stops the run; the runtime tears every subscription down.
  let cancel = CancellationToken::new();
  let signal_cancel = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      signal_cancel.cancel();
    }
  });

  runtime.run(cancel).await;

  if let Err(error) = runtime.settings().save().await {
    eprintln!("Failed to save runtime settings: {}", error);
  }

  match runtime.error() {
    Some(error) => eprintln!("Flow stopped with error: {}", error),
    None => eprintln!("Flow stopped"),
  }

  if print_logs {
    for item in runtime.logs().items() {
      let kind = match item.kind {
        LogKind::Debug => "debug",
        LogKind::Info => "info",
        LogKind::Scpi => "scpi",
        LogKind::Error => "error",
      };
      println!(
        "{} [{}] {}",
        item.timestamp.format("%H:%M:%S%.3f"),
        kind,
        item.message
      );
    }
  }

  Ok(())
}
