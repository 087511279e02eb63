use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fetchflow_artifact::ArtifactDestination;
use fetchflow_callback::InMemoryRegistry;
use fetchflow_config::PipelineConfig;
use fetchflow_dispatch::{ProcessExecutor, TaskDispatcher};
use fetchflow_engine::PipelineRunner;
use fetchflow_notify::{CommandNotifier, NotificationInvoker};
use fetchflow_workflow::{ControllerConfig, Outcome, WorkflowController};

/// Fetchflow - dispatch a fetch task, await its callback, then notify
#[derive(Parser)]
#[command(name = "fetchflow")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run one execution of the pipeline end to end
  Run {
    /// Path to the pipeline config file (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Override the overall execution timeout
    #[arg(long)]
    execution_timeout_ms: Option<u64>,

    /// Override the notify step timeout
    #[arg(long)]
    notify_timeout_ms: Option<u64>,
  },

  /// Load and validate a pipeline config file
  Validate {
    /// Path to the pipeline config file (JSON)
    #[arg(long)]
    config: PathBuf,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing();

  match cli.command {
    Commands::Run {
      config,
      execution_timeout_ms,
      notify_timeout_ms,
    } => {
      let mut config = load_config(&config)?;
      if let Some(ms) = execution_timeout_ms {
        config.execution_timeout_ms = ms;
      }
      if let Some(ms) = notify_timeout_ms {
        config.notify_timeout_ms = ms;
      }
      config.validate().context("invalid timeout override")?;

      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { run_pipeline(config).await })
    }
    Commands::Validate { config } => {
      let path = config.display().to_string();
      load_config(&config)?;
      println!("{path}: ok");
      Ok(())
    }
  }
}

fn init_tracing() {
  // stdout carries the execution record
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .try_init();
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
  PipelineConfig::load(path)
    .with_context(|| format!("failed to load pipeline config: {}", path.display()))
}

async fn run_pipeline(config: PipelineConfig) -> Result<()> {
  let (signal_tx, signal_rx) = mpsc::channel(config.signal_buffer);

  let mut destination = ArtifactDestination::new(config.artifact_destination.bucket.clone());
  if let Some(prefix) = &config.artifact_destination.prefix {
    destination = destination.with_prefix(prefix.clone());
  }

  let registry = Arc::new(InMemoryRegistry::new());
  let executor = Arc::new(ProcessExecutor::new(config.executor.clone(), signal_tx.clone()));
  let mut dispatcher = TaskDispatcher::new(executor, registry, destination);
  if let Some(credentials_ref) = &config.credentials_ref {
    dispatcher = dispatcher.with_credentials_ref(credentials_ref.clone());
  }

  let step = Arc::new(CommandNotifier::new(config.notifier.clone()));
  let invoker = NotificationInvoker::new(step, config.notify_timeout());

  let controller = Arc::new(WorkflowController::new(
    dispatcher,
    invoker,
    ControllerConfig {
      execution_timeout: config.execution_timeout(),
    },
  ));

  let cancel = CancellationToken::new();
  let runner = PipelineRunner::with_channel(controller.clone(), signal_tx, signal_rx);
  let runner_handle = tokio::spawn(runner.start(cancel.child_token()));

  let handle = controller.trigger();
  let execution_id = handle.execution_id().to_string();
  info!(execution_id = %execution_id, "pipeline_triggered");

  let wait = handle.wait();
  tokio::pin!(wait);
  let record = tokio::select! {
    record = &mut wait => record.context("execution task failed")?,
    _ = tokio::signal::ctrl_c() => {
      warn!(execution_id = %execution_id, "interrupt_received");
      // May already be terminal
      let _ = controller.cancel(&execution_id).await;
      wait.await.context("execution task failed")?
    }
  };

  cancel.cancel();
  runner_handle
    .await
    .context("signal runner panicked")?
    .context("signal runner failed")?;

  println!("{}", serde_json::to_string_pretty(&record)?);

  if let Outcome::Failed { kind, error } = &record.outcome {
    bail!("execution {} failed ({kind}): {error}", record.execution_id);
  }
  Ok(())
}
