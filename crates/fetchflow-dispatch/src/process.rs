//! Fetch executor backed by a local child process.
//!
//! The child receives its assignment through the environment:
//!
//! | variable             | value                                  |
//! |----------------------|----------------------------------------|
//! | `TASK_TOKEN`         | correlation token to echo back         |
//! | `RESULT_BUCKET_NAME` | destination bucket                     |
//! | `RESULT_PREFIX`      | destination key prefix (if configured) |
//! | `CREDENTIALS_REF`    | credentials reference (if configured)  |
//!
//! It reports completion by printing a [`SignalMessage`] as a JSON line on
//! stdout. Any other output is ignored. A child that exits without reporting
//! produces a failure signal for its token. A report that carries only a
//! [`BillReport`] is located in the launch destination: a bare key becomes an
//! ARN in the bucket, and an empty location becomes the dated `bill.pdf` key.
//!
//! The child is killed when its token is aborted or when the runtime drops it.

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fetchflow_artifact::{ArtifactDestination, ArtifactReference, BillReport};
use fetchflow_callback::{CorrelationToken, SignalMessage};
use fetchflow_config::CommandDef;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DispatchError;
use crate::executor::{FetchExecutor, LaunchReceipt, LaunchRequest};

/// Runs the fetch task as a child process of the orchestrator.
pub struct ProcessExecutor {
  command: CommandDef,
  signals: mpsc::Sender<SignalMessage>,
  running: Arc<Mutex<HashMap<CorrelationToken, CancellationToken>>>,
}

const BILL_PDF: &str = "bill.pdf";

impl ProcessExecutor {
  /// Create an executor that forwards reports to `signals`.
  pub fn new(command: CommandDef, signals: mpsc::Sender<SignalMessage>) -> Self {
    Self {
      command,
      signals,
      running: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  fn build_command(&self, request: &LaunchRequest) -> Command {
    let mut cmd = Command::new(&self.command.program);
    cmd
      .args(&self.command.args)
      .envs(&self.command.env)
      .env("TASK_TOKEN", request.token.as_str())
      .env("RESULT_BUCKET_NAME", &request.destination.bucket)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::inherit())
      .kill_on_drop(true);

    if let Some(prefix) = &request.destination.prefix {
      cmd.env("RESULT_PREFIX", prefix);
    }
    if let Some(credentials_ref) = &request.credentials_ref {
      cmd.env("CREDENTIALS_REF", credentials_ref);
    }

    cmd
  }
}

#[async_trait]
impl FetchExecutor for ProcessExecutor {
  async fn launch(&self, request: LaunchRequest) -> Result<LaunchReceipt, DispatchError> {
    let mut child = self.build_command(&request).spawn().map_err(|e| {
      DispatchError::launch(format!("failed to spawn '{}': {}", self.command.program, e))
    })?;

    let task_id = child
      .id()
      .map(|pid| format!("pid-{}", pid))
      .unwrap_or_else(|| "pid-unknown".to_string());
    let stdout = child
      .stdout
      .take()
      .ok_or_else(|| DispatchError::launch("child stdout was not captured"))?;

    info!(
      execution_id = %request.execution_id,
      task_id = %task_id,
      program = %self.command.program,
      "executor_process_started"
    );

    let abort = CancellationToken::new();
    self
      .running
      .lock()
      .unwrap()
      .insert(request.token.clone(), abort.clone());

    tokio::spawn(watch_child(
      child,
      stdout,
      Watch {
        token: request.token,
        task_id: task_id.clone(),
        destination: request.destination,
        signals: self.signals.clone(),
        abort,
        running: self.running.clone(),
      },
    ));

    Ok(LaunchReceipt { task_id })
  }

  async fn abort(&self, token: &CorrelationToken) {
    let abort = self.running.lock().unwrap().remove(token);
    if let Some(abort) = abort {
      abort.cancel();
    }
  }
}

struct Watch {
  token: CorrelationToken,
  task_id: String,
  destination: ArtifactDestination,
  signals: mpsc::Sender<SignalMessage>,
  abort: CancellationToken,
  running: Arc<Mutex<HashMap<CorrelationToken, CancellationToken>>>,
}

/// Forward the child's reports until it exits or is aborted.
async fn watch_child(mut child: Child, stdout: ChildStdout, watch: Watch) {
  let Watch {
    token,
    task_id,
    destination,
    signals,
    abort,
    running,
  } = watch;
  let mut lines = BufReader::new(stdout).lines();
  let mut reported = false;

  loop {
    let line = tokio::select! {
      _ = abort.cancelled() => {
        kill_child(&mut child, &task_id).await;
        return;
      }
      line = lines.next_line() => line,
    };

    match line {
      Ok(Some(line)) => match SignalMessage::parse(&line) {
        Ok(message) => {
          reported = true;
          let message = locate_report(message, &destination);
          if signals.send(message).await.is_err() {
            warn!(task_id = %task_id, "signal channel closed, dropping report");
          }
        }
        Err(_) => debug!(task_id = %task_id, line = %line, "executor_output"),
      },
      Ok(None) => break,
      Err(e) => {
        warn!(task_id = %task_id, error = %e, "failed to read executor output");
        break;
      }
    }
  }

  let status = tokio::select! {
    _ = abort.cancelled() => {
      kill_child(&mut child, &task_id).await;
      return;
    }
    status = child.wait() => status,
  };
  running.lock().unwrap().remove(&token);
  info!(task_id = %task_id, status = ?status, "executor_process_exited");

  if !reported {
    let message = SignalMessage {
      token,
      success: false,
      artifact: None,
      report: None,
      error: Some(exit_description(status)),
    };
    let _ = signals.send(message).await;
  }
}

async fn kill_child(child: &mut Child, task_id: &str) {
  match child.kill().await {
    Ok(()) => info!(task_id = %task_id, "executor_process_killed"),
    Err(e) => warn!(task_id = %task_id, error = %e, "failed to kill executor process"),
  }
}

/// Fill in the artifact of a report-only success from the destination layout.
fn locate_report(mut message: SignalMessage, destination: &ArtifactDestination) -> SignalMessage {
  if message.success
    && message.artifact.is_none()
    && let Some(report) = &message.report
  {
    message.artifact = Some(report_location(report, destination));
  }
  message
}

fn report_location(report: &BillReport, destination: &ArtifactDestination) -> ArtifactReference {
  let key = report.pdf_location.trim();
  if key.starts_with("arn:") || key.contains("://") {
    return report.artifact_reference();
  }

  let key = if key.is_empty() {
    destination.object_key(report.bill_info.invoice_date, BILL_PDF)
  } else {
    key.trim_start_matches('/').to_string()
  };
  ArtifactReference::new(destination.arn(&key))
}

fn exit_description(status: std::io::Result<ExitStatus>) -> String {
  match status {
    Ok(status) => format!("executor exited ({}) without reporting", status),
    Err(e) => format!("executor could not be awaited: {}", e),
  }
}
