//! Notification step backed by a local program.

use std::process::Stdio;

use async_trait::async_trait;
use fetchflow_artifact::ArtifactReference;
use fetchflow_config::CommandDef;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::NotifyError;
use crate::invoker::{NotificationStep, NotifyResult};

/// Runs a program per notification.
///
/// The program gets `{"artifact_reference": {...}}` on stdin and
/// `ARTIFACT_LOCATION` in its environment. Exit status 0 means success; any
/// other status is a rejection carrying the program's stderr.
pub struct CommandNotifier {
  command: CommandDef,
}

impl CommandNotifier {
  pub fn new(command: CommandDef) -> Self {
    Self { command }
  }
}

#[async_trait]
impl NotificationStep for CommandNotifier {
  async fn send(&self, artifact: &ArtifactReference) -> NotifyResult {
    let payload = serde_json::json!({ "artifact_reference": artifact });
    let input = serde_json::to_vec(&payload).map_err(|e| NotifyError::transport(e.to_string()))?;

    let mut child = Command::new(&self.command.program)
      .args(&self.command.args)
      .envs(&self.command.env)
      .env("ARTIFACT_LOCATION", &artifact.location)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      // Dropping the future on timeout must not leave the step running
      .kill_on_drop(true)
      .spawn()
      .map_err(|e| {
        NotifyError::transport(format!("failed to spawn '{}': {}", self.command.program, e))
      })?;

    if let Some(mut stdin) = child.stdin.take()
      && let Err(e) = stdin.write_all(&input).await
      && e.kind() != std::io::ErrorKind::BrokenPipe
    {
      return Err(NotifyError::transport(format!(
        "failed to write payload: {}",
        e
      )));
    }

    let output = child
      .wait_with_output()
      .await
      .map_err(|e| NotifyError::transport(e.to_string()))?;

    debug!(
      status = %output.status,
      stdout = %String::from_utf8_lossy(&output.stdout).trim(),
      "notify_step_exited"
    );

    if output.status.success() {
      Ok(())
    } else {
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      let message = if stderr.is_empty() {
        format!("notify step exited with {}", output.status)
      } else {
        stderr
      };
      Err(NotifyError::rejected(message))
    }
  }
}
