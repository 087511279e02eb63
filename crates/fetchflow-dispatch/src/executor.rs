use async_trait::async_trait;
use fetchflow_artifact::ArtifactDestination;
use fetchflow_callback::CorrelationToken;

use crate::error::DispatchError;

/// Everything the executor needs to run one fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
  /// Execution the task belongs to. For logging only; the executor must not
  /// report it back.
  pub execution_id: String,
  /// Token the executor echoes in its completion signal.
  pub token: CorrelationToken,
  pub destination: ArtifactDestination,
  pub credentials_ref: Option<String>,
}

/// Acknowledgement that a task was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReceipt {
  /// Executor-side identifier of the started task.
  pub task_id: String,
}

/// Something that can start a fetch task without waiting for it.
#[async_trait]
pub trait FetchExecutor: Send + Sync {
  /// Start the task and return once it is running.
  async fn launch(&self, request: LaunchRequest) -> Result<LaunchReceipt, DispatchError>;

  /// Stop the task started for `token`, if it is still running.
  ///
  /// Called once the token is settled without a successful report. Executors
  /// whose tasks cannot be stopped keep the default no-op.
  async fn abort(&self, _token: &CorrelationToken) {}
}
