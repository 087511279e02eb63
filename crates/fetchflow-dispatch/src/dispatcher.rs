//! Task dispatcher.

use std::sync::Arc;

use fetchflow_artifact::ArtifactDestination;
use fetchflow_callback::{CallbackRegistry, CorrelationToken, PendingCallback};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::error::DispatchError;
use crate::executor::{FetchExecutor, LaunchRequest};

/// A launched task and the registration awaiting its signal.
#[derive(Debug)]
pub struct Dispatched {
  pub token: CorrelationToken,
  pub task_id: String,
  pub pending: PendingCallback,
}

/// Launches fetch tasks and registers their correlation tokens.
pub struct TaskDispatcher {
  executor: Arc<dyn FetchExecutor>,
  registry: Arc<dyn CallbackRegistry>,
  destination: ArtifactDestination,
  credentials_ref: Option<String>,
}

impl TaskDispatcher {
  pub fn new(
    executor: Arc<dyn FetchExecutor>,
    registry: Arc<dyn CallbackRegistry>,
    destination: ArtifactDestination,
  ) -> Self {
    Self {
      executor,
      registry,
      destination,
      credentials_ref: None,
    }
  }

  pub fn with_credentials_ref(mut self, credentials_ref: impl Into<String>) -> Self {
    self.credentials_ref = Some(credentials_ref.into());
    self
  }

  /// The registry tokens are registered with.
  pub fn registry(&self) -> &Arc<dyn CallbackRegistry> {
    &self.registry
  }

  /// Stop the fetch task behind `token`.
  #[instrument(name = "abort", skip(self, token), fields(token = %token))]
  pub async fn abort(&self, token: &CorrelationToken) {
    self.executor.abort(token).await;
  }

  /// Launch the fetch task for `execution_id`.
  ///
  /// The token is registered before the launch so a fast executor cannot
  /// report ahead of its registration. If the launch fails, does not return
  /// by `deadline`, or `cancel` fires first, the registration is released
  /// before this returns, so a failed dispatch never leaves a token behind.
  #[instrument(name = "dispatch", skip(self, deadline, cancel), fields(execution_id = %execution_id))]
  pub async fn dispatch(
    &self,
    execution_id: &str,
    deadline: Instant,
    cancel: &CancellationToken,
  ) -> Result<Dispatched, DispatchError> {
    if cancel.is_cancelled() {
      return Err(DispatchError::Cancelled);
    }

    let token = CorrelationToken::mint();
    let pending = self
      .registry
      .register(token.clone(), execution_id)
      .await
      .map_err(|source| DispatchError::Registration { source })?;

    let request = LaunchRequest {
      execution_id: execution_id.to_string(),
      token: token.clone(),
      destination: self.destination.clone(),
      credentials_ref: self.credentials_ref.clone(),
    };

    let launched = tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(DispatchError::Cancelled),
      result = tokio::time::timeout_at(deadline, self.executor.launch(request)) => {
        result.unwrap_or(Err(DispatchError::DeadlineElapsed))
      }
    };

    match launched {
      Ok(receipt) => {
        info!(token = %token, task_id = %receipt.task_id, "task_dispatched");
        Ok(Dispatched {
          token,
          task_id: receipt.task_id,
          pending,
        })
      }
      Err(e) => {
        self.registry.release(&token).await;
        // A launch cut short by the deadline or cancellation may have started
        self.executor.abort(&token).await;
        error!(error = %e, "dispatch_failed");
        Err(e)
      }
    }
  }
}
