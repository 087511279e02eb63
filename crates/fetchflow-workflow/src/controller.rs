//! Workflow controller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use fetchflow_callback::{CallbackError, CallbackOutcome, CallbackRegistry, CallbackSignal};
use fetchflow_dispatch::{DispatchError, Dispatched, TaskDispatcher};
use fetchflow_notify::NotificationInvoker;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::WorkflowError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::execution::ExecutionRecord;
use crate::state::{ExecutionState, FailureKind};

const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(60);
const CANCELLED: &str = "execution cancelled";

/// Configuration for the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
  /// Wall-clock bound for each execution, from trigger to terminal state.
  pub execution_timeout: Duration,
}

impl Default for ControllerConfig {
  fn default() -> Self {
    Self {
      execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
    }
  }
}

/// Handle to a triggered execution.
///
/// Dropping the handle does not stop the execution.
pub struct ExecutionHandle {
  execution_id: String,
  join: JoinHandle<Result<ExecutionRecord, WorkflowError>>,
}

impl ExecutionHandle {
  pub fn execution_id(&self) -> &str {
    &self.execution_id
  }

  /// Wait for the execution to reach a terminal state.
  pub async fn wait(self) -> Result<ExecutionRecord, WorkflowError> {
    self.join.await.map_err(|e| WorkflowError::Join {
      message: e.to_string(),
    })?
  }
}

struct Tracked {
  record: ExecutionRecord,
  cancel: CancellationToken,
}

/// Drives executions of the dispatch → callback → notify pipeline.
///
/// All state changes go through the execution table under one lock, and a
/// terminal record is never modified again. Whichever of the execution task,
/// [`cancel`](Self::cancel), or shutdown settles a record first decides its
/// outcome; the others become no-ops.
pub struct WorkflowController {
  dispatcher: TaskDispatcher,
  invoker: NotificationInvoker,
  config: ControllerConfig,
  executions: Mutex<HashMap<String, Tracked>>,
  notifier: Arc<dyn ExecutionNotifier>,
  shutdown: CancellationToken,
}

impl WorkflowController {
  pub fn new(
    dispatcher: TaskDispatcher,
    invoker: NotificationInvoker,
    config: ControllerConfig,
  ) -> Self {
    if invoker.timeout() >= config.execution_timeout {
      warn!(
        notify_timeout_ms = invoker.timeout().as_millis() as u64,
        execution_timeout_ms = config.execution_timeout.as_millis() as u64,
        "notify_timeout_not_shorter_than_execution_timeout"
      );
    }

    Self {
      dispatcher,
      invoker,
      config,
      executions: Mutex::new(HashMap::new()),
      notifier: Arc::new(NoopNotifier),
      shutdown: CancellationToken::new(),
    }
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  /// The registry inbound signals are resolved against.
  pub fn registry(&self) -> &Arc<dyn CallbackRegistry> {
    self.dispatcher.registry()
  }

  /// Start a new execution and return immediately.
  pub fn trigger(self: &Arc<Self>) -> ExecutionHandle {
    let execution_id = uuid::Uuid::new_v4().to_string();
    let timeout = self.config.execution_timeout;
    let deadline = Instant::now() + timeout;

    let started_at = Utc::now();
    let deadline_at = TimeDelta::from_std(timeout)
      .ok()
      .and_then(|delta| started_at.checked_add_signed(delta))
      .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let cancel = self.shutdown.child_token();
    {
      let mut executions = self.executions.lock().unwrap();
      executions.insert(
        execution_id.clone(),
        Tracked {
          record: ExecutionRecord::new(execution_id.clone(), started_at, deadline_at),
          cancel: cancel.clone(),
        },
      );
      self.notifier.notify(ExecutionEvent::ExecutionStarted {
        execution_id: execution_id.clone(),
      });
    }

    info!(
      execution_id = %execution_id,
      deadline_at = %deadline_at,
      "execution_started"
    );

    let controller = Arc::clone(self);
    let id = execution_id.clone();
    let join = tokio::spawn(async move { controller.run(id, deadline, cancel).await });

    ExecutionHandle { execution_id, join }
  }

  /// Current snapshot of an execution.
  pub fn status(&self, execution_id: &str) -> Option<ExecutionRecord> {
    self
      .executions
      .lock()
      .unwrap()
      .get(execution_id)
      .map(|tracked| tracked.record.clone())
  }

  /// Snapshots of all known executions, live and archived.
  pub fn executions(&self) -> Vec<ExecutionRecord> {
    self
      .executions
      .lock()
      .unwrap()
      .values()
      .map(|tracked| tracked.record.clone())
      .collect()
  }

  /// Cancel an execution.
  ///
  /// On return the execution is `Failed` with kind `Cancelled` and its token
  /// (if any) has been released, so no later signal can resolve it.
  pub async fn cancel(&self, execution_id: &str) -> Result<(), WorkflowError> {
    let cancel = {
      let executions = self.executions.lock().unwrap();
      let tracked = executions
        .get(execution_id)
        .ok_or_else(|| WorkflowError::ExecutionNotFound {
          execution_id: execution_id.to_string(),
        })?;
      if tracked.record.is_terminal() {
        return Err(WorkflowError::AlreadyTerminal {
          execution_id: execution_id.to_string(),
          state: tracked.record.state,
        });
      }
      tracked.cancel.clone()
    };

    // Fired first so a dispatch that has not registered yet never does
    cancel.cancel();

    match self.fail(execution_id, FailureKind::Cancelled, CANCELLED).await {
      Ok(()) => Ok(()),
      Err(WorkflowError::AlreadyTerminal { .. })
        if self
          .status(execution_id)
          .and_then(|record| record.outcome.failure_kind())
          == Some(FailureKind::Cancelled) =>
      {
        // The execution task observed the cancellation first
        Ok(())
      }
      Err(e) => Err(e),
    }
  }

  /// Cancel every live execution.
  pub fn shutdown(&self) {
    self.shutdown.cancel();
  }

  #[instrument(name = "execution", skip(self, deadline, cancel), fields(execution_id = %execution_id))]
  async fn run(
    self: Arc<Self>,
    execution_id: String,
    deadline: Instant,
    cancel: CancellationToken,
  ) -> Result<ExecutionRecord, WorkflowError> {
    self.drive(&execution_id, deadline, &cancel).await;

    self
      .status(&execution_id)
      .ok_or(WorkflowError::ExecutionNotFound { execution_id })
  }

  /// Walk one execution through its stages.
  ///
  /// Every failure path settles the record through `fail`; a failed
  /// `advance` means the record was settled elsewhere and the walk stops.
  /// `cancel` is observed at every suspension point. When it was fired by
  /// [`cancel`](Self::cancel) the record is already settled and the `fail`
  /// here is a no-op; on shutdown it settles the record.
  async fn drive(&self, id: &str, deadline: Instant, cancel: &CancellationToken) {
    if self.advance(id, ExecutionState::Dispatching, |_| {}).is_err() {
      return;
    }

    let Dispatched {
      token,
      task_id,
      pending,
    } = match self.dispatcher.dispatch(id, deadline, cancel).await {
      Ok(dispatched) => dispatched,
      Err(DispatchError::DeadlineElapsed) => {
        let _ = self
          .fail(
            id,
            FailureKind::DeadlineExceeded,
            "deadline elapsed while dispatching",
          )
          .await;
        return;
      }
      Err(DispatchError::Cancelled) => {
        let _ = self.fail(id, FailureKind::Cancelled, CANCELLED).await;
        return;
      }
      Err(e) => {
        let _ = self
          .fail(id, FailureKind::DispatchFailure, e.to_string())
          .await;
        return;
      }
    };

    let awaiting = self.advance(id, ExecutionState::AwaitingCallback, |record| {
      record.token = Some(token.clone());
      record.task_id = Some(task_id);
    });
    if awaiting.is_err() {
      // Settled while the launch was in flight
      self.registry().release(&token).await;
      self.dispatcher.abort(&token).await;
      return;
    }

    let signal = tokio::select! {
      biased;
      _ = cancel.cancelled() => {
        let _ = self.fail(id, FailureKind::Cancelled, CANCELLED).await;
        return;
      }
      signal = self.registry().wait(pending, deadline) => signal,
    };

    let artifact = match signal {
      Ok(CallbackSignal {
        outcome: CallbackOutcome::Success { artifact },
        ..
      }) => artifact,
      Ok(CallbackSignal {
        outcome: CallbackOutcome::Failure { error },
        ..
      }) => {
        let _ = self.fail(id, FailureKind::CallbackFailure, error).await;
        return;
      }
      Err(CallbackError::Timeout { .. }) => {
        let _ = self
          .fail(
            id,
            FailureKind::CallbackTimeout,
            "no callback before deadline",
          )
          .await;
        return;
      }
      Err(CallbackError::Released { .. }) => {
        let _ = self.fail(id, FailureKind::Cancelled, CANCELLED).await;
        return;
      }
      Err(e) => {
        let _ = self
          .fail(id, FailureKind::CallbackFailure, e.to_string())
          .await;
        return;
      }
    };

    let notifying = self.advance(id, ExecutionState::Notifying, |record| {
      record.token = None;
      record.artifact = Some(artifact.clone());
    });
    if notifying.is_err() {
      return;
    }

    let notified = tokio::select! {
      biased;
      _ = cancel.cancelled() => {
        let _ = self.fail(id, FailureKind::Cancelled, CANCELLED).await;
        return;
      }
      notified = tokio::time::timeout_at(deadline, self.invoker.notify(&artifact)) => notified,
    };

    match notified {
      Ok(Ok(())) => {
        let _ = self.advance(id, ExecutionState::Succeeded, |_| {});
      }
      Ok(Err(e)) => {
        let _ = self
          .fail(id, FailureKind::NotifyFailure, e.to_string())
          .await;
      }
      Err(_) => {
        let _ = self
          .fail(
            id,
            FailureKind::DeadlineExceeded,
            "deadline elapsed while notifying",
          )
          .await;
      }
    }
  }

  /// Move a live execution along a non-failure edge.
  fn advance(
    &self,
    execution_id: &str,
    to: ExecutionState,
    update: impl FnOnce(&mut ExecutionRecord),
  ) -> Result<(), WorkflowError> {
    let mut executions = self.executions.lock().unwrap();
    let tracked = executions
      .get_mut(execution_id)
      .ok_or_else(|| WorkflowError::ExecutionNotFound {
        execution_id: execution_id.to_string(),
      })?;

    let from = tracked.record.state;
    if from.is_terminal() {
      return Err(WorkflowError::AlreadyTerminal {
        execution_id: execution_id.to_string(),
        state: from,
      });
    }
    if to == ExecutionState::Failed || !from.can_transition_to(to) {
      return Err(WorkflowError::InvalidTransition {
        execution_id: execution_id.to_string(),
        from,
        to,
      });
    }

    update(&mut tracked.record);
    if to == ExecutionState::Succeeded {
      tracked.record.succeed();
    } else {
      tracked.record.state = to;
    }

    info!(execution_id = %execution_id, from = %from, to = %to, "state_changed");
    self.notifier.notify(ExecutionEvent::StateChanged {
      execution_id: execution_id.to_string(),
      from,
      to,
    });

    if to == ExecutionState::Succeeded
      && let Some(artifact) = tracked.record.artifact.clone()
    {
      info!(execution_id = %execution_id, artifact = %artifact, "execution_succeeded");
      self.notifier.notify(ExecutionEvent::ExecutionSucceeded {
        execution_id: execution_id.to_string(),
        artifact,
      });
    }

    Ok(())
  }

  /// Move a live execution to `Failed`, release its token, and stop the
  /// fetch task behind it.
  async fn fail(
    &self,
    execution_id: &str,
    kind: FailureKind,
    error: impl Into<String>,
  ) -> Result<(), WorkflowError> {
    let error = error.into();

    let token = {
      let mut executions = self.executions.lock().unwrap();
      let tracked =
        executions
          .get_mut(execution_id)
          .ok_or_else(|| WorkflowError::ExecutionNotFound {
            execution_id: execution_id.to_string(),
          })?;

      let from = tracked.record.state;
      if from.is_terminal() {
        return Err(WorkflowError::AlreadyTerminal {
          execution_id: execution_id.to_string(),
          state: from,
        });
      }

      let token = tracked.record.fail(kind, error.clone());

      if kind == FailureKind::Cancelled {
        warn!(execution_id = %execution_id, from = %from, error = %error, "execution_failed");
      } else {
        error!(execution_id = %execution_id, from = %from, kind = %kind, error = %error, "execution_failed");
      }
      self.notifier.notify(ExecutionEvent::StateChanged {
        execution_id: execution_id.to_string(),
        from,
        to: ExecutionState::Failed,
      });
      self.notifier.notify(ExecutionEvent::ExecutionFailed {
        execution_id: execution_id.to_string(),
        kind,
        error,
      });

      token
    };

    // A token registered during dispatch is not on the record yet
    let token = match token {
      Some(token) => {
        self.registry().release(&token).await;
        Some(token)
      }
      None => self.registry().release_execution(execution_id).await,
    };
    if let Some(token) = token {
      self.dispatcher.abort(&token).await;
    }
    Ok(())
  }
}
