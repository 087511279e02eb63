//! Execution events and notifiers for observability.
//!
//! The controller emits one event per state change so consumers can persist
//! history, stream progress, or assert on ordering in tests.

use fetchflow_artifact::ArtifactReference;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::state::{ExecutionState, FailureKind};

/// Events emitted during an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
  /// An execution was triggered.
  ExecutionStarted { execution_id: String },

  /// The execution moved between states.
  StateChanged {
    execution_id: String,
    from: ExecutionState,
    to: ExecutionState,
  },

  /// The notification step accepted the artifact.
  ExecutionSucceeded {
    execution_id: String,
    artifact: ArtifactReference,
  },

  /// The execution reached `Failed`.
  ExecutionFailed {
    execution_id: String,
    kind: FailureKind,
    error: String,
  },
}

impl ExecutionEvent {
  pub fn execution_id(&self) -> &str {
    match self {
      Self::ExecutionStarted { execution_id }
      | Self::StateChanged { execution_id, .. }
      | Self::ExecutionSucceeded { execution_id, .. }
      | Self::ExecutionFailed { execution_id, .. } => execution_id,
    }
  }

  /// Whether this event reports a terminal outcome.
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      Self::ExecutionSucceeded { .. } | Self::ExecutionFailed { .. }
    )
  }
}

/// Receives execution events.
///
/// Called synchronously from the controller; implementations must not block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Forwards events to an unbounded channel.
///
/// Unbounded so a slow consumer never stalls an execution; volume is a
/// handful of events per execution.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
