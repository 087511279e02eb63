//! Execution states and outcomes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
  Start,
  Dispatching,
  AwaitingCallback,
  Notifying,
  Succeeded,
  Failed,
}

impl ExecutionState {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Succeeded | Self::Failed)
  }

  /// Whether the state machine has an edge from `self` to `next`.
  pub fn can_transition_to(self, next: ExecutionState) -> bool {
    use ExecutionState::*;

    match (self, next) {
      (Start, Dispatching)
      | (Dispatching, AwaitingCallback)
      | (AwaitingCallback, Notifying)
      | (Notifying, Succeeded) => true,
      (from, Failed) => !from.is_terminal(),
      _ => false,
    }
  }
}

impl std::fmt::Display for ExecutionState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Self::Start => "start",
      Self::Dispatching => "dispatching",
      Self::AwaitingCallback => "awaiting_callback",
      Self::Notifying => "notifying",
      Self::Succeeded => "succeeded",
      Self::Failed => "failed",
    };
    f.write_str(name)
  }
}

/// Why an execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  /// The fetch executor could not be launched.
  DispatchFailure,
  /// No callback arrived before the deadline.
  CallbackTimeout,
  /// The executor reported failure.
  CallbackFailure,
  /// The notification step failed or timed out.
  NotifyFailure,
  /// The overall deadline elapsed outside the callback wait.
  DeadlineExceeded,
  /// Cancelled by request or controller shutdown.
  Cancelled,
}

impl std::fmt::Display for FailureKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Self::DispatchFailure => "dispatch_failure",
      Self::CallbackTimeout => "callback_timeout",
      Self::CallbackFailure => "callback_failure",
      Self::NotifyFailure => "notify_failure",
      Self::DeadlineExceeded => "deadline_exceeded",
      Self::Cancelled => "cancelled",
    };
    f.write_str(name)
  }
}

/// Final result of an execution, `Pending` until terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
  Pending,
  Succeeded,
  Failed { kind: FailureKind, error: String },
}

impl Outcome {
  pub fn failure_kind(&self) -> Option<FailureKind> {
    match self {
      Self::Failed { kind, .. } => Some(*kind),
      _ => None,
    }
  }
}
