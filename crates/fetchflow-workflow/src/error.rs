//! Controller errors.

use crate::state::ExecutionState;

/// Errors returned by controller operations (not execution failures, which
/// are recorded as an [`Outcome`](crate::Outcome)).
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
  #[error("execution '{execution_id}' not found")]
  ExecutionNotFound { execution_id: String },

  /// The execution already reached a terminal state.
  #[error("execution '{execution_id}' already finished as {state}")]
  AlreadyTerminal {
    execution_id: String,
    state: ExecutionState,
  },

  #[error("execution '{execution_id}' cannot move from {from} to {to}")]
  InvalidTransition {
    execution_id: String,
    from: ExecutionState,
    to: ExecutionState,
  },

  #[error("execution task failed: {message}")]
  Join { message: String },
}
