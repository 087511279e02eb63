use fetchflow_callback::CallbackError;
use thiserror::Error;

/// Errors that can occur while dispatching a fetch task.
#[derive(Debug, Error)]
pub enum DispatchError {
  /// The executor could not be launched.
  #[error("failed to launch fetch executor: {message}")]
  Launch { message: String },

  /// The token could not be registered.
  #[error("failed to register correlation token")]
  Registration {
    #[source]
    source: CallbackError,
  },

  /// The execution deadline passed before the launch call returned.
  #[error("deadline elapsed while launching fetch executor")]
  DeadlineElapsed,

  /// The execution was cancelled while the launch call was in flight.
  #[error("cancelled while launching fetch executor")]
  Cancelled,
}

impl DispatchError {
  pub fn launch(message: impl Into<String>) -> Self {
    Self::Launch {
      message: message.into(),
    }
  }
}
