use thiserror::Error;

/// Ways a notify invocation can fail.
#[derive(Debug, Error)]
pub enum NotifyError {
  /// The step could not be reached or started.
  #[error("notification transport failed: {message}")]
  Transport { message: String },

  /// The step did not finish within the notify timeout.
  #[error("notification timed out after {timeout_ms}ms")]
  Timeout { timeout_ms: u64 },

  /// The step ran and reported failure.
  #[error("notification rejected: {message}")]
  Rejected { message: String },
}

impl NotifyError {
  pub fn transport(message: impl Into<String>) -> Self {
    Self::Transport {
      message: message.into(),
    }
  }

  pub fn rejected(message: impl Into<String>) -> Self {
    Self::Rejected {
      message: message.into(),
    }
  }
}
