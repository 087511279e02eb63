use thiserror::Error;

use crate::token::CorrelationToken;

/// Errors raised by the callback registry and the inbound signal path.
#[derive(Debug, Error)]
pub enum CallbackError {
  /// No outstanding registration for this token (never issued, already
  /// resolved, expired, or released).
  #[error("unknown correlation token '{token}'")]
  UnknownToken { token: CorrelationToken },

  /// The token is already registered.
  #[error("correlation token '{token}' is already registered")]
  DuplicateToken { token: CorrelationToken },

  /// The execution already has an outstanding token.
  #[error("execution '{execution_id}' already awaits token '{token}'")]
  AlreadyAwaiting {
    execution_id: String,
    token: CorrelationToken,
  },

  /// The deadline passed before a signal arrived.
  #[error("timed out waiting for callback on token '{token}'")]
  Timeout { token: CorrelationToken },

  /// The registration was released (e.g. by cancellation) while waiting.
  #[error("callback for token '{token}' was released")]
  Released { token: CorrelationToken },

  /// An inbound report could not be turned into a signal.
  #[error("malformed signal: {message}")]
  MalformedSignal { message: String },
}

impl CallbackError {
  pub fn malformed(message: impl Into<String>) -> Self {
    Self::MalformedSignal {
      message: message.into(),
    }
  }
}
