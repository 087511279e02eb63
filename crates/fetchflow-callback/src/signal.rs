//! Completion signals and their wire format.

use fetchflow_artifact::{ArtifactReference, BillReport};
use serde::{Deserialize, Serialize};

use crate::error::CallbackError;
use crate::token::CorrelationToken;

/// What the executor reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
  Success { artifact: ArtifactReference },
  Failure { error: String },
}

/// A completion report for one dispatched task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackSignal {
  pub token: CorrelationToken,
  pub outcome: CallbackOutcome,
}

impl CallbackSignal {
  pub fn success(token: CorrelationToken, artifact: ArtifactReference) -> Self {
    Self {
      token,
      outcome: CallbackOutcome::Success { artifact },
    }
  }

  pub fn failure(token: CorrelationToken, error: impl Into<String>) -> Self {
    Self {
      token,
      outcome: CallbackOutcome::Failure {
        error: error.into(),
      },
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self.outcome, CallbackOutcome::Success { .. })
  }
}

/// JSON form of a signal as sent by the executor.
///
/// ```json
/// { "token": "3f2a...", "success": true, "artifact": { "location": "arn:aws:s3:::b/2022-07-10/bill.pdf" } }
/// { "token": "3f2a...", "success": false, "error": "login form not found" }
/// ```
///
/// A successful report may carry the uploaded [`BillReport`] instead of a
/// bare artifact; its PDF location becomes the artifact reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMessage {
  pub token: CorrelationToken,
  pub success: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub artifact: Option<ArtifactReference>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub report: Option<BillReport>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl SignalMessage {
  /// Parse a single JSON line.
  pub fn parse(line: &str) -> Result<Self, CallbackError> {
    serde_json::from_str(line.trim()).map_err(|e| CallbackError::malformed(e.to_string()))
  }
}

impl TryFrom<SignalMessage> for CallbackSignal {
  type Error = CallbackError;

  fn try_from(message: SignalMessage) -> Result<Self, Self::Error> {
    if !message.success {
      let error = message
        .error
        .unwrap_or_else(|| "executor reported failure".to_string());
      return Ok(CallbackSignal::failure(message.token, error));
    }

    let artifact = message
      .artifact
      .or_else(|| message.report.as_ref().map(BillReport::artifact_reference))
      .ok_or_else(|| {
        CallbackError::malformed(format!(
          "success signal for token '{}' carries no artifact",
          message.token
        ))
      })?;

    Ok(CallbackSignal::success(message.token, artifact))
  }
}

impl From<CallbackSignal> for SignalMessage {
  fn from(signal: CallbackSignal) -> Self {
    match signal.outcome {
      CallbackOutcome::Success { artifact } => SignalMessage {
        token: signal.token,
        success: true,
        artifact: Some(artifact),
        report: None,
        error: None,
      },
      CallbackOutcome::Failure { error } => SignalMessage {
        token: signal.token,
        success: false,
        artifact: None,
        report: None,
        error: Some(error),
      },
    }
  }
}
