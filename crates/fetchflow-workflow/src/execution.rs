//! Per-execution bookkeeping.

use chrono::{DateTime, Utc};
use fetchflow_artifact::ArtifactReference;
use fetchflow_callback::CorrelationToken;
use serde::{Deserialize, Serialize};

use crate::state::{ExecutionState, FailureKind, Outcome};

/// Observable state of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
  pub execution_id: String,
  pub state: ExecutionState,
  pub outcome: Outcome,
  pub started_at: DateTime<Utc>,
  pub deadline_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub completed_at: Option<DateTime<Utc>>,
  /// Executor-side id of the fetch task, once dispatched.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_id: Option<String>,
  /// Set once the fetch stage reports success.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub artifact: Option<ArtifactReference>,
  /// Outstanding token. Not exposed: holding it is enough to resolve.
  #[serde(skip)]
  pub(crate) token: Option<CorrelationToken>,
}

impl ExecutionRecord {
  pub(crate) fn new(
    execution_id: String,
    started_at: DateTime<Utc>,
    deadline_at: DateTime<Utc>,
  ) -> Self {
    Self {
      execution_id,
      state: ExecutionState::Start,
      outcome: Outcome::Pending,
      started_at,
      deadline_at,
      completed_at: None,
      task_id: None,
      artifact: None,
      token: None,
    }
  }

  pub fn is_terminal(&self) -> bool {
    self.state.is_terminal()
  }

  pub(crate) fn succeed(&mut self) {
    self.state = ExecutionState::Succeeded;
    self.outcome = Outcome::Succeeded;
    self.completed_at = Some(Utc::now());
    self.token = None;
  }

  /// Mark failed and hand back the token that must be released.
  pub(crate) fn fail(&mut self, kind: FailureKind, error: String) -> Option<CorrelationToken> {
    self.state = ExecutionState::Failed;
    self.outcome = Outcome::Failed { kind, error };
    self.completed_at = Some(Utc::now());
    self.token.take()
  }
}
