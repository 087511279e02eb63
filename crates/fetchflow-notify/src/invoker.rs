//! Notification invoker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fetchflow_artifact::ArtifactReference;
use tracing::{error, info, instrument};

use crate::error::NotifyError;

pub type NotifyResult = Result<(), NotifyError>;

/// The stateless notification step.
#[async_trait]
pub trait NotificationStep: Send + Sync {
  async fn send(&self, artifact: &ArtifactReference) -> NotifyResult;
}

/// Calls a [`NotificationStep`] once, bounded by `timeout`.
pub struct NotificationInvoker {
  step: Arc<dyn NotificationStep>,
  timeout: Duration,
}

impl NotificationInvoker {
  pub fn new(step: Arc<dyn NotificationStep>, timeout: Duration) -> Self {
    Self { step, timeout }
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  #[instrument(name = "notify", skip(self), fields(artifact = %artifact))]
  pub async fn notify(&self, artifact: &ArtifactReference) -> NotifyResult {
    let result = match tokio::time::timeout(self.timeout, self.step.send(artifact)).await {
      Ok(result) => result,
      Err(_) => Err(NotifyError::Timeout {
        timeout_ms: self.timeout.as_millis() as u64,
      }),
    };

    match &result {
      Ok(()) => info!("notify_completed"),
      Err(e) => error!(error = %e, "notify_failed"),
    }

    result
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;

  struct RecordingStep {
    seen: Mutex<Vec<ArtifactReference>>,
    delay: Duration,
    fail: bool,
  }

  impl RecordingStep {
    fn new(delay: Duration, fail: bool) -> Self {
      Self {
        seen: Mutex::new(Vec::new()),
        delay,
        fail,
      }
    }
  }

  #[async_trait]
  impl NotificationStep for RecordingStep {
    async fn send(&self, artifact: &ArtifactReference) -> NotifyResult {
      self.seen.lock().unwrap().push(artifact.clone());
      tokio::time::sleep(self.delay).await;
      if self.fail {
        Err(NotifyError::rejected("mailbox unavailable"))
      } else {
        Ok(())
      }
    }
  }

  fn artifact() -> ArtifactReference {
    ArtifactReference::new("arn:aws:s3:::b/2022-07-10/bill.pdf").with_version("3")
  }

  #[tokio::test(start_paused = true)]
  async fn test_notify_passes_artifact_through() {
    let step = Arc::new(RecordingStep::new(Duration::from_millis(10), false));
    let invoker = NotificationInvoker::new(step.clone(), Duration::from_secs(30));

    invoker.notify(&artifact()).await.unwrap();

    assert_eq!(*step.seen.lock().unwrap(), vec![artifact()]);
  }

  #[tokio::test(start_paused = true)]
  async fn test_notify_timeout() {
    let step = Arc::new(RecordingStep::new(Duration::from_secs(45), false));
    let invoker = NotificationInvoker::new(step.clone(), Duration::from_secs(30));

    let err = invoker.notify(&artifact()).await.unwrap_err();
    assert!(matches!(err, NotifyError::Timeout { timeout_ms: 30000 }));
  }

  #[tokio::test(start_paused = true)]
  async fn test_notify_failure_not_retried() {
    let step = Arc::new(RecordingStep::new(Duration::ZERO, true));
    let invoker = NotificationInvoker::new(step.clone(), Duration::from_secs(30));

    let err = invoker.notify(&artifact()).await.unwrap_err();
    assert!(matches!(err, NotifyError::Rejected { .. }));
    assert_eq!(step.seen.lock().unwrap().len(), 1);
  }
}
