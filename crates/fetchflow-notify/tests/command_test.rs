//! Integration tests for CommandNotifier.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use fetchflow_artifact::ArtifactReference;
use fetchflow_config::CommandDef;
use fetchflow_notify::{CommandNotifier, NotificationInvoker, NotificationStep, NotifyError};

fn artifact() -> ArtifactReference {
  ArtifactReference::new("arn:aws:s3:::bill-fetcher-bucket/2022-07-10/bill.pdf")
}

#[tokio::test]
async fn test_step_receives_artifact_on_stdin() {
  let dir = tempfile::tempdir().unwrap();
  let out = dir.path().join("payload.json");
  let script = format!("cat > {}", out.display());
  let notifier = CommandNotifier::new(CommandDef::new("sh").with_args(["-c", script.as_str()]));

  notifier.send(&artifact()).await.unwrap();

  let written: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
  assert_eq!(
    written["artifact_reference"]["location"],
    "arn:aws:s3:::bill-fetcher-bucket/2022-07-10/bill.pdf"
  );
}

#[tokio::test]
async fn test_step_sees_location_in_env() {
  let notifier = CommandNotifier::new(CommandDef::new("sh").with_args([
    "-c",
    r#"test "$ARTIFACT_LOCATION" = "arn:aws:s3:::bill-fetcher-bucket/2022-07-10/bill.pdf""#,
  ]));

  notifier.send(&artifact()).await.unwrap();
}

#[tokio::test]
async fn test_nonzero_exit_is_rejection_with_stderr() {
  let notifier = CommandNotifier::new(
    CommandDef::new("sh").with_args(["-c", "cat >/dev/null; echo 'identity not verified' >&2; exit 1"]),
  );

  let err = notifier.send(&artifact()).await.unwrap_err();
  match err {
    NotifyError::Rejected { message } => assert_eq!(message, "identity not verified"),
    other => panic!("expected rejection, got {:?}", other),
  }
}

#[tokio::test]
async fn test_missing_program_is_transport_error() {
  let notifier = CommandNotifier::new(CommandDef::new("/nonexistent/send-bill"));

  let err = notifier.send(&artifact()).await.unwrap_err();
  assert!(matches!(err, NotifyError::Transport { .. }));
}

#[tokio::test]
async fn test_slow_step_hits_invoker_timeout() {
  let notifier = CommandNotifier::new(CommandDef::new("sh").with_args(["-c", "sleep 5"]));
  let invoker = NotificationInvoker::new(Arc::new(notifier), Duration::from_millis(100));

  let err = invoker.notify(&artifact()).await.unwrap_err();
  assert!(matches!(err, NotifyError::Timeout { timeout_ms: 100 }));
}
