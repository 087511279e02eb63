//! Integration tests for WorkflowController.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fetchflow_artifact::{ArtifactDestination, ArtifactReference};
use fetchflow_callback::{
  CallbackError, CallbackRegistry, CallbackSignal, CorrelationToken, InMemoryRegistry,
};
use fetchflow_dispatch::{
  DispatchError, FetchExecutor, LaunchReceipt, LaunchRequest, TaskDispatcher,
};
use fetchflow_notify::{NotificationInvoker, NotificationStep, NotifyError, NotifyResult};
use fetchflow_workflow::{
  ChannelNotifier, ControllerConfig, ExecutionEvent, ExecutionState, FailureKind, Outcome,
  WorkflowController, WorkflowError,
};
use tokio::sync::mpsc;

/// Hands every launch request to the test.
struct ChannelExecutor {
  launches: mpsc::UnboundedSender<LaunchRequest>,
}

#[async_trait]
impl FetchExecutor for ChannelExecutor {
  async fn launch(&self, request: LaunchRequest) -> Result<LaunchReceipt, DispatchError> {
    let task_id = format!("task-{}", request.execution_id);
    self
      .launches
      .send(request)
      .map_err(|_| DispatchError::launch("test dropped the launch receiver"))?;
    Ok(LaunchReceipt { task_id })
  }
}

/// Hands launches to the test, takes `delay` to return, and records aborts.
struct TrackingExecutor {
  launches: mpsc::UnboundedSender<LaunchRequest>,
  delay: Duration,
  aborted: Mutex<Vec<CorrelationToken>>,
}

impl TrackingExecutor {
  fn new(delay: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<LaunchRequest>) {
    let (launches, receiver) = mpsc::unbounded_channel();
    let executor = Arc::new(Self {
      launches,
      delay,
      aborted: Mutex::new(Vec::new()),
    });
    (executor, receiver)
  }

  fn aborted(&self) -> Vec<CorrelationToken> {
    self.aborted.lock().unwrap().clone()
  }
}

#[async_trait]
impl FetchExecutor for TrackingExecutor {
  async fn launch(&self, request: LaunchRequest) -> Result<LaunchReceipt, DispatchError> {
    let task_id = format!("task-{}", request.execution_id);
    let _ = self.launches.send(request);
    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }
    Ok(LaunchReceipt { task_id })
  }

  async fn abort(&self, token: &CorrelationToken) {
    self.aborted.lock().unwrap().push(token.clone());
  }
}

struct FailingExecutor;

#[async_trait]
impl FetchExecutor for FailingExecutor {
  async fn launch(&self, _request: LaunchRequest) -> Result<LaunchReceipt, DispatchError> {
    Err(DispatchError::launch("cluster has no capacity"))
  }
}

struct HangingExecutor;

#[async_trait]
impl FetchExecutor for HangingExecutor {
  async fn launch(&self, _request: LaunchRequest) -> Result<LaunchReceipt, DispatchError> {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    Ok(LaunchReceipt {
      task_id: "never".to_string(),
    })
  }
}

#[derive(Default)]
struct FakeStep {
  delay: Duration,
  reject: Option<String>,
  seen: Mutex<Vec<ArtifactReference>>,
}

impl FakeStep {
  fn ok() -> Self {
    Self::default()
  }

  fn rejecting(message: &str) -> Self {
    Self {
      reject: Some(message.to_string()),
      ..Self::default()
    }
  }

  fn slow(delay: Duration) -> Self {
    Self {
      delay,
      ..Self::default()
    }
  }

  fn seen(&self) -> Vec<ArtifactReference> {
    self.seen.lock().unwrap().clone()
  }
}

#[async_trait]
impl NotificationStep for FakeStep {
  async fn send(&self, artifact: &ArtifactReference) -> NotifyResult {
    self.seen.lock().unwrap().push(artifact.clone());
    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }
    match &self.reject {
      Some(message) => Err(NotifyError::rejected(message.clone())),
      None => Ok(()),
    }
  }
}

struct Harness {
  controller: Arc<WorkflowController>,
  registry: Arc<InMemoryRegistry>,
  step: Arc<FakeStep>,
  launches: mpsc::UnboundedReceiver<LaunchRequest>,
  events: mpsc::UnboundedReceiver<ExecutionEvent>,
}

impl Harness {
  fn new(step: FakeStep) -> Self {
    Self::build(None, step, Duration::from_secs(60), Duration::from_secs(30))
  }

  fn with_timeouts(step: FakeStep, execution: Duration, notify: Duration) -> Self {
    Self::build(None, step, execution, notify)
  }

  fn with_executor(executor: Arc<dyn FetchExecutor>) -> Self {
    Self::build(
      Some(executor),
      FakeStep::ok(),
      Duration::from_secs(60),
      Duration::from_secs(30),
    )
  }

  fn build(
    executor: Option<Arc<dyn FetchExecutor>>,
    step: FakeStep,
    execution_timeout: Duration,
    notify_timeout: Duration,
  ) -> Self {
    let (launch_tx, launches) = mpsc::unbounded_channel();
    let (event_tx, events) = mpsc::unbounded_channel();
    let executor: Arc<dyn FetchExecutor> = match executor {
      Some(executor) => executor,
      None => Arc::new(ChannelExecutor {
        launches: launch_tx,
      }),
    };

    let registry = Arc::new(InMemoryRegistry::new());
    let step = Arc::new(step);
    let dispatcher = TaskDispatcher::new(
      executor,
      registry.clone(),
      ArtifactDestination::new("bill-fetcher-bucket").with_prefix("bills"),
    );
    let invoker = NotificationInvoker::new(step.clone(), notify_timeout);
    let controller = WorkflowController::new(
      dispatcher,
      invoker,
      ControllerConfig { execution_timeout },
    )
    .with_notifier(Arc::new(ChannelNotifier::new(event_tx)));

    Self {
      controller: Arc::new(controller),
      registry,
      step,
      launches,
      events,
    }
  }

  fn drain_events(&mut self) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = self.events.try_recv() {
      events.push(event);
    }
    events
  }

  async fn wait_for_state(&self, execution_id: &str, state: ExecutionState) {
    for _ in 0..100 {
      if let Some(record) = self.controller.status(execution_id)
        && record.state == state
      {
        return;
      }
      tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("execution {execution_id} never reached {state}");
  }
}

fn artifact_for(request: &LaunchRequest) -> ArtifactReference {
  ArtifactReference::new(format!(
    "arn:aws:s3:::bill-fetcher-bucket/bills/{}.pdf",
    request.execution_id
  ))
  .with_version("v1")
}

fn transitions(events: &[ExecutionEvent]) -> Vec<(ExecutionState, ExecutionState)> {
  events
    .iter()
    .filter_map(|event| match event {
      ExecutionEvent::StateChanged { from, to, .. } => Some((*from, *to)),
      _ => None,
    })
    .collect()
}

#[tokio::test(start_paused = true)]
async fn test_success_propagates_artifact_to_notify() {
  let mut h = Harness::new(FakeStep::ok());
  let handle = h.controller.trigger();

  let launch = h.launches.recv().await.unwrap();
  assert_eq!(launch.execution_id, handle.execution_id());
  let artifact = artifact_for(&launch);

  let resolved = h
    .registry
    .resolve(CallbackSignal::success(launch.token.clone(), artifact.clone()))
    .await
    .unwrap();
  assert_eq!(resolved, handle.execution_id());

  let record = handle.wait().await.unwrap();
  assert_eq!(record.state, ExecutionState::Succeeded);
  assert_eq!(record.outcome, Outcome::Succeeded);
  assert_eq!(record.artifact.as_ref(), Some(&artifact));
  assert_eq!(record.task_id.as_deref(), Some(format!("task-{}", record.execution_id).as_str()));
  assert!(record.completed_at.is_some());
  assert_eq!(h.step.seen(), vec![artifact.clone()]);
  assert_eq!(h.registry.outstanding().await, 0);

  let events = h.drain_events();
  assert!(matches!(events[0], ExecutionEvent::ExecutionStarted { .. }));
  assert_eq!(
    transitions(&events),
    vec![
      (ExecutionState::Start, ExecutionState::Dispatching),
      (ExecutionState::Dispatching, ExecutionState::AwaitingCallback),
      (ExecutionState::AwaitingCallback, ExecutionState::Notifying),
      (ExecutionState::Notifying, ExecutionState::Succeeded),
    ]
  );
  assert_eq!(
    events.last(),
    Some(&ExecutionEvent::ExecutionSucceeded {
      execution_id: record.execution_id.clone(),
      artifact,
    })
  );
}

#[tokio::test(start_paused = true)]
async fn test_missing_callback_times_out() {
  let mut h = Harness::new(FakeStep::ok());
  let handle = h.controller.trigger();
  let launch = h.launches.recv().await.unwrap();

  let record = handle.wait().await.unwrap();
  assert_eq!(record.state, ExecutionState::Failed);
  assert_eq!(
    record.outcome.failure_kind(),
    Some(FailureKind::CallbackTimeout)
  );
  assert_eq!(h.registry.outstanding().await, 0);

  let late = h
    .registry
    .resolve(CallbackSignal::success(launch.token.clone(), artifact_for(&launch)))
    .await;
  assert!(matches!(late, Err(CallbackError::UnknownToken { .. })));

  let after = h.controller.status(&record.execution_id).unwrap();
  assert_eq!(after, record);
  assert!(h.step.seen().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failure_signal_skips_notify() {
  let mut h = Harness::new(FakeStep::ok());
  let handle = h.controller.trigger();
  let launch = h.launches.recv().await.unwrap();

  h.registry
    .resolve(CallbackSignal::failure(launch.token, "portal login rejected"))
    .await
    .unwrap();

  let record = handle.wait().await.unwrap();
  match &record.outcome {
    Outcome::Failed { kind, error } => {
      assert_eq!(*kind, FailureKind::CallbackFailure);
      assert_eq!(error, "portal login rejected");
    }
    other => panic!("expected failure, got {other:?}"),
  }
  assert!(h.step.seen().is_empty());
  assert!(record.artifact.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_notify_fails_execution() {
  let mut h = Harness::new(FakeStep::rejecting("no subscribers"));
  let handle = h.controller.trigger();
  let launch = h.launches.recv().await.unwrap();
  let artifact = artifact_for(&launch);

  h.registry
    .resolve(CallbackSignal::success(launch.token, artifact.clone()))
    .await
    .unwrap();

  let record = handle.wait().await.unwrap();
  assert_eq!(
    record.outcome.failure_kind(),
    Some(FailureKind::NotifyFailure)
  );
  // Artifact was recorded before the notify step ran
  assert_eq!(record.artifact, Some(artifact.clone()));
  assert_eq!(h.step.seen(), vec![artifact]);
}

#[tokio::test(start_paused = true)]
async fn test_notify_sub_timeout_fails_execution() {
  let mut h = Harness::with_timeouts(
    FakeStep::slow(Duration::from_secs(10)),
    Duration::from_secs(60),
    Duration::from_secs(5),
  );
  let handle = h.controller.trigger();
  let launch = h.launches.recv().await.unwrap();

  h.registry
    .resolve(CallbackSignal::success(launch.token.clone(), artifact_for(&launch)))
    .await
    .unwrap();

  let record = handle.wait().await.unwrap();
  match &record.outcome {
    Outcome::Failed { kind, error } => {
      assert_eq!(*kind, FailureKind::NotifyFailure);
      assert!(error.contains("5000"), "unexpected error: {error}");
    }
    other => panic!("expected failure, got {other:?}"),
  }
}

#[tokio::test(start_paused = true)]
async fn test_deadline_during_notify_is_deadline_exceeded() {
  let mut h = Harness::with_timeouts(
    FakeStep::slow(Duration::from_secs(4)),
    Duration::from_secs(10),
    Duration::from_secs(5),
  );
  let handle = h.controller.trigger();
  let launch = h.launches.recv().await.unwrap();

  tokio::time::sleep(Duration::from_secs(8)).await;
  h.registry
    .resolve(CallbackSignal::success(launch.token.clone(), artifact_for(&launch)))
    .await
    .unwrap();

  let record = handle.wait().await.unwrap();
  assert_eq!(
    record.outcome.failure_kind(),
    Some(FailureKind::DeadlineExceeded)
  );
  assert_eq!(h.step.seen().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_failure_leaves_no_token() {
  let mut h = Harness::with_executor(Arc::new(FailingExecutor));
  let handle = h.controller.trigger();

  let record = handle.wait().await.unwrap();
  match &record.outcome {
    Outcome::Failed { kind, error } => {
      assert_eq!(*kind, FailureKind::DispatchFailure);
      assert!(error.contains("cluster has no capacity"));
    }
    other => panic!("expected failure, got {other:?}"),
  }
  assert_eq!(h.registry.outstanding().await, 0);
  assert!(h.step.seen().is_empty());

  let events = h.drain_events();
  assert_eq!(
    transitions(&events),
    vec![
      (ExecutionState::Start, ExecutionState::Dispatching),
      (ExecutionState::Dispatching, ExecutionState::Failed),
    ]
  );
}

#[tokio::test(start_paused = true)]
async fn test_hanging_launch_hits_deadline() {
  let h = Harness::with_executor(Arc::new(HangingExecutor));
  let handle = h.controller.trigger();

  let record = handle.wait().await.unwrap();
  assert_eq!(
    record.outcome.failure_kind(),
    Some(FailureKind::DeadlineExceeded)
  );
  assert_eq!(h.registry.outstanding().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_releases_token() {
  let mut h = Harness::new(FakeStep::ok());
  let handle = h.controller.trigger();
  let execution_id = handle.execution_id().to_string();
  let launch = h.launches.recv().await.unwrap();
  h.wait_for_state(&execution_id, ExecutionState::AwaitingCallback)
    .await;

  h.controller.cancel(&execution_id).await.unwrap();

  let record = h.controller.status(&execution_id).unwrap();
  assert_eq!(record.outcome.failure_kind(), Some(FailureKind::Cancelled));
  assert!(!h.registry.is_outstanding(&launch.token).await);

  let late = h
    .registry
    .resolve(CallbackSignal::success(launch.token.clone(), artifact_for(&launch)))
    .await;
  assert!(matches!(late, Err(CallbackError::UnknownToken { .. })));

  let again = h.controller.cancel(&execution_id).await;
  assert!(matches!(
    again,
    Err(WorkflowError::AlreadyTerminal {
      state: ExecutionState::Failed,
      ..
    })
  ));

  let finished = handle.wait().await.unwrap();
  assert_eq!(finished, record);
  assert!(h.step.seen().is_empty());

  let terminal = h
    .drain_events()
    .into_iter()
    .filter(ExecutionEvent::is_terminal)
    .count();
  assert_eq!(terminal, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_live_executions() {
  let mut h = Harness::new(FakeStep::ok());
  let first = h.controller.trigger();
  let second = h.controller.trigger();
  h.launches.recv().await.unwrap();
  h.launches.recv().await.unwrap();

  h.controller.shutdown();

  for handle in [first, second] {
    let record = handle.wait().await.unwrap();
    assert_eq!(record.outcome.failure_kind(), Some(FailureKind::Cancelled));
  }
  assert_eq!(h.registry.outstanding().await, 0);
}

#[tokio::test]
async fn test_cancel_unknown_execution() {
  let h = Harness::new(FakeStep::ok());
  let result = h.controller.cancel("missing").await;
  assert!(matches!(
    result,
    Err(WorkflowError::ExecutionNotFound { .. })
  ));
  assert!(h.controller.status("missing").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_token_changes_nothing() {
  let mut h = Harness::new(FakeStep::ok());
  let handle = h.controller.trigger();
  let execution_id = handle.execution_id().to_string();
  let launch = h.launches.recv().await.unwrap();
  h.wait_for_state(&execution_id, ExecutionState::AwaitingCallback)
    .await;
  let before = h.controller.status(&execution_id).unwrap();
  h.drain_events();

  let stray = h
    .registry
    .resolve(CallbackSignal::success(
      CorrelationToken::mint(),
      artifact_for(&launch),
    ))
    .await;
  assert!(matches!(stray, Err(CallbackError::UnknownToken { .. })));
  assert_eq!(h.controller.status(&execution_id).unwrap(), before);
  assert!(h.drain_events().is_empty());

  h.registry
    .resolve(CallbackSignal::success(launch.token.clone(), artifact_for(&launch)))
    .await
    .unwrap();
  let record = handle.wait().await.unwrap();
  assert_eq!(record.outcome, Outcome::Succeeded);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_signal_after_success_is_rejected() {
  let mut h = Harness::new(FakeStep::ok());
  let handle = h.controller.trigger();
  let launch = h.launches.recv().await.unwrap();
  let signal = CallbackSignal::success(launch.token.clone(), artifact_for(&launch));

  h.registry.resolve(signal.clone()).await.unwrap();
  let record = handle.wait().await.unwrap();
  assert_eq!(record.outcome, Outcome::Succeeded);

  let duplicate = h.registry.resolve(signal).await;
  assert!(matches!(duplicate, Err(CallbackError::UnknownToken { .. })));
  assert_eq!(h.controller.status(&record.execution_id).unwrap(), record);
  assert_eq!(h.step.seen().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_executions_are_independent() {
  let mut h = Harness::new(FakeStep::ok());
  let handles: Vec<_> = (0..5).map(|_| h.controller.trigger()).collect();

  let mut launches = Vec::new();
  for _ in 0..5 {
    launches.push(h.launches.recv().await.unwrap());
  }

  let mut tokens: Vec<_> = launches.iter().map(|l| l.token.clone()).collect();
  tokens.sort_by(|a, b| a.as_str().cmp(b.as_str()));
  tokens.dedup();
  assert_eq!(tokens.len(), 5);

  // Fail one of them, resolve the rest in reverse order
  let (failed, rest) = launches.split_first().unwrap();
  h.registry
    .resolve(CallbackSignal::failure(failed.token.clone(), "timeout on portal"))
    .await
    .unwrap();
  for launch in rest.iter().rev() {
    h.registry
      .resolve(CallbackSignal::success(launch.token.clone(), artifact_for(launch)))
      .await
      .unwrap();
  }

  for handle in handles {
    let record = handle.wait().await.unwrap();
    let launch = launches
      .iter()
      .find(|l| l.execution_id == record.execution_id)
      .unwrap();
    if launch.token == failed.token {
      assert_eq!(
        record.outcome.failure_kind(),
        Some(FailureKind::CallbackFailure)
      );
    } else {
      assert_eq!(record.outcome, Outcome::Succeeded);
      assert_eq!(record.artifact, Some(artifact_for(launch)));
    }
  }

  assert_eq!(h.controller.executions().len(), 5);
  assert_eq!(h.step.seen().len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_signal_racing_deadline_settles_once() {
  for _ in 0..25 {
    let mut h = Harness::with_timeouts(
      FakeStep::ok(),
      Duration::from_millis(20),
      Duration::from_millis(10),
    );
    let started = tokio::time::Instant::now();
    let handle = h.controller.trigger();
    let launch = h.launches.recv().await.unwrap();

    tokio::time::sleep_until(started + Duration::from_millis(20)).await;
    let resolved = h
      .registry
      .resolve(CallbackSignal::success(launch.token.clone(), artifact_for(&launch)))
      .await;

    let record = handle.wait().await.unwrap();
    assert!(record.is_terminal());
    match resolved {
      Ok(_) => assert_ne!(
        record.outcome.failure_kind(),
        Some(FailureKind::CallbackTimeout)
      ),
      Err(CallbackError::UnknownToken { .. }) => assert_eq!(
        record.outcome.failure_kind(),
        Some(FailureKind::CallbackTimeout)
      ),
      Err(e) => panic!("unexpected resolve error: {e}"),
    }

    let terminal = h
      .drain_events()
      .into_iter()
      .filter(ExecutionEvent::is_terminal)
      .count();
    assert_eq!(terminal, 1);
    assert_eq!(h.registry.outstanding().await, 0);
  }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_dispatch_releases_token() {
  let (executor, mut launches) = TrackingExecutor::new(Duration::from_secs(5));
  let h = Harness::with_executor(executor.clone());
  let handle = h.controller.trigger();
  let execution_id = handle.execution_id().to_string();

  // The launch call is still in flight
  let launch = launches.recv().await.unwrap();
  assert_eq!(
    h.controller.status(&execution_id).unwrap().state,
    ExecutionState::Dispatching
  );
  assert!(h.registry.is_outstanding(&launch.token).await);

  h.controller.cancel(&execution_id).await.unwrap();

  assert!(!h.registry.is_outstanding(&launch.token).await);
  let late = h
    .registry
    .resolve(CallbackSignal::success(launch.token.clone(), artifact_for(&launch)))
    .await;
  assert!(matches!(late, Err(CallbackError::UnknownToken { .. })));
  assert!(executor.aborted().contains(&launch.token));

  let record = handle.wait().await.unwrap();
  assert_eq!(record.outcome.failure_kind(), Some(FailureKind::Cancelled));
  assert!(record.task_id.is_none());
  assert_eq!(h.registry.outstanding().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_callback_timeout_aborts_task() {
  let (executor, mut launches) = TrackingExecutor::new(Duration::ZERO);
  let h = Harness::with_executor(executor.clone());
  let handle = h.controller.trigger();
  let launch = launches.recv().await.unwrap();

  let record = handle.wait().await.unwrap();
  assert_eq!(
    record.outcome.failure_kind(),
    Some(FailureKind::CallbackTimeout)
  );
  assert_eq!(executor.aborted(), vec![launch.token]);
}

#[tokio::test(start_paused = true)]
async fn test_success_does_not_abort_task() {
  let (executor, mut launches) = TrackingExecutor::new(Duration::ZERO);
  let h = Harness::with_executor(executor.clone());
  let handle = h.controller.trigger();
  let launch = launches.recv().await.unwrap();

  h.registry
    .resolve(CallbackSignal::success(launch.token.clone(), artifact_for(&launch)))
    .await
    .unwrap();

  let record = handle.wait().await.unwrap();
  assert_eq!(record.outcome, Outcome::Succeeded);
  assert!(executor.aborted().is_empty());
}
