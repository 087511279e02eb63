//! Pipeline runner with channel-based signal delivery.
//!
//! The `PipelineRunner` owns the mpsc channel that completion reports arrive
//! on and resolves each one against the controller's callback registry.

use std::sync::Arc;

use fetchflow_callback::{CallbackError, CallbackSignal, SignalMessage};
use fetchflow_workflow::{ExecutionHandle, WorkflowController};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::EngineError;

/// Feeds inbound completion signals to a [`WorkflowController`].
///
/// # Usage
///
/// ```ignore
/// let runner = PipelineRunner::new(controller);
///
/// // Hand senders to whatever receives executor reports
/// let sender = runner.signal_sender();
///
/// // Start the delivery loop
/// let cancel = CancellationToken::new();
/// runner.start(cancel).await?;
/// ```
pub struct PipelineRunner {
  sender: mpsc::Sender<SignalMessage>,
  receiver: mpsc::Receiver<SignalMessage>,
  controller: Arc<WorkflowController>,
}

impl PipelineRunner {
  pub fn new(controller: Arc<WorkflowController>) -> Self {
    Self::with_buffer_size(controller, 100)
  }

  pub fn with_buffer_size(controller: Arc<WorkflowController>, buffer_size: usize) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self::with_channel(controller, sender, receiver)
  }

  /// Use an existing channel.
  ///
  /// Needed when an executor must hold the sender before the controller it
  /// feeds has been built.
  pub fn with_channel(
    controller: Arc<WorkflowController>,
    sender: mpsc::Sender<SignalMessage>,
    receiver: mpsc::Receiver<SignalMessage>,
  ) -> Self {
    Self {
      sender,
      receiver,
      controller,
    }
  }

  pub fn signal_sender(&self) -> mpsc::Sender<SignalMessage> {
    self.sender.clone()
  }

  /// Queue a signal for delivery by the loop.
  pub async fn signal(&self, message: SignalMessage) -> Result<(), EngineError> {
    self
      .sender
      .send(message)
      .await
      .map_err(|_| EngineError::ChannelClosed)
  }

  /// Start a new execution.
  pub fn trigger(&self) -> ExecutionHandle {
    self.controller.trigger()
  }

  pub fn controller(&self) -> &Arc<WorkflowController> {
    &self.controller
  }

  /// Run the delivery loop until cancelled or every sender is gone.
  pub async fn start(mut self, cancel: CancellationToken) -> Result<(), EngineError> {
    info!("starting pipeline runner");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("pipeline runner cancelled");
          break;
        }
        message = self.receiver.recv() => {
          match message {
            Some(message) => {
              let token = message.token.clone();
              match deliver(&self.controller, message).await {
                Ok(execution_id) => {
                  info!(token = %token, execution_id = %execution_id, "signal_delivered");
                }
                Err(e) => {
                  warn!(token = %token, error = %e, "signal_rejected");
                }
              }
            }
            None => {
              info!("pipeline runner channel closed");
              break;
            }
          }
        }
      }
    }

    Ok(())
  }
}

/// Resolve one wire message, returning the execution it settled.
async fn deliver(
  controller: &WorkflowController,
  message: SignalMessage,
) -> Result<String, CallbackError> {
  let signal = CallbackSignal::try_from(message)?;
  controller.registry().resolve(signal).await
}
