//! Callback registry trait.

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::CallbackError;
use crate::signal::CallbackSignal;
use crate::token::CorrelationToken;

/// The receiving half of a registration.
///
/// Returned by [`CallbackRegistry::register`] and consumed by
/// [`CallbackRegistry::wait`]. A signal resolved before anyone waits is held
/// here until the wait begins.
#[derive(Debug)]
pub struct PendingCallback {
  token: CorrelationToken,
  receiver: oneshot::Receiver<CallbackSignal>,
}

impl PendingCallback {
  pub fn new(token: CorrelationToken, receiver: oneshot::Receiver<CallbackSignal>) -> Self {
    Self { token, receiver }
  }

  pub fn token(&self) -> &CorrelationToken {
    &self.token
  }

  pub fn into_parts(self) -> (CorrelationToken, oneshot::Receiver<CallbackSignal>) {
    (self.token, self.receiver)
  }
}

/// Table of outstanding correlation tokens.
///
/// Implementations must make the lookup-and-remove in [`resolve`] and
/// [`release`] atomic with respect to each other: for any token, at most one
/// of them returns success, and once either has, the token is never honored
/// again.
///
/// [`resolve`]: CallbackRegistry::resolve
/// [`release`]: CallbackRegistry::release
#[async_trait]
pub trait CallbackRegistry: Send + Sync {
  /// Register `token` as awaited by `execution_id`.
  ///
  /// Fails if the token is already registered or the execution already has
  /// an outstanding token.
  async fn register(
    &self,
    token: CorrelationToken,
    execution_id: &str,
  ) -> Result<PendingCallback, CallbackError>;

  /// Deliver a signal to whoever registered its token.
  ///
  /// Returns the id of the execution the signal was delivered to. Fails with
  /// [`CallbackError::UnknownToken`] when the token is not outstanding; the
  /// registry is left untouched in that case.
  async fn resolve(&self, signal: CallbackSignal) -> Result<String, CallbackError>;

  /// Drop the registration for `token`. Returns `true` if this call removed
  /// it, `false` if it was already gone.
  async fn release(&self, token: &CorrelationToken) -> bool;

  /// Drop whatever token `execution_id` has outstanding and return it.
  ///
  /// Covers the window where a token is registered but its owner has not
  /// learned it yet.
  async fn release_execution(&self, execution_id: &str) -> Option<CorrelationToken>;

  /// Whether `token` is still outstanding.
  async fn is_outstanding(&self, token: &CorrelationToken) -> bool;

  /// Number of outstanding tokens.
  async fn outstanding(&self) -> usize;

  /// Wait for the signal of `pending` until `deadline`.
  ///
  /// The timer and the signal race; whichever removes the token from the
  /// table first wins. If the timer fires but `resolve` already took the
  /// token, the resolved signal is returned, so a signal acknowledged to the
  /// executor is never dropped.
  async fn wait(
    &self,
    pending: PendingCallback,
    deadline: Instant,
  ) -> Result<CallbackSignal, CallbackError> {
    let (token, mut receiver) = pending.into_parts();

    match tokio::time::timeout_at(deadline, &mut receiver).await {
      Ok(Ok(signal)) => Ok(signal),
      Ok(Err(_)) => Err(CallbackError::Released { token }),
      Err(_) => {
        if self.release(&token).await {
          Err(CallbackError::Timeout { token })
        } else {
          // resolve() sends while still holding the table, so the value is there
          receiver
            .try_recv()
            .map_err(|_| CallbackError::Released { token })
        }
      }
    }
  }
}
