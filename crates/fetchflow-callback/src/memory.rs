//! In-memory callback registry.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::CallbackError;
use crate::registry::{CallbackRegistry, PendingCallback};
use crate::signal::CallbackSignal;
use crate::token::CorrelationToken;

struct Waiter {
  execution_id: String,
  sender: oneshot::Sender<CallbackSignal>,
}

#[derive(Default)]
struct Table {
  waiters: HashMap<CorrelationToken, Waiter>,
  by_execution: HashMap<String, CorrelationToken>,
}

impl Table {
  fn remove(&mut self, token: &CorrelationToken) -> Option<Waiter> {
    let waiter = self.waiters.remove(token)?;
    self.by_execution.remove(&waiter.execution_id);
    Some(waiter)
  }
}

/// Process-local registry backed by a mutex-guarded map.
///
/// Nothing survives a restart; executions in flight at that point have to be
/// re-triggered.
#[derive(Default)]
pub struct InMemoryRegistry {
  table: Mutex<Table>,
}

impl InMemoryRegistry {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl CallbackRegistry for InMemoryRegistry {
  async fn register(
    &self,
    token: CorrelationToken,
    execution_id: &str,
  ) -> Result<PendingCallback, CallbackError> {
    let mut table = self.table.lock().unwrap();

    if table.waiters.contains_key(&token) {
      return Err(CallbackError::DuplicateToken { token });
    }
    if let Some(existing) = table.by_execution.get(execution_id) {
      return Err(CallbackError::AlreadyAwaiting {
        execution_id: execution_id.to_string(),
        token: existing.clone(),
      });
    }

    let (sender, receiver) = oneshot::channel();
    table.waiters.insert(
      token.clone(),
      Waiter {
        execution_id: execution_id.to_string(),
        sender,
      },
    );
    table
      .by_execution
      .insert(execution_id.to_string(), token.clone());

    debug!(token = %token, execution_id = %execution_id, "callback_registered");
    Ok(PendingCallback::new(token, receiver))
  }

  async fn resolve(&self, signal: CallbackSignal) -> Result<String, CallbackError> {
    let mut table = self.table.lock().unwrap();

    let Some(Waiter {
      execution_id,
      sender,
    }) = table.remove(&signal.token)
    else {
      return Err(CallbackError::UnknownToken {
        token: signal.token,
      });
    };

    let token = signal.token.clone();
    // The waiter may have given up (dropped its receiver) without releasing yet
    sender
      .send(signal)
      .map_err(|_| CallbackError::UnknownToken {
        token: token.clone(),
      })?;

    debug!(token = %token, execution_id = %execution_id, "callback_resolved");
    Ok(execution_id)
  }

  async fn release(&self, token: &CorrelationToken) -> bool {
    let released = self.table.lock().unwrap().remove(token).is_some();
    if released {
      debug!(token = %token, "callback_released");
    }
    released
  }

  async fn release_execution(&self, execution_id: &str) -> Option<CorrelationToken> {
    let mut table = self.table.lock().unwrap();
    let token = table.by_execution.get(execution_id).cloned()?;
    table.remove(&token);
    debug!(token = %token, execution_id = %execution_id, "callback_released");
    Some(token)
  }

  async fn is_outstanding(&self, token: &CorrelationToken) -> bool {
    self.table.lock().unwrap().waiters.contains_key(token)
  }

  async fn outstanding(&self) -> usize {
    self.table.lock().unwrap().waiters.len()
  }
}
