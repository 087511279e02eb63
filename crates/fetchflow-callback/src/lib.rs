//! Fetchflow Callback
//!
//! This crate correlates completion reports from the external fetch executor
//! with the execution waiting on them.
//!
//! The executor only ever sees a [`CorrelationToken`]. When it finishes it
//! reports a [`CallbackSignal`] bearing that token; the [`CallbackRegistry`]
//! looks the token up and hands the signal to whoever registered it.
//!
//! ```text
//! dispatcher ── register(token) ──► registry ◄── resolve(signal) ── inbound path
//!      │                               │
//!      └── PendingCallback ── wait() ──┘ (signal, or timeout at deadline)
//! ```
//!
//! A token is settled exactly once: either `resolve` removes it and delivers
//! the signal, or the waiter's deadline removes it and any later signal is
//! rejected with [`CallbackError::UnknownToken`].

mod error;
mod memory;
mod registry;
mod signal;
mod token;

pub use error::CallbackError;
pub use memory::InMemoryRegistry;
pub use registry::{CallbackRegistry, PendingCallback};
pub use signal::{CallbackOutcome, CallbackSignal, SignalMessage};
pub use token::CorrelationToken;
