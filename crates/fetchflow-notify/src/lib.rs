//! Fetchflow Notify
//!
//! The [`NotificationInvoker`] calls the notification step once with the
//! artifact produced by the fetch stage and bounds the call with its own
//! timeout. It never retries.

mod command;
mod error;
mod invoker;

pub use command::CommandNotifier;
pub use error::NotifyError;
pub use invoker::{NotificationInvoker, NotificationStep, NotifyResult};
