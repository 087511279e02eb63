//! Fetchflow Dispatch
//!
//! The [`TaskDispatcher`] starts the external fetch executor for an execution.
//! It mints a [`CorrelationToken`](fetchflow_callback::CorrelationToken),
//! registers it with the callback registry, and launches the executor through
//! the [`FetchExecutor`] trait. It returns as soon as the launch call does;
//! the executor reports completion later through the inbound signal path.
//!
//! [`ProcessExecutor`] is a [`FetchExecutor`] that runs a local program and
//! reads its completion report from stdout.

mod dispatcher;
mod error;
mod executor;
mod process;

pub use dispatcher::{Dispatched, TaskDispatcher};
pub use error::DispatchError;
pub use executor::{FetchExecutor, LaunchReceipt, LaunchRequest};
pub use process::ProcessExecutor;
