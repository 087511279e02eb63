//! Fetchflow Workflow
//!
//! The [`WorkflowController`] owns every execution of the two-stage pipeline
//! and drives each one through its state machine:
//!
//! ```text
//! Start ─► Dispatching ─► AwaitingCallback ─► Notifying ─► Succeeded
//!              │                 │                │
//!              └─────────────────┴────────────────┴──────► Failed
//! ```
//!
//! Each execution runs as its own tokio task and is bounded by a single
//! deadline fixed at trigger time. `Succeeded` and `Failed` are absorbing.
//!
//! # Usage
//!
//! ```ignore
//! let dispatcher = TaskDispatcher::new(executor, registry, destination);
//! let invoker = NotificationInvoker::new(step, Duration::from_secs(30));
//! let controller = Arc::new(WorkflowController::new(
//!     dispatcher,
//!     invoker,
//!     ControllerConfig::default(),
//! ));
//!
//! let handle = controller.trigger();
//! let record = handle.wait().await?;
//! ```

mod controller;
mod error;
mod events;
mod execution;
mod state;

pub use controller::{ControllerConfig, ExecutionHandle, WorkflowController};
pub use error::WorkflowError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use execution::ExecutionRecord;
pub use state::{ExecutionState, FailureKind, Outcome};
