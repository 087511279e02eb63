//! Fetchflow Engine
//!
//! This crate wires the inbound signal path to the workflow controller.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PipelineRunner                         │
//! │  - owns the inbound signal channel (sender + receiver)      │
//! │  - trigger() starts an execution                            │
//! │  - start(cancel) resolves each received signal              │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    WorkflowController                       │
//! │  - Start → Dispatching → AwaitingCallback → Notifying       │
//! │  - callback registry lookup by correlation token            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let (sender, receiver) = tokio::sync::mpsc::channel(100);
//! let executor = Arc::new(ProcessExecutor::new(command, sender.clone()));
//! // ... build the dispatcher, invoker, and controller ...
//!
//! let runner = PipelineRunner::with_channel(controller.clone(), sender, receiver);
//! let cancel = CancellationToken::new();
//! tokio::spawn(runner.start(cancel.child_token()));
//!
//! let record = controller.trigger().wait().await?;
//! ```

mod error;
mod runner;

pub use error::EngineError;
pub use runner::PipelineRunner;
