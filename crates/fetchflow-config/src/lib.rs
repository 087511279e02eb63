//! Fetchflow Config
//!
//! This crate contains the serializable configuration types for a fetchflow
//! pipeline. These types describe deadlines and the external collaborators
//! (fetch executor, notification step) before the binary wires them into a
//! running controller.
//!
//! Configuration is loaded from a JSON file:
//!
//! ```json
//! {
//!   "execution_timeout_ms": 60000,
//!   "notify_timeout_ms": 30000,
//!   "artifact_destination": { "bucket": "bill-fetcher-bucket" },
//!   "credentials_ref": "/bill-fetcher/secrets",
//!   "executor": { "program": "python3", "args": ["./aws_fetcher.py"] },
//!   "notifier": { "program": "./send-bill" }
//! }
//! ```

mod command;
mod error;
mod pipeline;

pub use command::CommandDef;
pub use error::ConfigError;
pub use pipeline::{DestinationDef, PipelineConfig};
