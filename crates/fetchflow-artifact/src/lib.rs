//! Fetchflow Artifact
//!
//! Types describing the data handed from the fetch stage to the notify stage.
//! The bytes themselves live in external object storage; the pipeline only
//! carries pointers to them.
//!
//! - [`ArtifactDestination`] tells the fetch executor where to write.
//! - [`ArtifactReference`] is what the executor reports back, and is passed
//!   unchanged to the notification step.
//! - [`BillReport`] is the structured result the bill fetcher uploads next to
//!   the document itself.

mod bill;
mod reference;

pub use bill::{BillInfo, BillReport};
pub use reference::{ArtifactDestination, ArtifactReference};
