//! Structured result of a bill fetch.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::reference::ArtifactReference;

/// Summary of the latest bill scraped from the provider's account page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillInfo {
  pub service_name: String,
  /// Amount as displayed, currency symbol included.
  pub invoice_value: String,
  /// Serialized as `YYYY-MM-DD`.
  pub invoice_date: NaiveDate,
}

/// The document uploaded alongside the bill PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillReport {
  pub bill_info: BillInfo,
  pub pdf_location: String,
}

impl BillReport {
  pub fn artifact_reference(&self) -> ArtifactReference {
    ArtifactReference::new(self.pdf_location.clone())
  }
}
