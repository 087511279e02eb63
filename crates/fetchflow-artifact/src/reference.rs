use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Pointer to an artifact produced by the fetch stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactReference {
  /// Storage location, e.g. `arn:aws:s3:::bucket/2022-07-10/bill.pdf`.
  pub location: String,
  /// Object version, when the store is versioned.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
}

impl ArtifactReference {
  pub fn new(location: impl Into<String>) -> Self {
    Self {
      location: location.into(),
      version: None,
    }
  }

  pub fn with_version(mut self, version: impl Into<String>) -> Self {
    self.version = Some(version.into());
    self
  }
}

impl std::fmt::Display for ArtifactReference {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self.version {
      Some(version) => write!(f, "{}@{}", self.location, version),
      None => f.write_str(&self.location),
    }
  }
}

/// Bucket (and optional key prefix) the fetch executor writes into.
///
/// Objects are grouped by invoice date:
/// ```text
/// {bucket}/
/// └── {prefix}/2022-07-10/
///     ├── bill.pdf
///     └── bill_info.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDestination {
  pub bucket: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub prefix: Option<String>,
}

impl ArtifactDestination {
  pub fn new(bucket: impl Into<String>) -> Self {
    Self {
      bucket: bucket.into(),
      prefix: None,
    }
  }

  pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.prefix = Some(prefix.into());
    self
  }

  /// Object key for a file belonging to the bill dated `invoice_date`.
  pub fn object_key(&self, invoice_date: NaiveDate, file_name: &str) -> String {
    let date = invoice_date.format("%Y-%m-%d");
    match self
      .prefix
      .as_deref()
      .map(|p| p.trim_matches('/'))
      .filter(|p| !p.is_empty())
    {
      Some(prefix) => format!("{}/{}/{}", prefix, date, file_name),
      None => format!("{}/{}", date, file_name),
    }
  }

  /// Fully qualified location of `key` in this bucket.
  pub fn arn(&self, key: &str) -> String {
    format!("arn:aws:s3:::{}/{}", self.bucket, key)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_object_key_without_prefix() {
    let dest = ArtifactDestination::new("bill-fetcher-bucket");
    let date = NaiveDate::from_ymd_opt(2022, 7, 10).unwrap();

    assert_eq!(dest.object_key(date, "bill.pdf"), "2022-07-10/bill.pdf");
  }

  #[test]
  fn test_object_key_trims_prefix_slashes() {
    let dest = ArtifactDestination::new("b").with_prefix("/bills/");
    let date = NaiveDate::from_ymd_opt(2022, 7, 10).unwrap();

    assert_eq!(
      dest.object_key(date, "bill_info.json"),
      "bills/2022-07-10/bill_info.json"
    );
  }

  #[test]
  fn test_arn() {
    let dest = ArtifactDestination::new("bill-fetcher-bucket");
    assert_eq!(
      dest.arn("2022-07-10/bill.pdf"),
      "arn:aws:s3:::bill-fetcher-bucket/2022-07-10/bill.pdf"
    );
  }

  #[test]
  fn test_reference_display() {
    let plain = ArtifactReference::new("s3://b/k");
    let versioned = ArtifactReference::new("s3://b/k").with_version("v3");

    assert_eq!(plain.to_string(), "s3://b/k");
    assert_eq!(versioned.to_string(), "s3://b/k@v3");
  }

  #[test]
  fn test_reference_omits_missing_version() {
    let json = serde_json::to_value(ArtifactReference::new("s3://b/k")).unwrap();
    assert_eq!(json, serde_json::json!({ "location": "s3://b/k" }));
  }
}
