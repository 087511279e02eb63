use serde::{Deserialize, Serialize};

/// Opaque value linking a dispatched fetch task to the execution awaiting it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
  /// Mint a fresh, never-before-issued token.
  pub fn mint() -> Self {
    Self(uuid::Uuid::new_v4().simple().to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<String> for CorrelationToken {
  fn from(value: String) -> Self {
    Self(value)
  }
}

impl From<&str> for CorrelationToken {
  fn from(value: &str) -> Self {
    Self(value.to_string())
  }
}

impl std::fmt::Display for CorrelationToken {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}
