use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An external program the pipeline launches (fetch executor or notify step).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDef {
  pub program: String,
  #[serde(default)]
  pub args: Vec<String>,
  /// Extra environment for the child, merged over the inherited environment.
  #[serde(default)]
  pub env: HashMap<String, String>,
}

impl CommandDef {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      env: HashMap::new(),
    }
  }

  pub fn with_args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args = args.into_iter().map(Into::into).collect();
    self
  }
}
