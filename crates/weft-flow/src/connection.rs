use serde::{Deserialize, Serialize};

/// A directed edge from one component's output to another's input.
///
/// Multiple lines may share a target input (fan-in) and a single output may
/// feed multiple targets (fan-out). Lines are identified by their index in
/// `Flow::connection_lines`; delivery order within one propagation follows
/// declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionLine {
  pub source: String,
  pub output: String,
  pub target: String,
  pub input: String,
}

impl ConnectionLine {
  pub fn new(
    source: impl Into<String>,
    output: impl Into<String>,
    target: impl Into<String>,
    input: impl Into<String>,
  ) -> Self {
    Self {
      source: source.into(),
      output: output.into(),
      target: target.into(),
      input: input.into(),
    }
  }
}
