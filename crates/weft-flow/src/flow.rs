use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentKind};
use crate::connection::ConnectionLine;
use crate::error::FlowError;
use crate::graph::FlowGraph;

/// A user-authored graph of components and connection lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub components: Vec<Component>,
  #[serde(default)]
  pub connection_lines: Vec<ConnectionLine>,
  /// Initial values for variables scoped to each flow state of this flow.
  #[serde(default)]
  pub local_variables: HashMap<String, serde_json::Value>,
}

impl Flow {
  pub fn new(id: impl Into<String>) -> Self {
    let id = id.into();
    Self {
      name: id.clone(),
      id,
      components: Vec::new(),
      connection_lines: Vec::new(),
      local_variables: HashMap::new(),
    }
  }

  /// Add a component (builder style).
  pub fn with_component(mut self, component: Component) -> Self {
    self.components.push(component);
    self
  }

  /// Add a connection line (builder style).
  pub fn connect(
    mut self,
    source: impl Into<String>,
    output: impl Into<String>,
    target: impl Into<String>,
    input: impl Into<String>,
  ) -> Self {
    self
      .connection_lines
      .push(ConnectionLine::new(source, output, target, input));
    self
  }

  /// Declare a local variable with its initial value (builder style).
  pub fn with_local_variable(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
    self.local_variables.insert(name.into(), value);
    self
  }

  /// Get a component by id.
  pub fn component(&self, id: &str) -> Option<&Component> {
    self.components.iter().find(|component| component.id == id)
  }

  /// Build the graph structure for traversal.
  pub fn graph(&self) -> FlowGraph {
    FlowGraph::new(self)
  }

  /// Flow ids this flow's containers and calls reference.
  pub fn referenced_flows(&self) -> Vec<(&str, &str)> {
    let mut refs = Vec::new();
    for component in &self.components {
      match &component.kind {
        ComponentKind::List { item_flow, .. } | ComponentKind::Grid { item_flow, .. } => {
          refs.push((component.id.as_str(), item_flow.as_str()));
        }
        ComponentKind::Select { branches, .. } => {
          for branch in branches {
            refs.push((component.id.as_str(), branch.as_str()));
          }
        }
        ComponentKind::CallAction { action } | ComponentKind::Widget {
          action: Some(action),
        } => {
          refs.push((component.id.as_str(), action.as_str()));
        }
        _ => {}
      }
    }
    refs
  }

  /// Structural validation: unique component ids, connection-line sources
  /// must exist and name declared outputs.
  ///
  /// Dangling *targets* are deliberately not an error here - the runtime
  /// drops propagations into missing targets silently, so a stale edit
  /// cannot abort sibling propagations.
  pub fn validate(&self) -> Result<(), FlowError> {
    let mut seen = HashSet::new();
    for component in &self.components {
      if !seen.insert(component.id.as_str()) {
        return Err(FlowError::DuplicateComponent {
          flow: self.id.clone(),
          id: component.id.clone(),
        });
      }
    }

    for (index, line) in self.connection_lines.iter().enumerate() {
      let Some(source) = self.component(&line.source) else {
        return Err(FlowError::UnknownSource {
          flow: self.id.clone(),
          index,
          component: line.source.clone(),
        });
      };
      if source.output(&line.output).is_none() {
        return Err(FlowError::UnknownOutput {
          flow: self.id.clone(),
          index,
          component: line.source.clone(),
          output: line.output.clone(),
        });
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::component::SEQ_OUT;

  fn two_step_flow() -> Flow {
    Flow::new("main")
      .with_component(Component::new("begin", ComponentKind::Start))
      .with_component(Component::new("end", ComponentKind::Log { message: None }))
      .connect("begin", SEQ_OUT, "end", crate::SEQ_IN)
  }

  #[test]
  fn validate_accepts_well_formed_flow() {
    assert!(two_step_flow().validate().is_ok());
  }

  #[test]
  fn validate_rejects_duplicate_component_ids() {
    let flow = Flow::new("main")
      .with_component(Component::new("begin", ComponentKind::Start))
      .with_component(Component::new("begin", ComponentKind::Start));

    assert!(matches!(
      flow.validate(),
      Err(FlowError::DuplicateComponent { .. })
    ));
  }

  #[test]
  fn validate_rejects_unknown_source_output() {
    let flow = Flow::new("main")
      .with_component(Component::new("begin", ComponentKind::Start))
      .with_component(Component::new("end", ComponentKind::Log { message: None }))
      .connect("begin", "no-such-output", "end", crate::SEQ_IN);

    assert!(matches!(
      flow.validate(),
      Err(FlowError::UnknownOutput { .. })
    ));
  }

  #[test]
  fn validate_tolerates_dangling_target() {
    let flow = Flow::new("main")
      .with_component(Component::new("begin", ComponentKind::Start))
      .connect("begin", SEQ_OUT, "removed", crate::SEQ_IN);

    assert!(flow.validate().is_ok());
  }
}
