use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::flow::Flow;

/// A loadable set of flows - the unit the runtime executes against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub flows: Vec<Flow>,
  /// Initial values for project-wide variables, seeded into the root data
  /// context on every (re)start.
  #[serde(default)]
  pub global_variables: HashMap<String, serde_json::Value>,
}

impl Project {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      flows: Vec::new(),
      global_variables: HashMap::new(),
    }
  }

  /// Add a flow (builder style).
  pub fn with_flow(mut self, flow: Flow) -> Self {
    self.flows.push(flow);
    self
  }

  /// Declare a global variable with its initial value (builder style).
  pub fn with_global_variable(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
    self.global_variables.insert(name.into(), value);
    self
  }

  /// Get a flow by id.
  pub fn flow(&self, id: &str) -> Option<&Flow> {
    self.flows.iter().find(|flow| flow.id == id)
  }

  /// Validate every flow plus cross-flow references (container item flows,
  /// select branches, action calls).
  pub fn validate(&self) -> Result<(), FlowError> {
    for flow in &self.flows {
      flow.validate()?;

      for (component, reference) in flow.referenced_flows() {
        if self.flow(reference).is_none() {
          return Err(FlowError::UnknownFlowReference {
            flow: flow.id.clone(),
            component: component.to_string(),
            reference: reference.to_string(),
          });
        }
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::component::{Component, ComponentKind};

  #[test]
  fn validate_rejects_unknown_item_flow() {
    let project = Project::new("demo").with_flow(Flow::new("main").with_component(
      Component::new(
        "items",
        ComponentKind::List {
          data: "readings".to_string(),
          item_flow: "missing".to_string(),
        },
      ),
    ));

    assert!(matches!(
      project.validate(),
      Err(FlowError::UnknownFlowReference { .. })
    ));
  }

  #[test]
  fn validate_accepts_resolved_references() {
    let project = Project::new("demo")
      .with_flow(Flow::new("item"))
      .with_flow(Flow::new("main").with_component(Component::new(
        "items",
        ComponentKind::List {
          data: "readings".to_string(),
          item_flow: "item".to_string(),
        },
      )));

    assert!(project.validate().is_ok());
  }
}
