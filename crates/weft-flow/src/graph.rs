use std::collections::{HashMap, HashSet};

use crate::component::{Component, PinKind};
use crate::flow::Flow;

/// Graph structure for traversal and analysis, built from a [`Flow`].
///
/// Connection lines are referenced by their index in
/// `Flow::connection_lines` so callers can report and select them.
#[derive(Debug)]
pub struct FlowGraph<'a> {
  flow: &'a Flow,
  /// component id -> indices of lines leaving it.
  outgoing: HashMap<&'a str, Vec<usize>>,
  /// component id -> indices of lines entering it.
  incoming: HashMap<&'a str, Vec<usize>>,
}

impl<'a> FlowGraph<'a> {
  pub fn new(flow: &'a Flow) -> Self {
    let mut outgoing: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut incoming: HashMap<&str, Vec<usize>> = HashMap::new();

    for component in &flow.components {
      outgoing.entry(component.id.as_str()).or_default();
      incoming.entry(component.id.as_str()).or_default();
    }

    for (index, line) in flow.connection_lines.iter().enumerate() {
      outgoing.entry(line.source.as_str()).or_default().push(index);
      incoming.entry(line.target.as_str()).or_default().push(index);
    }

    Self {
      flow,
      outgoing,
      incoming,
    }
  }

  /// Indices of lines leaving `component` through `output`, in declaration
  /// order.
  pub fn lines_from(&self, component: &str, output: &str) -> Vec<usize> {
    self
      .outgoing
      .get(component)
      .map(|indices| {
        indices
          .iter()
          .copied()
          .filter(|&index| self.flow.connection_lines[index].output == output)
          .collect()
      })
      .unwrap_or_default()
  }

  /// Indices of lines entering `component`.
  pub fn lines_into(&self, component: &str) -> &[usize] {
    self
      .incoming
      .get(component)
      .map(|indices| indices.as_slice())
      .unwrap_or(&[])
  }

  /// Whether any line leaves `component` through `output`.
  pub fn has_outgoing(&self, component: &str, output: &str) -> bool {
    !self.lines_from(component, output).is_empty()
  }

  /// Input names of `component` that have at least one incoming line.
  pub fn connected_inputs(&self, component: &str) -> HashSet<&str> {
    self
      .lines_into(component)
      .iter()
      .map(|&index| self.flow.connection_lines[index].input.as_str())
      .collect()
  }

  /// Input names of `component` that are both connected and declared as
  /// sequence pins.
  pub fn connected_sequence_inputs<'b>(&self, component: &'b Component) -> HashSet<&'b str> {
    let connected = self.connected_inputs(&component.id);
    component
      .sequence_inputs()
      .filter(|pin| connected.contains(pin.name.as_str()))
      .map(|pin| pin.name.as_str())
      .collect()
  }

  /// Components with no incoming lines - scheduled once at flow start.
  pub fn source_components(&self) -> Vec<&'a Component> {
    self
      .flow
      .components
      .iter()
      .filter(|component| self.lines_into(&component.id).is_empty())
      .collect()
  }

  /// Mandatory data inputs of `component` that are connected; all of them
  /// must hold a value before the component is ready to run.
  pub fn connected_mandatory_inputs<'b>(&self, component: &'b Component) -> Vec<&'b str> {
    let connected = self.connected_inputs(&component.id);
    component
      .inputs
      .iter()
      .filter(|pin| pin.kind == PinKind::Data && !pin.optional)
      .filter(|pin| connected.contains(pin.name.as_str()))
      .map(|pin| pin.name.as_str())
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::component::{Component, ComponentKind, SEQ_IN, SEQ_OUT};

  fn fan_out_flow() -> Flow {
    Flow::new("main")
      .with_component(Component::new("begin", ComponentKind::Start))
      .with_component(Component::new("left", ComponentKind::Log { message: None }))
      .with_component(Component::new("right", ComponentKind::Log { message: None }))
      .connect("begin", SEQ_OUT, "left", SEQ_IN)
      .connect("begin", SEQ_OUT, "right", SEQ_IN)
  }

  #[test]
  fn lines_from_preserves_declaration_order() {
    let flow = fan_out_flow();
    let graph = flow.graph();

    let indices = graph.lines_from("begin", SEQ_OUT);
    assert_eq!(indices, vec![0, 1]);
    assert_eq!(flow.connection_lines[indices[0]].target, "left");
    assert_eq!(flow.connection_lines[indices[1]].target, "right");
  }

  #[test]
  fn source_components_have_no_incoming_lines() {
    let flow = fan_out_flow();
    let graph = flow.graph();

    let sources: Vec<&str> = graph
      .source_components()
      .iter()
      .map(|component| component.id.as_str())
      .collect();
    assert_eq!(sources, vec!["begin"]);
  }

  #[test]
  fn connected_sequence_inputs_ignores_unwired_pins() {
    let flow = Flow::new("main")
      .with_component(Component::new("begin", ComponentKind::Start))
      .with_component(Component::new("end", ComponentKind::Log { message: None }));
    let graph = flow.graph();

    let end = flow.component("end").unwrap();
    assert!(graph.connected_sequence_inputs(end).is_empty());
  }
}
