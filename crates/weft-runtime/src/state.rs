//! Live execution state: flow states and their per-component state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use weft_data::DataContext;
use weft_flow::Flow;

/// Identifier of a live flow state, unique within one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowStateId(pub(crate) u64);

impl std::fmt::Display for FlowStateId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "fs-{}", self.0)
  }
}

/// Persistent, component-owned data surviving across repeated executions
/// within one flow state.
///
/// A closed union instead of a `dyn Any` slot: retrieval is a match, not a
/// downcast. Handlers needing richer shapes use the `Json` variant.
#[derive(Debug, Clone, PartialEq)]
pub enum RunningState {
  Counter(i64),
  Json(Value),
}

/// Tracks unread-input flags and buffered input values for one component
/// within one flow state.
#[derive(Debug, Default)]
pub struct ComponentState {
  inputs_data: HashMap<String, Value>,
  unread_inputs: HashSet<String>,
  running_state: Option<RunningState>,
  /// Cancelled exactly once, by whoever takes it out of the slot.
  pub(crate) subscription: Option<CancellationToken>,
}

impl ComponentState {
  /// Last received value on the named input, if any.
  pub fn input_value(&self, input: &str) -> Option<&Value> {
    self.inputs_data.get(input)
  }

  /// All buffered input values.
  pub fn inputs_data(&self) -> &HashMap<String, Value> {
    &self.inputs_data
  }

  /// Input names whose value has not yet been consumed by an execution.
  pub fn unread_inputs(&self) -> &HashSet<String> {
    &self.unread_inputs
  }

  pub fn running_state(&self) -> Option<&RunningState> {
    self.running_state.as_ref()
  }

  /// Whether a long-lived subscription is registered for this component.
  pub fn has_subscription(&self) -> bool {
    self.subscription.is_some()
  }

  /// Record a propagated value: buffer it and flag it unread.
  pub(crate) fn set_input_data(&mut self, input: &str, value: Value) {
    self.inputs_data.insert(input.to_string(), value);
    self.unread_inputs.insert(input.to_string());
  }

  /// Consume one input: clears its unread flag, keeps the buffered value.
  pub(crate) fn consume_input(&mut self, input: &str) -> Option<Value> {
    self.unread_inputs.remove(input);
    self.inputs_data.get(input).cloned()
  }

  /// Mark every buffered input as read.
  pub(crate) fn mark_inputs_read(&mut self) {
    self.unread_inputs.clear();
  }

  pub(crate) fn set_running_state(&mut self, running_state: RunningState) {
    self.running_state = Some(running_state);
  }

  /// Install a new subscription, returning the superseded one (which the
  /// runtime must cancel).
  pub(crate) fn replace_subscription(
    &mut self,
    token: CancellationToken,
  ) -> Option<CancellationToken> {
    self.subscription.replace(token)
  }

  /// Remove the subscription for exactly-once cancellation.
  pub(crate) fn take_subscription(&mut self) -> Option<CancellationToken> {
    self.subscription.take()
  }
}

/// One live execution instance of a [`Flow`].
///
/// Owned by the runtime (roots) or logically by a parent flow state
/// (container items, select branches, called actions). Finished flow states
/// are retained for debugger inspection until pruned.
#[derive(Debug)]
pub struct FlowState {
  pub id: FlowStateId,
  pub flow: Arc<Flow>,
  pub parent: Option<FlowStateId>,
  /// Component in the parent flow that spawned this state (containers,
  /// call-action, widget actions).
  pub component: Option<String>,
  /// Item index for container children.
  pub index: Option<usize>,
  /// Child flow states, ordered by creation time.
  pub children: Vec<FlowStateId>,
  pub data_context: DataContext,
  pub error: Option<String>,
  pub is_finished: bool,
  component_states: HashMap<String, ComponentState>,
}

impl FlowState {
  pub(crate) fn new(
    id: FlowStateId,
    flow: Arc<Flow>,
    data_context: DataContext,
    parent: Option<FlowStateId>,
    component: Option<String>,
    index: Option<usize>,
  ) -> Self {
    Self {
      id,
      flow,
      parent,
      component,
      index,
      children: Vec::new(),
      data_context,
      error: None,
      is_finished: false,
      component_states: HashMap::new(),
    }
  }

  /// Human-readable label for debugger trees.
  pub fn label(&self) -> &str {
    if self.flow.name.is_empty() {
      &self.flow.id
    } else {
      &self.flow.name
    }
  }

  /// State of the given component, if it has received or produced anything.
  pub fn component_state(&self, component: &str) -> Option<&ComponentState> {
    self.component_states.get(component)
  }

  /// Iterate all materialized component states.
  pub fn component_states(&self) -> impl Iterator<Item = (&String, &ComponentState)> {
    self.component_states.iter()
  }

  /// Running state of the given component, if set.
  pub fn running_state(&self, component: &str) -> Option<&RunningState> {
    self
      .component_states
      .get(component)
      .and_then(|state| state.running_state())
  }

  /// Whether any component holds a live subscription.
  pub fn has_live_subscription(&self) -> bool {
    self
      .component_states
      .values()
      .any(|state| state.has_subscription())
  }

  /// State of the given component, created on demand.
  pub(crate) fn component_state_mut(&mut self, component: &str) -> &mut ComponentState {
    self
      .component_states
      .entry(component.to_string())
      .or_default()
  }

  /// Empty every subscription slot, handing the tokens to the caller for
  /// exactly-once cancellation.
  pub(crate) fn take_all_subscriptions(&mut self) -> Vec<CancellationToken> {
    self
      .component_states
      .values_mut()
      .filter_map(|state| state.take_subscription())
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn unread_flag_tracks_consumption() {
    let mut state = ComponentState::default();
    state.set_input_data("value", json!(5));

    assert!(state.unread_inputs().contains("value"));
    assert_eq!(state.consume_input("value"), Some(json!(5)));
    assert!(!state.unread_inputs().contains("value"));
    // Buffered value survives consumption.
    assert_eq!(state.input_value("value"), Some(&json!(5)));
  }

  #[test]
  fn unread_inputs_always_have_buffered_values() {
    let mut state = ComponentState::default();
    state.set_input_data("a", json!(1));
    state.set_input_data("b", json!(2));
    state.consume_input("a");

    for input in state.unread_inputs() {
      assert!(state.input_value(input).is_some());
    }
  }

  #[test]
  fn replacing_a_subscription_hands_back_the_old_token() {
    let mut state = ComponentState::default();
    let first = CancellationToken::new();
    let second = CancellationToken::new();

    assert!(state.replace_subscription(first.clone()).is_none());
    let superseded = state.replace_subscription(second).unwrap();
    superseded.cancel();

    assert!(first.is_cancelled());
    assert!(state.has_subscription());
  }
}
