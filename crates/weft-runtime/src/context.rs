//! Execution context handed to component handlers.
//!
//! An [`ExecuteContext`] is a component's window onto its own flow state:
//! reading inputs, evaluating expressions, propagating outputs, persisting
//! running state, settling container children. It is only valid for the
//! duration of one `execute` call; long-lived work goes through an
//! [`OutputHandle`].

use serde_json::Value;
use tokio::sync::mpsc;
use weft_data::DataContext;
use weft_flow::{ComponentKind, SEQ_OUT};

use crate::error::ComponentError;
use crate::logs::LogKind;
use crate::runtime::{ExternalEvent, Runtime};
use crate::state::{FlowStateId, RunningState};

/// A cloneable handle for emitting output values from asynchronous work
/// (timer callbacks, stream events). Emissions are delivered through the
/// runtime's external-event channel and propagate on a later pump turn,
/// never atomically with the emitting call.
#[derive(Debug, Clone)]
pub struct OutputHandle {
  sender: mpsc::UnboundedSender<ExternalEvent>,
  flow_state: FlowStateId,
  component: String,
}

impl OutputHandle {
  /// Emit a value on the named output. Errors are ignored - the runtime
  /// may already be gone, which is fine for a late callback.
  pub fn emit(&self, output: &str, value: Value) {
    let _ = self.sender.send(ExternalEvent::Propagate {
      flow_state: self.flow_state,
      component: self.component.clone(),
      output: output.to_string(),
      value,
    });
  }

  /// Emit a sequence trigger on `@seqout`.
  pub fn emit_sequence(&self) {
    self.emit(SEQ_OUT, Value::Null);
  }
}

/// A component's view of the runtime during one execution.
pub struct ExecuteContext<'a> {
  pub(crate) runtime: &'a mut Runtime,
  pub(crate) flow_state: FlowStateId,
  pub(crate) component: String,
  pub(crate) connection_line: Option<usize>,
}

impl ExecuteContext<'_> {
  pub fn flow_state_id(&self) -> FlowStateId {
    self.flow_state
  }

  pub fn component_id(&self) -> &str {
    &self.component
  }

  /// The component's kind, cloned out of the definition.
  pub fn kind(&self) -> Result<ComponentKind, ComponentError> {
    let state = self
      .runtime
      .flow_state(self.flow_state)
      .ok_or_else(|| ComponentError::MissingComponent {
        component: self.component.clone(),
      })?;
    state
      .flow
      .component(&self.component)
      .map(|component| component.kind.clone())
      .ok_or_else(|| ComponentError::MissingComponent {
        component: self.component.clone(),
      })
  }

  /// The flow state's data context (cheap handle clone).
  pub fn data_context(&self) -> Result<DataContext, ComponentError> {
    self
      .runtime
      .flow_state(self.flow_state)
      .map(|state| state.data_context.clone())
      .ok_or_else(|| ComponentError::MissingComponent {
        component: self.component.clone(),
      })
  }

  /// Consume an unread input: clears its unread flag and returns the
  /// buffered value, if any was ever received.
  pub fn take_input(&mut self, input: &str) -> Option<Value> {
    self
      .runtime
      .flow_state_mut(self.flow_state)?
      .component_state_mut(&self.component)
      .consume_input(input)
  }

  /// Read an input without consuming it.
  pub fn input(&self, input: &str) -> Option<Value> {
    self
      .runtime
      .flow_state(self.flow_state)?
      .component_state(&self.component)?
      .input_value(input)
      .cloned()
  }

  /// Consume a mandatory input, erroring when it was never delivered.
  pub fn require_input(&mut self, input: &str) -> Result<Value, ComponentError> {
    self
      .take_input(input)
      .ok_or_else(|| ComponentError::MissingInput {
        input: input.to_string(),
      })
  }

  /// Evaluate an expression against the flow state's data context.
  pub fn evaluate(&self, expression: &str) -> Result<Value, ComponentError> {
    let scope = self.data_context()?;
    let backend = self.runtime.backend();
    Ok(backend.evaluate(&scope, expression)?)
  }

  /// Render a template string against the flow state's data context.
  pub fn render(&self, template: &str) -> Result<String, ComponentError> {
    let scope = self.data_context()?;
    let backend = self.runtime.backend();
    Ok(backend.render(&scope, template)?)
  }

  pub fn get_variable(&self, name: &str) -> Option<Value> {
    self.data_context().ok()?.get(name)
  }

  pub fn set_variable(&mut self, name: &str, value: Value) -> Result<(), ComponentError> {
    self.data_context()?.set(name, value);
    Ok(())
  }

  /// Deliver a value to everything connected to the named output. Recording
  /// is synchronous; re-execution of targets is scheduled on the pump.
  pub fn propagate(&mut self, output: &str, value: Value) {
    self
      .runtime
      .propagate_value(self.flow_state, &self.component, output, value);
  }

  /// Fire the `@seqout` sequence output.
  pub fn propagate_sequence(&mut self) {
    self.propagate(SEQ_OUT, Value::Null);
  }

  /// Deliver a value on an output of the component that spawned this flow
  /// state (used by `output` components of called actions). A no-op for
  /// root flow states.
  pub fn propagate_parent(&mut self, output: &str, value: Value) {
    self.runtime.propagate_to_parent(self.flow_state, output, value);
  }

  /// This component's persistent running state, if set.
  pub fn running_state(&self) -> Option<RunningState> {
    self
      .runtime
      .flow_state(self.flow_state)?
      .component_state(&self.component)?
      .running_state()
      .cloned()
  }

  pub fn set_running_state(&mut self, running_state: RunningState) {
    if let Some(state) = self.runtime.flow_state_mut(self.flow_state) {
      state
        .component_state_mut(&self.component)
        .set_running_state(running_state);
    }
  }

  /// Handle for emitting outputs from spawned asynchronous work.
  pub fn output_handle(&self) -> OutputHandle {
    OutputHandle {
      sender: self.runtime.external_sender(),
      flow_state: self.flow_state,
      component: self.component.clone(),
    }
  }

  pub fn log_info(&mut self, message: impl Into<String>) {
    self.log(LogKind::Info, message);
  }

  pub fn log_scpi(&mut self, message: impl Into<String>) {
    self.log(LogKind::Scpi, message);
  }

  pub fn log_error(&mut self, message: impl Into<String>) {
    self.log(LogKind::Error, message);
  }

  fn log(&mut self, kind: LogKind, message: impl Into<String>) {
    self.runtime.append_log(
      kind,
      message,
      Some(self.flow_state),
      Some(self.component.clone()),
      self.connection_line,
    );
  }

  /// Reconcile this container's child flow states against the bound data
  /// source: one child per element, index ascending; stale children are
  /// torn down, missing ones created.
  pub fn settle_list_children(
    &mut self,
    data: &str,
    item_flow: &str,
  ) -> Result<(), ComponentError> {
    self
      .runtime
      .settle_list_children(self.flow_state, &self.component, data, item_flow)
  }

  /// Reconcile this select's single child flow state against the bound
  /// enum value; out-of-range indices fall back to branch 0, zero branches
  /// mean no child.
  pub fn settle_select_child(
    &mut self,
    data: &str,
    branches: &[String],
  ) -> Result<(), ComponentError> {
    self
      .runtime
      .settle_select_child(self.flow_state, &self.component, data, branches)
  }

  /// Spawn another flow as a child flow state of this one and schedule its
  /// source components.
  pub fn spawn_child_flow(&mut self, flow_id: &str) -> Result<FlowStateId, ComponentError> {
    self
      .runtime
      .spawn_action_child(self.flow_state, &self.component, flow_id)
  }
}
