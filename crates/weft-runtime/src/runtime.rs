//! The flow runtime.
//!
//! [`Runtime`] owns every live [`FlowState`], the execution queue, the log,
//! and the debugger cursors. Execution is single-threaded and cooperative:
//! `propagate_value` only records values and schedules ready components; the
//! pump executes them one at a time. Asynchronous component work feeds back
//! through an internal channel and propagates on a later pump turn.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};
use weft_data::DataContext;
use weft_flow::{ComponentKind, Flow, Project, SEQ_OUT};

use crate::backend::{EvalBackend, TemplateBackend};
use crate::context::ExecuteContext;
use crate::error::{ComponentError, StartError};
use crate::events::{NoopNotifier, RuntimeEvent, RuntimeNotifier};
use crate::logs::{LogItem, LogItemId, LogKind, Logs};
use crate::registry::{ComponentRegistry, ExecuteResult};
use crate::run_state::{RunAction, RunState};
use crate::settings::Settings;
use crate::state::{ComponentState, FlowState, FlowStateId};

/// Variable bound per container item, holding the item's index.
pub const ITERATOR_VARIABLE: &str = "item_index";
/// Variable bound per select branch, holding the selected index.
pub const SELECTED_VARIABLE: &str = "selected_index";

/// One scheduled component execution.
#[derive(Debug, Clone)]
pub struct QueueTask {
  pub id: u64,
  pub flow_state: FlowStateId,
  pub component: String,
  /// Line whose propagation scheduled this task, for debugger display.
  pub connection_line: Option<usize>,
}

/// Messages from asynchronous component work back into the pump.
#[derive(Debug)]
pub(crate) enum ExternalEvent {
  Propagate {
    flow_state: FlowStateId,
    component: String,
    output: String,
    value: Value,
  },
}

/// The flow execution runtime. One per open project session.
pub struct Runtime {
  run_id: String,
  project: Project,
  flows: HashMap<String, Arc<Flow>>,
  registry: Arc<ComponentRegistry>,
  backend: Arc<dyn EvalBackend>,
  notifier: Arc<dyn RuntimeNotifier>,
  globals: DataContext,
  state: RunState,
  error: Option<String>,
  flow_states: HashMap<FlowStateId, FlowState>,
  roots: Vec<FlowStateId>,
  queue: VecDeque<QueueTask>,
  next_flow_state_id: u64,
  next_task_id: u64,
  selected_flow_state: Option<FlowStateId>,
  selected_queue_task: Option<u64>,
  last_breakpoint_task: Option<u64>,
  breakpoints: HashSet<(String, String)>,
  logs: Logs,
  settings: Settings,
  external_tx: mpsc::UnboundedSender<ExternalEvent>,
  external_rx: mpsc::UnboundedReceiver<ExternalEvent>,
}

impl Runtime {
  /// Create a runtime for the given project with the builtin registry, the
  /// template backend, and no event notifier.
  pub fn new(project: Project) -> Self {
    let flows = project
      .flows
      .iter()
      .map(|flow| (flow.id.clone(), Arc::new(flow.clone())))
      .collect();
    let (external_tx, external_rx) = mpsc::unbounded_channel();

    Self {
      run_id: uuid::Uuid::new_v4().to_string(),
      project,
      flows,
      registry: Arc::new(ComponentRegistry::builtin()),
      backend: Arc::new(TemplateBackend::new()),
      notifier: Arc::new(NoopNotifier),
      globals: DataContext::new(),
      state: RunState::Starting,
      error: None,
      flow_states: HashMap::new(),
      roots: Vec::new(),
      queue: VecDeque::new(),
      next_flow_state_id: 0,
      next_task_id: 0,
      selected_flow_state: None,
      selected_queue_task: None,
      last_breakpoint_task: None,
      breakpoints: HashSet::new(),
      logs: Logs::new(),
      settings: Settings::new(),
      external_tx,
      external_rx,
    }
  }

  /// Replace the component registry.
  pub fn with_registry(mut self, registry: ComponentRegistry) -> Self {
    self.registry = Arc::new(registry);
    self
  }

  /// Replace the expression backend.
  pub fn with_backend(mut self, backend: Arc<dyn EvalBackend>) -> Self {
    self.backend = backend;
    self
  }

  /// Replace the event notifier.
  pub fn with_notifier(mut self, notifier: Arc<dyn RuntimeNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub fn project(&self) -> &Project {
    &self.project
  }

  pub fn state(&self) -> RunState {
    self.state
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  /// The root variable scope shared by all flow states.
  pub fn globals(&self) -> &DataContext {
    &self.globals
  }

  pub fn logs(&self) -> &Logs {
    &self.logs
  }

  pub fn clear_logs(&mut self) {
    self.logs.clear();
  }

  pub fn settings(&self) -> &Settings {
    &self.settings
  }

  pub fn settings_mut(&mut self) -> &mut Settings {
    &mut self.settings
  }

  pub fn read_setting(&self, key: &str) -> Option<&Value> {
    self.settings.read(key)
  }

  pub fn write_setting(&mut self, key: &str, value: Value) {
    self.settings.write(key, value);
  }

  // ---------------------------------------------------------------- state machine

  /// Reset globals from the project and move out of `Starting`.
  pub fn start_runtime(&mut self, debugger_active: bool) {
    self.globals.clear();
    for (name, value) in &self.project.global_variables {
      self.globals.set(name, value.clone());
    }

    if debugger_active {
      self.transition(RunAction::StartWithDebugger);
      self.transition(RunAction::Pause);
    } else {
      self.transition(RunAction::StartWithoutDebugger);
      self.transition(RunAction::Run);
    }
  }

  /// Apply a run-state action; invalid transitions are logged and ignored.
  pub fn transition(&mut self, action: RunAction) {
    match self.state.transition(action) {
      Some(next) => {
        info!(run_id = %self.run_id, from = ?self.state, to = ?next, action = ?action, "run state transition");
        self.state = next;
        self.notify(RuntimeEvent::RunStateChanged { state: next });
      }
      None => {
        warn!(run_id = %self.run_id, state = ?self.state, action = ?action, "invalid run state transition");
      }
    }
  }

  pub fn pause(&mut self) {
    self.transition(RunAction::Pause);
  }

  pub fn resume(&mut self) {
    self.transition(RunAction::Resume);
  }

  /// Switch between debugger-owned and free-running execution.
  pub fn toggle_debugger(&mut self) {
    if self.state.is_debugger_active() {
      self.transition(RunAction::Run);
    } else {
      self.transition(RunAction::Pause);
    }
  }

  /// Execute exactly one queued task, then pause again.
  pub fn single_step(&mut self) -> usize {
    self.transition(RunAction::SingleStep);
    let executed = self.pump();
    if self.state == RunState::SingleStep {
      // Empty queue: nothing stepped, fall back to paused.
      self.transition(RunAction::Pause);
    }
    executed
  }

  pub fn add_breakpoint(&mut self, flow: impl Into<String>, component: impl Into<String>) {
    self.breakpoints.insert((flow.into(), component.into()));
  }

  pub fn remove_breakpoint(&mut self, flow: &str, component: &str) {
    self
      .breakpoints
      .remove(&(flow.to_string(), component.to_string()));
  }

  // ---------------------------------------------------------------- start / stop

  /// Start a root flow state for the named flow.
  ///
  /// Validates the flow and everything reachable from it first; on error no
  /// partial flow state is retained. Source components (no incoming lines)
  /// are scheduled once.
  #[instrument(name = "flow_start", skip(self), fields(run_id = %self.run_id))]
  pub fn start(&mut self, flow_id: &str) -> Result<FlowStateId, StartError> {
    if self.state.is_stopped() {
      return Err(StartError::Stopped);
    }
    if self.state == RunState::Starting {
      self.start_runtime(false);
    }

    let flow = self
      .flows
      .get(flow_id)
      .cloned()
      .ok_or_else(|| StartError::UnknownFlow {
        id: flow_id.to_string(),
      })?;
    if flow.components.is_empty() {
      return Err(StartError::EmptyFlow {
        id: flow_id.to_string(),
      });
    }
    self.validate_reachable(flow_id)?;

    let id = self.create_flow_state(flow, None, None, None, HashMap::new());
    self.enqueue_sources(id);

    info!(run_id = %self.run_id, flow = flow_id, flow_state = %id, "flow_started");
    Ok(id)
  }

  /// Validate `flow_id` and every flow reachable through containers and
  /// calls: structure, registered handler kinds, resolvable references.
  fn validate_reachable(&self, flow_id: &str) -> Result<(), StartError> {
    let mut pending = vec![flow_id.to_string()];
    let mut visited = HashSet::new();

    while let Some(id) = pending.pop() {
      if !visited.insert(id.clone()) {
        continue;
      }
      let flow = self
        .flows
        .get(&id)
        .ok_or_else(|| StartError::UnknownFlow { id: id.clone() })?;

      flow.validate()?;

      for component in &flow.components {
        let tag = component.kind.tag();
        if !self.registry.contains(tag) {
          return Err(StartError::UnknownComponentKind {
            flow: flow.id.clone(),
            component: component.id.clone(),
            tag: tag.to_string(),
          });
        }
      }

      for (component, reference) in flow.referenced_flows() {
        if !self.flows.contains_key(reference) {
          return Err(StartError::Invalid(weft_flow::FlowError::UnknownFlowReference {
            flow: flow.id.clone(),
            component: component.to_string(),
            reference: reference.to_string(),
          }));
        }
        pending.push(reference.to_string());
      }
    }

    Ok(())
  }

  /// Stop a flow state and its whole subtree: every registered subscription
  /// is cancelled exactly once, queued work is dropped, and everything is
  /// marked finished but retained for debugger inspection. Idempotent.
  pub fn stop(&mut self, flow_state: FlowStateId) {
    for id in self.subtree_post_order(flow_state) {
      self.cancel_subscriptions(id);
      self.remove_queue_tasks(id);
      self.finish_flow_state(id, false);
    }
  }

  /// Stop every root flow state and move to `Stopped`.
  pub fn stop_runtime(&mut self) {
    if self.state.is_stopped() {
      return;
    }
    self.transition(RunAction::Stop);
    for root in self.roots.clone() {
      self.stop(root);
    }
  }

  fn cancel_subscriptions(&mut self, flow_state: FlowStateId) {
    if let Some(state) = self.flow_states.get_mut(&flow_state) {
      for token in state.take_all_subscriptions() {
        token.cancel();
      }
    }
  }

  fn remove_queue_tasks(&mut self, flow_state: FlowStateId) {
    self.queue.retain(|task| task.flow_state != flow_state);
  }

  // ---------------------------------------------------------------- propagation

  /// Deliver `value` from `source`'s `output` to every connected target's
  /// input: the value is buffered and flagged unread synchronously; target
  /// re-execution is scheduled on the pump, never run inline.
  ///
  /// Targets missing from the flow are searched among container children
  /// (lines authored into item flows); if nowhere to be found the value is
  /// dropped with a debug log entry - never an error, so sibling
  /// propagations are unaffected.
  pub fn propagate_value(
    &mut self,
    flow_state: FlowStateId,
    source: &str,
    output: &str,
    value: Value,
  ) {
    let Some(state) = self.flow_states.get(&flow_state) else {
      debug!(%flow_state, source, output, "propagation into unknown flow state dropped");
      return;
    };
    if state.is_finished {
      trace!(%flow_state, source, output, "propagation into finished flow state dropped");
      return;
    }
    let flow = state.flow.clone();
    let lines = flow.graph().lines_from(source, output);
    if lines.is_empty() {
      trace!(%flow_state, source, output, "output not connected, value dropped");
      return;
    }

    for index in lines {
      let line = flow.connection_lines[index].clone();

      if flow.component(&line.target).is_some() {
        if let Some(state) = self.flow_states.get_mut(&flow_state) {
          state
            .component_state_mut(&line.target)
            .set_input_data(&line.input, value.clone());
        }
        self.enqueue_if_ready(flow_state, &line.target, Some(index));
        continue;
      }

      // The target may live inside a container's item flow.
      let nested_targets: Vec<FlowStateId> = self
        .flow_states
        .get(&flow_state)
        .map(|state| {
          state
            .children
            .iter()
            .copied()
            .filter(|child| {
              self
                .flow_states
                .get(child)
                .is_some_and(|c| !c.is_finished && c.flow.component(&line.target).is_some())
            })
            .collect()
        })
        .unwrap_or_default();

      if nested_targets.is_empty() {
        self.append_log(
          LogKind::Debug,
          format!(
            "connection line {} targets unknown component '{}'",
            index, line.target
          ),
          Some(flow_state),
          Some(source.to_string()),
          Some(index),
        );
        continue;
      }

      for child in nested_targets {
        if let Some(child_state) = self.flow_states.get_mut(&child) {
          child_state
            .component_state_mut(&line.target)
            .set_input_data(&line.input, value.clone());
        }
        self.enqueue_if_ready(child, &line.target, Some(index));
      }
    }
  }

  /// Deliver a value on an output of the component that spawned
  /// `flow_state` (sub-flow results). No-op for roots.
  pub(crate) fn propagate_to_parent(
    &mut self,
    flow_state: FlowStateId,
    output: &str,
    value: Value,
  ) {
    let Some(state) = self.flow_states.get(&flow_state) else {
      return;
    };
    let (Some(parent), Some(component)) = (state.parent, state.component.clone()) else {
      return;
    };
    self.propagate_value(parent, &component, output, value);
  }

  /// Schedule a component execution if its inputs are ready and it is not
  /// already queued. Readiness: every connected mandatory data input holds
  /// a value, and at least one connected sequence input (or, absent those,
  /// any input) is unread.
  fn enqueue_if_ready(
    &mut self,
    flow_state: FlowStateId,
    component_id: &str,
    connection_line: Option<usize>,
  ) {
    let Some(state) = self.flow_states.get(&flow_state) else {
      return;
    };
    if state.is_finished {
      return;
    }
    let flow = state.flow.clone();
    let Some(component) = flow.component(component_id) else {
      return;
    };
    let graph = flow.graph();

    let empty = ComponentState::default();
    let component_state = state.component_state(component_id).unwrap_or(&empty);

    let data_ready = graph
      .connected_mandatory_inputs(component)
      .iter()
      .all(|input| component_state.input_value(input).is_some());
    if !data_ready {
      return;
    }

    let sequence_inputs = graph.connected_sequence_inputs(component);
    let ready = if sequence_inputs.is_empty() {
      !component_state.unread_inputs().is_empty()
    } else {
      sequence_inputs
        .iter()
        .any(|input| component_state.unread_inputs().contains(*input))
    };
    if !ready {
      return;
    }

    if self.is_queued(flow_state, component_id) {
      return;
    }
    self.push_task(flow_state, component_id.to_string(), connection_line);
  }

  fn is_queued(&self, flow_state: FlowStateId, component_id: &str) -> bool {
    self
      .queue
      .iter()
      .any(|task| task.flow_state == flow_state && task.component == component_id)
  }

  fn push_task(
    &mut self,
    flow_state: FlowStateId,
    component: String,
    connection_line: Option<usize>,
  ) {
    self.next_task_id += 1;
    trace!(%flow_state, component, "task queued");
    self.queue.push_back(QueueTask {
      id: self.next_task_id,
      flow_state,
      component,
      connection_line,
    });
  }

  fn enqueue_sources(&mut self, flow_state: FlowStateId) {
    let Some(state) = self.flow_states.get(&flow_state) else {
      return;
    };
    let flow = state.flow.clone();
    let sources: Vec<String> = flow
      .graph()
      .source_components()
      .iter()
      // catch-error components only fire through error rerouting
      .filter(|component| !matches!(component.kind, ComponentKind::CatchError))
      .map(|component| component.id.clone())
      .collect();
    for component in sources {
      self.push_task(flow_state, component, None);
    }
  }

  // ---------------------------------------------------------------- pump

  /// Process queued tasks until the queue drains, the debugger pauses, or
  /// the runtime stops. Returns the number of tasks taken off the queue.
  pub fn pump(&mut self) -> usize {
    let mut executed = 0;

    while !self.state.is_paused() && !self.state.is_stopped() {
      let Some(front) = self.queue.front() else {
        break;
      };

      if self.state.is_debugger_active() && self.state != RunState::SingleStep {
        let key = self
          .flow_states
          .get(&front.flow_state)
          .map(|state| (state.flow.id.clone(), front.component.clone()));
        if let Some(key) = key {
          if self.breakpoints.contains(&key) && self.last_breakpoint_task != Some(front.id) {
            self.last_breakpoint_task = Some(front.id);
            self.transition(RunAction::Pause);
            break;
          }
        }
      }

      let Some(task) = self.queue.pop_front() else {
        break;
      };
      self.last_breakpoint_task = None;
      self.execute_task(task);
      executed += 1;

      if self.state == RunState::SingleStep {
        self.transition(RunAction::Pause);
        break;
      }
    }

    self.settle_finished();
    executed
  }

  /// Drain external events and pump until nothing is left to do. Pending
  /// timers and other asynchronous work are not waited for - use
  /// [`Runtime::run`] to drive those.
  pub fn run_until_settled(&mut self) -> usize {
    let mut total = 0;
    loop {
      let drained = self.drain_external();
      let executed = self.pump();
      total += executed;
      if self.state.is_paused() || self.state.is_stopped() {
        break;
      }
      if drained == 0 && executed == 0 && self.queue.is_empty() {
        break;
      }
    }
    total
  }

  /// Event-loop driver: pump, then sleep until asynchronous work reports
  /// back or the token cancels. Returns when cancelled, stopped, or every
  /// root flow state has finished.
  pub async fn run(&mut self, cancel: CancellationToken) {
    loop {
      self.run_until_settled();

      if self.state.is_stopped() {
        break;
      }
      let all_roots_finished = self
        .roots
        .iter()
        .all(|id| self.flow_states.get(id).is_none_or(|state| state.is_finished));
      if all_roots_finished {
        self.stop_runtime();
        break;
      }

      tokio::select! {
        _ = cancel.cancelled() => {
          self.stop_runtime();
          break;
        }
        event = self.external_rx.recv() => match event {
          Some(event) => self.apply_external(event),
          None => break,
        }
      }
    }
  }

  fn drain_external(&mut self) -> usize {
    let mut drained = 0;
    while let Ok(event) = self.external_rx.try_recv() {
      self.apply_external(event);
      drained += 1;
    }
    drained
  }

  fn apply_external(&mut self, event: ExternalEvent) {
    match event {
      ExternalEvent::Propagate {
        flow_state,
        component,
        output,
        value,
      } => self.propagate_value(flow_state, &component, &output, value),
    }
  }

  pub(crate) fn external_sender(&self) -> mpsc::UnboundedSender<ExternalEvent> {
    self.external_tx.clone()
  }

  fn execute_task(&mut self, task: QueueTask) {
    let Some(state) = self.flow_states.get(&task.flow_state) else {
      return;
    };
    if state.is_finished {
      return;
    }
    let flow = state.flow.clone();
    let Some(component) = flow.component(&task.component) else {
      self.append_log(
        LogKind::Debug,
        format!(
          "component '{}' vanished from flow '{}'",
          task.component, flow.id
        ),
        Some(task.flow_state),
        Some(task.component.clone()),
        task.connection_line,
      );
      return;
    };

    let tag = component.kind.tag().to_string();
    let Some(handler) = self.registry.handler(&tag) else {
      self.throw_error(
        task.flow_state,
        &task.component,
        task.connection_line,
        format!("no handler for component kind '{}'", tag),
      );
      return;
    };

    info!(
      run_id = %self.run_id,
      flow_state = %task.flow_state,
      component = %task.component,
      kind = %tag,
      "component_started"
    );

    let mut ctx = ExecuteContext {
      runtime: self,
      flow_state: task.flow_state,
      component: task.component.clone(),
      connection_line: task.connection_line,
    };
    let result = handler.execute(&mut ctx);

    match result {
      Ok(ExecuteResult::Done) => {
        info!(flow_state = %task.flow_state, component = %task.component, "component_completed");
      }
      Ok(ExecuteResult::Subscription(token)) => {
        if let Some(state) = self.flow_states.get_mut(&task.flow_state) {
          let superseded = state
            .component_state_mut(&task.component)
            .replace_subscription(token);
          if let Some(old) = superseded {
            old.cancel();
          }
        }
        info!(
          flow_state = %task.flow_state,
          component = %task.component,
          "component_subscribed"
        );
      }
      Err(error) => {
        self.throw_error(
          task.flow_state,
          &task.component,
          task.connection_line,
          error.to_string(),
        );
      }
    }

    // Whatever the handler did not consume counts as read now.
    if let Some(state) = self.flow_states.get_mut(&task.flow_state) {
      state.component_state_mut(&task.component).mark_inputs_read();
    }
  }

  // ---------------------------------------------------------------- errors

  /// Record a component failure: log it, reroute it to the nearest
  /// catch-error component, or mark the flow state (and for roots the
  /// whole run) as errored. Sibling branches keep executing.
  fn throw_error(
    &mut self,
    flow_state: FlowStateId,
    component: &str,
    connection_line: Option<usize>,
    message: String,
  ) {
    tracing::error!(
      run_id = %self.run_id,
      flow_state = %flow_state,
      component = component,
      error = %message,
      "component_failed"
    );
    self.append_log(
      LogKind::Error,
      message.clone(),
      Some(flow_state),
      Some(component.to_string()),
      connection_line,
    );
    self.notify(RuntimeEvent::FlowError {
      flow_state,
      error: message.clone(),
    });

    // A catch-error component in this flow or any ancestor intercepts.
    let mut cursor = Some(flow_state);
    while let Some(id) = cursor {
      let Some(state) = self.flow_states.get(&id) else {
        break;
      };
      let catcher = state
        .flow
        .components
        .iter()
        .find(|candidate| {
          matches!(candidate.kind, ComponentKind::CatchError)
            && !(id == flow_state && candidate.id == component)
        })
        .map(|candidate| candidate.id.clone());

      if let Some(catcher) = catcher {
        if let Some(state) = self.flow_states.get_mut(&id) {
          state
            .component_state_mut(&catcher)
            .set_input_data("message", Value::String(message));
        }
        self.enqueue_if_ready(id, &catcher, None);
        return;
      }
      cursor = state.parent;
    }

    if let Some(state) = self.flow_states.get_mut(&flow_state) {
      if state.error.is_none() {
        state.error = Some(message.clone());
      }
      if state.parent.is_none() && self.error.is_none() {
        self.error = Some(message);
      }
    }
  }

  // ---------------------------------------------------------------- lifecycle

  fn create_flow_state(
    &mut self,
    flow: Arc<Flow>,
    parent: Option<FlowStateId>,
    component: Option<String>,
    index: Option<usize>,
    overrides: HashMap<String, Value>,
  ) -> FlowStateId {
    let parent_context = parent
      .and_then(|id| self.flow_states.get(&id))
      .map(|state| state.data_context.clone())
      .unwrap_or_else(|| self.globals.clone());
    let base = if overrides.is_empty() {
      parent_context
    } else {
      parent_context.create_with_default_value_overrides(overrides)
    };
    let data_context = base.create_with_local_variables(flow.local_variables.clone());

    self.next_flow_state_id += 1;
    let id = FlowStateId(self.next_flow_state_id);
    let state = FlowState::new(id, flow.clone(), data_context, parent, component, index);
    self.flow_states.insert(id, state);

    match parent.and_then(|pid| self.flow_states.get_mut(&pid)) {
      Some(parent_state) => parent_state.children.push(id),
      None => self.roots.push(id),
    }

    info!(run_id = %self.run_id, flow = %flow.id, flow_state = %id, "flow_state_created");
    self.notify(RuntimeEvent::FlowStateCreated {
      flow_state: id,
      flow: flow.id.clone(),
      parent,
    });
    id
  }

  /// Mark flow states finished, bottom-up, until a fixpoint: a flow state
  /// finishes when it has no queued work, no live subscriptions, and all
  /// its children are finished.
  fn settle_finished(&mut self) {
    loop {
      let mut finished_now: Vec<FlowStateId> = self
        .flow_states
        .values()
        .filter(|state| !state.is_finished)
        .filter(|state| {
          state.children.iter().all(|child| {
            self
              .flow_states
              .get(child)
              .is_none_or(|child_state| child_state.is_finished)
          })
        })
        .filter(|state| !self.queue.iter().any(|task| task.flow_state == state.id))
        .filter(|state| !state.has_live_subscription())
        .map(|state| state.id)
        .collect();

      if finished_now.is_empty() {
        break;
      }
      finished_now.sort();
      for id in finished_now {
        self.finish_flow_state(id, true);
      }
    }
  }

  /// Mark one flow state finished. When `notify_caller` is set and the
  /// state was spawned by a call-action component, the caller's `@seqout`
  /// fires - a stopped flow never triggers its caller.
  fn finish_flow_state(&mut self, flow_state: FlowStateId, notify_caller: bool) {
    let Some(state) = self.flow_states.get_mut(&flow_state) else {
      return;
    };
    if state.is_finished {
      return;
    }
    state.is_finished = true;
    let label = state.label().to_string();
    let parent = state.parent;
    let component = state.component.clone();

    self.append_log(
      LogKind::Info,
      format!("flow '{}' finished", label),
      Some(flow_state),
      None,
      None,
    );
    self.notify(RuntimeEvent::FlowStateFinished { flow_state });

    if notify_caller {
      if let (Some(parent_id), Some(component_id)) = (parent, component) {
        let is_call = self
          .flow_states
          .get(&parent_id)
          .and_then(|parent_state| parent_state.flow.component(&component_id))
          .is_some_and(|caller| matches!(caller.kind, ComponentKind::CallAction { .. }));
        if is_call {
          self.propagate_value(parent_id, &component_id, SEQ_OUT, Value::Null);
        }
      }
    }
  }

  /// Tear a container child (and its subtree) down and remove it from the
  /// tree: subscriptions cancelled exactly once, queued work dropped,
  /// states deleted.
  pub(crate) fn dispose_flow_state(&mut self, flow_state: FlowStateId) {
    let parent = self
      .flow_states
      .get(&flow_state)
      .and_then(|state| state.parent);

    for id in self.subtree_post_order(flow_state) {
      self.cancel_subscriptions(id);
      self.remove_queue_tasks(id);
      self.notify(RuntimeEvent::FlowStateDisposed { flow_state: id });
      self.flow_states.remove(&id);
    }

    match parent.and_then(|pid| self.flow_states.get_mut(&pid)) {
      Some(parent_state) => parent_state.children.retain(|child| *child != flow_state),
      None => self.roots.retain(|root| *root != flow_state),
    }
  }

  /// Prune finished flow states that no log item references - the backing
  /// operation of the debugger's "show finished flows" filter.
  pub fn cleanup_finished(&mut self) {
    let removable: Vec<FlowStateId> = self
      .flow_states
      .values()
      .filter(|state| state.is_finished && !self.logs.references_flow_state(state.id))
      .map(|state| state.id)
      .collect();

    for id in removable {
      // A subtree may already have gone with an earlier ancestor.
      if self.flow_states.contains_key(&id) {
        self.dispose_flow_state(id);
      }
    }
  }

  fn subtree_post_order(&self, flow_state: FlowStateId) -> Vec<FlowStateId> {
    let mut order = Vec::new();
    self.collect_post_order(flow_state, &mut order);
    order
  }

  fn collect_post_order(&self, flow_state: FlowStateId, out: &mut Vec<FlowStateId>) {
    if let Some(state) = self.flow_states.get(&flow_state) {
      for child in &state.children {
        self.collect_post_order(*child, out);
      }
    }
    out.push(flow_state);
  }

  // ---------------------------------------------------------------- containers

  pub(crate) fn settle_list_children(
    &mut self,
    flow_state: FlowStateId,
    component: &str,
    data: &str,
    item_flow: &str,
  ) -> Result<(), ComponentError> {
    let Some(state) = self.flow_states.get(&flow_state) else {
      return Ok(());
    };
    let count = state.data_context.count(data);
    let flow = self
      .flows
      .get(item_flow)
      .cloned()
      .ok_or_else(|| ComponentError::failed(format!("unknown item flow '{}'", item_flow)))?;

    let existing: Vec<(FlowStateId, Option<usize>)> = self.children_of_component(flow_state, component);

    let mut present = HashSet::new();
    for (child, index) in existing {
      match index {
        Some(index) if index < count => {
          present.insert(index);
        }
        _ => self.dispose_flow_state(child),
      }
    }

    for index in 0..count {
      if present.contains(&index) {
        continue;
      }
      let overrides = HashMap::from([(ITERATOR_VARIABLE.to_string(), json!(index))]);
      let child = self.create_flow_state(
        flow.clone(),
        Some(flow_state),
        Some(component.to_string()),
        Some(index),
        overrides,
      );
      self.enqueue_sources(child);
    }

    Ok(())
  }

  pub(crate) fn settle_select_child(
    &mut self,
    flow_state: FlowStateId,
    component: &str,
    data: &str,
    branches: &[String],
  ) -> Result<(), ComponentError> {
    let existing = self.children_of_component(flow_state, component);

    if branches.is_empty() {
      for (child, _) in existing {
        self.dispose_flow_state(child);
      }
      return Ok(());
    }

    let Some(state) = self.flow_states.get(&flow_state) else {
      return Ok(());
    };
    let raw = state.data_context.get_enum_value(data);
    let selected = if raw >= 0 && (raw as usize) < branches.len() {
      raw as usize
    } else {
      // Out-of-range or unbound selection falls back to the first branch.
      0
    };
    let branch_flow_id = &branches[selected];
    let flow = self
      .flows
      .get(branch_flow_id)
      .cloned()
      .ok_or_else(|| ComponentError::failed(format!("unknown branch flow '{}'", branch_flow_id)))?;

    let mut kept = false;
    for (child, index) in existing {
      let matches_branch = index == Some(selected)
        && self
          .flow_states
          .get(&child)
          .is_some_and(|child_state| child_state.flow.id == *branch_flow_id);
      if matches_branch && !kept {
        kept = true;
      } else {
        self.dispose_flow_state(child);
      }
    }

    if !kept {
      let overrides = HashMap::from([(SELECTED_VARIABLE.to_string(), json!(selected))]);
      let child = self.create_flow_state(
        flow,
        Some(flow_state),
        Some(component.to_string()),
        Some(selected),
        overrides,
      );
      self.enqueue_sources(child);
    }

    Ok(())
  }

  pub(crate) fn spawn_action_child(
    &mut self,
    flow_state: FlowStateId,
    component: &str,
    flow_id: &str,
  ) -> Result<FlowStateId, ComponentError> {
    let flow = self
      .flows
      .get(flow_id)
      .cloned()
      .ok_or_else(|| ComponentError::failed(format!("unknown action flow '{}'", flow_id)))?;
    let child = self.create_flow_state(
      flow,
      Some(flow_state),
      Some(component.to_string()),
      None,
      HashMap::new(),
    );
    self.enqueue_sources(child);
    Ok(child)
  }

  fn children_of_component(
    &self,
    flow_state: FlowStateId,
    component: &str,
  ) -> Vec<(FlowStateId, Option<usize>)> {
    self
      .flow_states
      .get(&flow_state)
      .map(|state| {
        state
          .children
          .iter()
          .filter_map(|child| self.flow_states.get(child))
          .filter(|child_state| child_state.component.as_deref() == Some(component))
          .map(|child_state| (child_state.id, child_state.index))
          .collect()
      })
      .unwrap_or_default()
  }

  /// Re-schedule every container component of a flow state so it
  /// reconciles its children against current data. The rendering layer
  /// calls this when a bound data source changes.
  pub fn refresh_containers(&mut self, flow_state: FlowStateId) {
    let Some(state) = self.flow_states.get(&flow_state) else {
      return;
    };
    if state.is_finished {
      return;
    }
    let flow = state.flow.clone();
    let containers: Vec<String> = flow
      .components
      .iter()
      .filter(|component| {
        matches!(
          component.kind,
          ComponentKind::List { .. } | ComponentKind::Grid { .. } | ComponentKind::Select { .. }
        )
      })
      .map(|component| component.id.clone())
      .collect();
    for component in containers {
      if !self.is_queued(flow_state, &component) {
        self.push_task(flow_state, component, None);
      }
    }
  }

  // ---------------------------------------------------------------- widget actions

  /// Dispatch a user interaction on a widget component: propagate on its
  /// wired `action` output, or spawn its named action flow as a child flow
  /// state; missing configuration is logged as an error item.
  pub fn execute_widget_action(&mut self, flow_state: FlowStateId, component: &str) {
    if self.state.is_stopped() {
      return;
    }
    let Some(state) = self.flow_states.get(&flow_state) else {
      return;
    };
    if state.is_finished {
      return;
    }
    let flow = state.flow.clone();
    let iterator = state
      .data_context
      .get(ITERATOR_VARIABLE)
      .unwrap_or(Value::Null);
    let Some(component_def) = flow.component(component) else {
      return;
    };

    if flow.graph().has_outgoing(component, "action") {
      self.propagate_value(flow_state, component, "action", iterator);
      return;
    }

    match &component_def.kind {
      ComponentKind::Widget {
        action: Some(action),
      } => {
        let action = action.clone();
        match self.flows.get(&action).cloned() {
          Some(action_flow) => {
            let child = self.create_flow_state(
              action_flow.clone(),
              Some(flow_state),
              Some(component.to_string()),
              None,
              HashMap::new(),
            );
            self.append_log(
              LogKind::Info,
              format!("execute widget action '{}'", action),
              Some(child),
              Some(component.to_string()),
              None,
            );
            // Entry points fire with the iterator value; other sources are
            // scheduled normally.
            let sources: Vec<(String, bool)> = action_flow
              .graph()
              .source_components()
              .iter()
              .map(|source| {
                (
                  source.id.clone(),
                  matches!(source.kind, ComponentKind::Start),
                )
              })
              .collect();
            for (source, is_start) in sources {
              if is_start {
                self.propagate_value(child, &source, SEQ_OUT, iterator.clone());
              } else {
                self.push_task(child, source, None);
              }
            }
          }
          None => {
            self.append_log(
              LogKind::Error,
              format!("widget action not found: {}", action),
              Some(flow_state),
              Some(component.to_string()),
              None,
            );
          }
        }
      }
      _ => {
        self.append_log(
          LogKind::Error,
          "widget action not defined",
          Some(flow_state),
          Some(component.to_string()),
          None,
        );
      }
    }
  }

  // ---------------------------------------------------------------- queries

  pub fn flow_state(&self, id: FlowStateId) -> Option<&FlowState> {
    self.flow_states.get(&id)
  }

  pub(crate) fn flow_state_mut(&mut self, id: FlowStateId) -> Option<&mut FlowState> {
    self.flow_states.get_mut(&id)
  }

  pub fn root_flow_states(&self) -> &[FlowStateId] {
    &self.roots
  }

  /// Depth-first traversal of the flow-state tree: children after their
  /// parent, siblings by creation time.
  pub fn flow_state_tree(&self) -> Vec<FlowStateId> {
    let mut out = Vec::new();
    for root in &self.roots {
      self.collect_pre_order(*root, &mut out);
    }
    out
  }

  fn collect_pre_order(&self, flow_state: FlowStateId, out: &mut Vec<FlowStateId>) {
    out.push(flow_state);
    if let Some(state) = self.flow_states.get(&flow_state) {
      for child in &state.children {
        self.collect_pre_order(*child, out);
      }
    }
  }

  /// First flow state (pre-order) executing the named flow, preferring
  /// unfinished ones.
  pub fn find_flow_state(&self, flow_id: &str) -> Option<FlowStateId> {
    let tree = self.flow_state_tree();
    tree
      .iter()
      .copied()
      .find(|id| {
        self
          .flow_states
          .get(id)
          .is_some_and(|state| state.flow.id == flow_id && !state.is_finished)
      })
      .or_else(|| {
        tree.into_iter().find(|id| {
          self
            .flow_states
            .get(id)
            .is_some_and(|state| state.flow.id == flow_id)
        })
      })
  }

  pub fn queue(&self) -> impl Iterator<Item = &QueueTask> {
    self.queue.iter()
  }

  // ---------------------------------------------------------------- selection

  pub fn select_flow_state(&mut self, flow_state: Option<FlowStateId>) {
    self.selected_flow_state = flow_state.filter(|id| self.flow_states.contains_key(id));
  }

  pub fn selected_flow_state(&self) -> Option<FlowStateId> {
    self.selected_flow_state
  }

  /// Select a log item; when the item references a flow state the
  /// flow-state cursor follows and a `ShowFlowState` event fires so the
  /// editor can reveal it. Idempotent.
  pub fn select_log_item(&mut self, item: LogItemId) {
    let flow_state = self.logs.select(item).and_then(|entry| entry.flow_state);
    if let Some(flow_state) = flow_state {
      if self.flow_states.contains_key(&flow_state) {
        self.selected_flow_state = Some(flow_state);
        self.notify(RuntimeEvent::ShowFlowState { flow_state });
      }
    }
  }

  pub fn selected_log_item(&self) -> Option<&LogItem> {
    self.logs.selected()
  }

  pub fn select_queue_task(&mut self, task: u64) {
    if let Some(task) = self.queue.iter().find(|queued| queued.id == task) {
      let flow_state = task.flow_state;
      self.selected_queue_task = Some(task.id);
      self.selected_flow_state = Some(flow_state);
      self.notify(RuntimeEvent::ShowFlowState { flow_state });
    }
  }

  pub fn selected_queue_task(&self) -> Option<&QueueTask> {
    self
      .selected_queue_task
      .and_then(|id| self.queue.iter().find(|task| task.id == id))
  }

  // ---------------------------------------------------------------- internals

  pub(crate) fn backend(&self) -> Arc<dyn EvalBackend> {
    self.backend.clone()
  }

  pub(crate) fn append_log(
    &mut self,
    kind: LogKind,
    message: impl Into<String>,
    flow_state: Option<FlowStateId>,
    component: Option<String>,
    connection_line: Option<usize>,
  ) -> LogItemId {
    let id = self
      .logs
      .append(kind, message, flow_state, component, connection_line);
    self.notify(RuntimeEvent::LogAppended { item: id, kind });
    id
  }

  fn notify(&self, event: RuntimeEvent) {
    self.notifier.notify(event);
  }
}
