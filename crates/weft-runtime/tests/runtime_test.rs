//! Integration tests for Runtime: propagation, execution, and errors.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use weft_flow::{Component, ComponentKind, Flow, Pin, Project, SEQ_IN, SEQ_OUT};
use weft_runtime::{
  ComponentError, ComponentHandler, ComponentRegistry, ExecuteContext, ExecuteResult, LogFilter,
  LogKind, Runtime, RunningState, StartError,
};

/// start --@seqout--> set-value(x = 5) --value/@seqout--> output
fn scenario_a_project() -> Project {
  let main = Flow::new("main")
    .with_component(Component::new("begin", ComponentKind::Start))
    .with_component(Component::new(
      "assign",
      ComponentKind::SetValue {
        variable: Some("x".to_string()),
        value: "5".to_string(),
      },
    ))
    .with_component(Component::new("out", ComponentKind::Output { name: None }))
    .connect("begin", SEQ_OUT, "assign", SEQ_IN)
    .connect("assign", "value", "out", "value")
    .connect("assign", SEQ_OUT, "out", SEQ_IN);

  Project::new("test").with_flow(main)
}

fn fan_out_project() -> Project {
  let main = Flow::new("main")
    .with_component(Component::new("begin", ComponentKind::Start))
    .with_component(Component::new("left", ComponentKind::Log { message: None }))
    .with_component(Component::new("right", ComponentKind::Log { message: None }))
    .connect("begin", SEQ_OUT, "left", SEQ_IN)
    .connect("begin", SEQ_OUT, "right", SEQ_IN);

  Project::new("test").with_flow(main)
}

/// Handler that fails with a fixed message.
struct ExplodeHandler;

impl ComponentHandler for ExplodeHandler {
  fn execute(&self, _ctx: &mut ExecuteContext<'_>) -> Result<ExecuteResult, ComponentError> {
    Err(ComponentError::failed("boom"))
  }
}

/// Handler that registers a fresh subscription and counts its disposals.
struct ProbeHandler {
  disposed: Arc<AtomicUsize>,
}

impl ComponentHandler for ProbeHandler {
  fn execute(&self, _ctx: &mut ExecuteContext<'_>) -> Result<ExecuteResult, ComponentError> {
    let token = CancellationToken::new();
    let watcher = token.clone();
    let disposed = self.disposed.clone();
    tokio::spawn(async move {
      watcher.cancelled().await;
      disposed.fetch_add(1, Ordering::SeqCst);
    });
    Ok(ExecuteResult::Subscription(token))
  }
}

fn custom_component(id: &str, component_type: &str) -> Component {
  let mut component = Component::new(
    id,
    ComponentKind::Custom {
      component_type: component_type.to_string(),
      config: json!({}),
    },
  );
  component.inputs.push(Pin::sequence(SEQ_IN));
  component.outputs.push(Pin::sequence(SEQ_OUT));
  component
}

#[test]
fn scenario_a_value_reaches_output_and_flow_finishes() {
  let mut runtime = Runtime::new(scenario_a_project());
  let fs = runtime.start("main").unwrap();
  runtime.run_until_settled();

  let state = runtime.flow_state(fs).unwrap();
  let out = state.component_state("out").unwrap();
  assert_eq!(out.input_value("value"), Some(&json!(5)));
  assert!(out.unread_inputs().is_empty());
  assert!(state.is_finished);
  assert!(state.error.is_none());
  assert_eq!(state.data_context.get("x"), Some(json!(5)));
}

#[test]
fn propagation_records_unread_values_on_every_connected_target() {
  let mut runtime = Runtime::new(fan_out_project());
  let fs = runtime.start("main").unwrap();

  // No pump yet: propagation must record synchronously, not execute.
  runtime.propagate_value(fs, "begin", SEQ_OUT, json!(42));

  let state = runtime.flow_state(fs).unwrap();
  for target in ["left", "right"] {
    let component_state = state.component_state(target).unwrap();
    assert!(component_state.unread_inputs().contains(SEQ_IN));
    assert_eq!(component_state.input_value(SEQ_IN), Some(&json!(42)));
  }
}

#[test]
fn propagation_on_unconnected_output_is_a_no_op() {
  let main = Flow::new("main")
    .with_component(Component::new("begin", ComponentKind::Start))
    .with_component(Component::new("other", ComponentKind::Log { message: None }));
  let mut runtime = Runtime::new(Project::new("test").with_flow(main));
  let fs = runtime.start("main").unwrap();

  runtime.propagate_value(fs, "begin", SEQ_OUT, json!("dropped"));

  let state = runtime.flow_state(fs).unwrap();
  assert!(state.component_state("other").is_none());
}

#[test]
fn propagation_to_missing_target_drops_with_debug_log() {
  let main = Flow::new("main")
    .with_component(Component::new("begin", ComponentKind::Start))
    .with_component(Component::new("other", ComponentKind::Log { message: None }))
    .connect("begin", SEQ_OUT, "removed", SEQ_IN);
  let mut runtime = Runtime::new(Project::new("test").with_flow(main));
  let fs = runtime.start("main").unwrap();

  runtime.propagate_value(fs, "begin", SEQ_OUT, json!(1));

  let state = runtime.flow_state(fs).unwrap();
  assert!(state.component_state("other").is_none());
  assert!(
    runtime
      .logs()
      .items()
      .iter()
      .any(|item| item.kind == LogKind::Debug && item.message.contains("removed"))
  );
}

#[test]
fn scenario_c_component_error_is_contained() {
  let main = Flow::new("main")
    .with_component(Component::new("begin", ComponentKind::Start))
    .with_component(custom_component("bomb", "explode"))
    .with_component(Component::new("after", ComponentKind::Log { message: None }))
    .connect("begin", SEQ_OUT, "bomb", SEQ_IN)
    .connect("bomb", SEQ_OUT, "after", SEQ_IN);

  let mut registry = ComponentRegistry::builtin();
  registry.register("explode", Arc::new(ExplodeHandler));

  let mut runtime = Runtime::new(Project::new("test").with_flow(main)).with_registry(registry);
  let fs = runtime.start("main").unwrap();
  runtime.run_until_settled();

  let state = runtime.flow_state(fs).unwrap();
  assert_eq!(state.error.as_deref(), Some("boom"));
  // Root flow failed, so the whole run is marked failed.
  assert_eq!(runtime.error(), Some("boom"));

  let errors = runtime.logs().filter(LogFilter::Error);
  assert_eq!(errors.len(), 1);
  assert_eq!(errors[0].component.as_deref(), Some("bomb"));

  // Downstream components never received anything.
  let after = runtime.flow_state(fs).unwrap().component_state("after");
  assert!(after.is_none_or(|state| state.unread_inputs().is_empty()));
}

#[test]
fn catch_error_intercepts_component_failures() {
  let main = Flow::new("main")
    .with_component(Component::new("begin", ComponentKind::Start))
    .with_component(custom_component("bomb", "explode"))
    .with_component(Component::new("catch", ComponentKind::CatchError))
    .connect("begin", SEQ_OUT, "bomb", SEQ_IN);

  let mut registry = ComponentRegistry::builtin();
  registry.register("explode", Arc::new(ExplodeHandler));

  let mut runtime = Runtime::new(Project::new("test").with_flow(main)).with_registry(registry);
  let fs = runtime.start("main").unwrap();
  runtime.run_until_settled();

  let state = runtime.flow_state(fs).unwrap();
  // The error was rerouted, not recorded on the flow.
  assert!(state.error.is_none());
  assert!(runtime.error().is_none());
  assert_eq!(
    state.component_state("catch").unwrap().input_value("message"),
    Some(&json!("boom"))
  );
  // It still shows up in the log for the debugger.
  assert_eq!(runtime.logs().filter(LogFilter::Error).len(), 1);
}

#[tokio::test]
async fn stop_invokes_each_disposer_exactly_once() {
  let disposed = Arc::new(AtomicUsize::new(0));

  let main = Flow::new("main").with_component(custom_component("probe", "probe"));
  let mut registry = ComponentRegistry::builtin();
  registry.register(
    "probe",
    Arc::new(ProbeHandler {
      disposed: disposed.clone(),
    }),
  );

  let mut runtime = Runtime::new(Project::new("test").with_flow(main)).with_registry(registry);
  let fs = runtime.start("main").unwrap();
  runtime.run_until_settled();

  let state = runtime.flow_state(fs).unwrap();
  assert!(state.has_live_subscription());
  assert!(!state.is_finished);

  runtime.stop(fs);
  runtime.stop(fs);
  tokio::time::sleep(Duration::from_millis(50)).await;

  assert_eq!(disposed.load(Ordering::SeqCst), 1);
  let state = runtime.flow_state(fs).unwrap();
  assert!(state.is_finished);
  assert!(!state.has_live_subscription());
}

#[tokio::test]
async fn timer_fires_through_the_external_channel() {
  let main = Flow::new("main")
    .with_component(Component::new(
      "tick",
      ComponentKind::Timer {
        interval_ms: 10,
        repeat: false,
      },
    ))
    .with_component(Component::new(
      "after",
      ComponentKind::Log {
        message: Some("ticked".to_string()),
      },
    ))
    .connect("tick", SEQ_OUT, "after", SEQ_IN);

  let mut runtime = Runtime::new(Project::new("test").with_flow(main));
  runtime.start("main").unwrap();
  runtime.run_until_settled();

  // The tick has not fired yet; nothing logged.
  assert!(
    !runtime
      .logs()
      .items()
      .iter()
      .any(|item| item.message == "ticked")
  );

  tokio::time::sleep(Duration::from_millis(50)).await;
  runtime.run_until_settled();

  assert!(
    runtime
      .logs()
      .items()
      .iter()
      .any(|item| item.message == "ticked")
  );
}

#[test]
fn counter_running_state_survives_across_executions() {
  let main = Flow::new("main")
    .with_component(Component::new("begin", ComponentKind::Start))
    .with_component(Component::new("count", ComponentKind::Counter))
    .with_component(Component::new("keep", ComponentKind::Widget { action: None }))
    .connect("begin", SEQ_OUT, "count", SEQ_IN);

  let mut runtime = Runtime::new(Project::new("test").with_flow(main));
  let fs = runtime.start("main").unwrap();
  runtime.run_until_settled();

  let state = runtime.flow_state(fs).unwrap();
  assert_eq!(
    state.running_state("count"),
    Some(&RunningState::Counter(1))
  );

  // Trigger a second execution; the persistent count advances.
  runtime.propagate_value(fs, "begin", SEQ_OUT, json!(null));
  runtime.run_until_settled();

  let state = runtime.flow_state(fs).unwrap();
  assert_eq!(
    state.running_state("count"),
    Some(&RunningState::Counter(2))
  );
}

#[test]
fn scpi_traffic_lands_in_the_scpi_filter() {
  let main = Flow::new("main")
    .with_component(Component::new("begin", ComponentKind::Start))
    .with_component(Component::new(
      "idn",
      ComponentKind::Scpi {
        command: "*IDN?".to_string(),
      },
    ))
    .connect("begin", SEQ_OUT, "idn", SEQ_IN);

  let mut runtime = Runtime::new(Project::new("test").with_flow(main));
  runtime.start("main").unwrap();
  runtime.run_until_settled();

  let scpi = runtime.logs().filter(LogFilter::Scpi);
  assert_eq!(scpi.len(), 1);
  assert_eq!(scpi[0].message, "*IDN?");
  assert!(runtime.logs().filter(LogFilter::Error).is_empty());
}

#[test]
fn start_unknown_flow_fails_without_partial_state() {
  let mut runtime = Runtime::new(Project::new("test"));
  assert!(matches!(
    runtime.start("missing"),
    Err(StartError::UnknownFlow { .. })
  ));
  assert!(runtime.flow_state_tree().is_empty());
}

#[test]
fn start_empty_flow_fails() {
  let mut runtime = Runtime::new(Project::new("test").with_flow(Flow::new("empty")));
  assert!(matches!(
    runtime.start("empty"),
    Err(StartError::EmptyFlow { .. })
  ));
  assert!(runtime.flow_state_tree().is_empty());
}

#[test]
fn start_unregistered_component_kind_fails() {
  let main = Flow::new("main").with_component(custom_component("mystery", "no-such-kind"));
  let mut runtime = Runtime::new(Project::new("test").with_flow(main));

  assert!(matches!(
    runtime.start("main"),
    Err(StartError::UnknownComponentKind { .. })
  ));
  assert!(runtime.flow_state_tree().is_empty());
}

#[test]
fn start_after_stop_is_rejected() {
  let mut runtime = Runtime::new(scenario_a_project());
  runtime.start("main").unwrap();
  runtime.stop_runtime();

  assert!(matches!(runtime.start("main"), Err(StartError::Stopped)));
}
