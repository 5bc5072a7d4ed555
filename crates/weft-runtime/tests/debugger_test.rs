//! Debugger surface: run state machine, breakpoints, selection cursors,
//! tree ordering, finished-state cleanup, and event transport.

use serde_json::json;
use tokio::sync::mpsc;
use weft_flow::{Component, ComponentKind, Flow, Project, SEQ_IN, SEQ_OUT};
use weft_runtime::{
  ChannelNotifier, LogKind, RunState, Runtime, RuntimeEvent,
};

fn chain_project() -> Project {
  let main = Flow::new("main")
    .with_component(Component::new("begin", ComponentKind::Start))
    .with_component(Component::new(
      "s1",
      ComponentKind::Log {
        message: Some("one".to_string()),
      },
    ))
    .with_component(Component::new(
      "s2",
      ComponentKind::Log {
        message: Some("two".to_string()),
      },
    ))
    .connect("begin", SEQ_OUT, "s1", SEQ_IN)
    .connect("s1", SEQ_OUT, "s2", SEQ_IN);

  Project::new("test").with_flow(main)
}

fn list_project() -> Project {
  let page = Flow::new("page")
    .with_component(Component::new(
      "items",
      ComponentKind::List {
        data: "readings".to_string(),
        item_flow: "item".to_string(),
      },
    ))
    .with_component(Component::new("keep", ComponentKind::Widget { action: None }));
  let item = Flow::new("item").with_component(Component::new("begin", ComponentKind::Start));

  Project::new("test")
    .with_flow(page)
    .with_flow(item)
    .with_global_variable("readings", json!([1, 2]))
}

#[test]
fn pump_does_nothing_while_paused() {
  let mut runtime = Runtime::new(chain_project());
  runtime.start("main").unwrap();
  runtime.pause();
  assert_eq!(runtime.state(), RunState::Paused);

  assert_eq!(runtime.pump(), 0);
  assert!(runtime.logs().items().is_empty());
}

#[test]
fn single_step_executes_exactly_one_task_then_pauses() {
  let mut runtime = Runtime::new(chain_project());
  runtime.start("main").unwrap();
  runtime.pause();

  assert_eq!(runtime.single_step(), 1); // begin
  assert_eq!(runtime.state(), RunState::Paused);
  assert_eq!(runtime.single_step(), 1); // s1
  assert!(
    runtime
      .logs()
      .items()
      .iter()
      .any(|item| item.message == "one")
  );
  assert!(
    !runtime
      .logs()
      .items()
      .iter()
      .any(|item| item.message == "two")
  );

  runtime.toggle_debugger();
  assert_eq!(runtime.state(), RunState::Running);
  runtime.run_until_settled();
  assert!(
    runtime
      .logs()
      .items()
      .iter()
      .any(|item| item.message == "two")
  );
}

#[test]
fn breakpoint_pauses_before_the_component_executes() {
  let mut runtime = Runtime::new(chain_project());
  runtime.add_breakpoint("main", "s1");
  runtime.start_runtime(true);
  runtime.start("main").unwrap();
  assert_eq!(runtime.state(), RunState::Paused);

  runtime.resume();
  assert_eq!(runtime.state(), RunState::Resumed);
  runtime.run_until_settled();

  // Paused at s1: begin ran, s1 did not.
  assert_eq!(runtime.state(), RunState::Paused);
  assert!(
    !runtime
      .logs()
      .items()
      .iter()
      .any(|item| item.message == "one")
  );
  assert_eq!(runtime.queue().next().map(|task| task.component.as_str()), Some("s1"));

  // Stepping executes the breakpointed component.
  runtime.single_step();
  assert!(
    runtime
      .logs()
      .items()
      .iter()
      .any(|item| item.message == "one")
  );
}

#[test]
fn breakpoints_are_ignored_without_the_debugger() {
  let mut runtime = Runtime::new(chain_project());
  runtime.add_breakpoint("main", "s1");
  runtime.start("main").unwrap();
  runtime.run_until_settled();

  assert!(
    runtime
      .logs()
      .items()
      .iter()
      .any(|item| item.message == "two")
  );
}

#[test]
fn flow_state_tree_lists_children_after_their_parent() {
  let mut runtime = Runtime::new(list_project());
  let page = runtime.start("page").unwrap();
  runtime.run_until_settled();

  let tree = runtime.flow_state_tree();
  assert_eq!(tree.len(), 3);
  assert_eq!(tree[0], page);
  let children = &runtime.flow_state(page).unwrap().children;
  assert_eq!(&tree[1..], children.as_slice());
  // Siblings in creation (index) order.
  assert_eq!(runtime.flow_state(tree[1]).unwrap().index, Some(0));
  assert_eq!(runtime.flow_state(tree[2]).unwrap().index, Some(1));
}

#[test]
fn selecting_a_log_item_repoints_the_flow_state_cursor() {
  let (sender, mut receiver) = mpsc::unbounded_channel();
  let mut runtime =
    Runtime::new(chain_project()).with_notifier(std::sync::Arc::new(ChannelNotifier::new(sender)));
  let fs = runtime.start("main").unwrap();
  runtime.run_until_settled();

  let item = runtime
    .logs()
    .items()
    .iter()
    .find(|item| item.flow_state == Some(fs))
    .map(|item| item.id)
    .unwrap();

  runtime.select_log_item(item);
  assert_eq!(runtime.selected_flow_state(), Some(fs));
  assert_eq!(runtime.selected_log_item().map(|entry| entry.id), Some(item));

  // Selection is idempotent.
  runtime.select_log_item(item);
  assert_eq!(runtime.selected_flow_state(), Some(fs));

  let mut show_events = 0;
  while let Ok(event) = receiver.try_recv() {
    if matches!(event, RuntimeEvent::ShowFlowState { flow_state } if flow_state == fs) {
      show_events += 1;
    }
  }
  assert_eq!(show_events, 2);
}

#[test]
fn cleanup_keeps_finished_states_referenced_by_logs() {
  let mut runtime = Runtime::new(chain_project());
  let fs = runtime.start("main").unwrap();
  runtime.run_until_settled();
  assert!(runtime.flow_state(fs).unwrap().is_finished);

  // The "flow finished" log item still references the state.
  runtime.cleanup_finished();
  assert!(runtime.flow_state(fs).is_some());

  runtime.clear_logs();
  runtime.cleanup_finished();
  assert!(runtime.flow_state(fs).is_none());
  assert!(runtime.flow_state_tree().is_empty());
}

#[test]
fn notifier_observes_the_flow_state_lifecycle() {
  let (sender, mut receiver) = mpsc::unbounded_channel();
  let mut runtime =
    Runtime::new(chain_project()).with_notifier(std::sync::Arc::new(ChannelNotifier::new(sender)));
  let fs = runtime.start("main").unwrap();
  runtime.run_until_settled();
  runtime.stop_runtime();

  let mut created = false;
  let mut finished = false;
  let mut state_changes = Vec::new();
  let mut log_kinds = Vec::new();
  while let Ok(event) = receiver.try_recv() {
    match event {
      RuntimeEvent::FlowStateCreated { flow_state, .. } if flow_state == fs => created = true,
      RuntimeEvent::FlowStateFinished { flow_state } if flow_state == fs => finished = true,
      RuntimeEvent::RunStateChanged { state } => state_changes.push(state),
      RuntimeEvent::LogAppended { kind, .. } => log_kinds.push(kind),
      _ => {}
    }
  }

  assert!(created);
  assert!(finished);
  assert!(state_changes.contains(&RunState::Running));
  assert!(state_changes.contains(&RunState::Stopped));
  assert!(log_kinds.contains(&LogKind::Info));
}

#[test]
fn stop_runtime_is_idempotent() {
  let mut runtime = Runtime::new(chain_project());
  runtime.start("main").unwrap();
  runtime.run_until_settled();

  runtime.stop_runtime();
  let state = runtime.state();
  runtime.stop_runtime();
  assert_eq!(runtime.state(), state);
  assert_eq!(runtime.state(), RunState::Stopped);
}
