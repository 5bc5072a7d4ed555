//! Runtime events and notifiers for observability.
//!
//! Events are emitted as flow states come and go so debugger panels and
//! editors can observe progress without polling. The runtime calls
//! `notify` for each event - implementations decide what to do with them
//! (render, persist, broadcast, ignore).

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::logs::{LogItemId, LogKind};
use crate::run_state::RunState;
use crate::state::FlowStateId;

/// Events emitted during flow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RuntimeEvent {
  /// The run state machine moved to a new state.
  RunStateChanged { state: RunState },

  /// A flow state was created (root or nested).
  FlowStateCreated {
    flow_state: FlowStateId,
    flow: String,
    parent: Option<FlowStateId>,
  },

  /// A flow state reached its finished state.
  FlowStateFinished { flow_state: FlowStateId },

  /// A container child was torn down and removed from the tree.
  FlowStateDisposed { flow_state: FlowStateId },

  /// A component error was recorded on a flow state.
  FlowError {
    flow_state: FlowStateId,
    error: String,
  },

  /// A log item was appended.
  LogAppended { item: LogItemId, kind: LogKind },

  /// The editor should scroll/expand to the given flow state (triggered by
  /// log or queue-task selection).
  ShowFlowState { flow_state: FlowStateId },
}

/// Trait for receiving runtime events.
pub trait RuntimeNotifier: Send + Sync {
  /// Called when a runtime event occurs.
  fn notify(&self, event: RuntimeEvent);
}

/// A no-op notifier that discards all events.
///
/// Useful for tests or when event observation is not needed.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl RuntimeNotifier for NoopNotifier {
  fn notify(&self, _event: RuntimeEvent) {
    // Intentionally empty
  }
}

/// A notifier that sends events to an unbounded channel.
///
/// Use this when events are consumed asynchronously (e.g. streamed to a
/// debugger window over IPC). Unbounded so the runtime never blocks on a
/// slow consumer; event volume is low.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<RuntimeEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<RuntimeEvent>) -> Self {
    Self { sender }
  }
}

impl RuntimeNotifier for ChannelNotifier {
  fn notify(&self, event: RuntimeEvent) {
    // Ignore send errors - receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn channel_notifier_delivers_events() {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let notifier = ChannelNotifier::new(sender);

    notifier.notify(RuntimeEvent::RunStateChanged {
      state: RunState::Running,
    });

    match receiver.try_recv() {
      Ok(RuntimeEvent::RunStateChanged { state }) => assert_eq!(state, RunState::Running),
      other => panic!("unexpected event: {:?}", other),
    }
  }

  #[test]
  fn channel_notifier_tolerates_dropped_receiver() {
    let (sender, receiver) = mpsc::unbounded_channel();
    drop(receiver);

    let notifier = ChannelNotifier::new(sender);
    notifier.notify(RuntimeEvent::RunStateChanged {
      state: RunState::Stopped,
    });
  }
}
