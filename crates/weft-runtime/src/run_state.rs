//! Debugger-facing run state machine.
//!
//! The runtime moves through these states in response to [`RunAction`]s;
//! the pump consults the current state to decide whether (and how much) to
//! execute. Invalid transitions are logged and ignored, never panics.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the whole runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
  Starting,
  StartingWithoutDebugger,
  StartingWithDebugger,
  Running,
  Paused,
  Resumed,
  SingleStep,
  Stopped,
}

/// Inputs to the run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunAction {
  StartWithoutDebugger,
  StartWithDebugger,
  Run,
  Resume,
  Pause,
  SingleStep,
  Stop,
}

impl RunState {
  /// The successor state for `action`, or `None` when the transition is
  /// invalid from this state.
  pub fn transition(self, action: RunAction) -> Option<RunState> {
    use RunAction as A;
    use RunState as S;

    match (self, action) {
      (S::Stopped, A::Stop) => None,
      (_, A::Stop) => Some(S::Stopped),
      (S::Starting, A::StartWithoutDebugger) => Some(S::StartingWithoutDebugger),
      (S::Starting, A::StartWithDebugger) => Some(S::StartingWithDebugger),
      (S::StartingWithoutDebugger, A::Run) => Some(S::Running),
      (S::StartingWithDebugger, A::Pause) => Some(S::Paused),
      (S::Running, A::Pause) => Some(S::Paused),
      (S::Paused, A::Run) => Some(S::Running),
      (S::Paused, A::Resume) => Some(S::Resumed),
      (S::Paused, A::SingleStep) => Some(S::SingleStep),
      (S::Resumed, A::Run) => Some(S::Running),
      (S::Resumed, A::Pause) => Some(S::Paused),
      (S::SingleStep, A::Pause) => Some(S::Paused),
      _ => None,
    }
  }

  /// Whether the debugger currently owns the pump (breakpoints honored,
  /// stepping available).
  pub fn is_debugger_active(self) -> bool {
    matches!(
      self,
      RunState::StartingWithDebugger | RunState::Paused | RunState::Resumed | RunState::SingleStep
    )
  }

  pub fn is_paused(self) -> bool {
    self == RunState::Paused
  }

  pub fn is_stopped(self) -> bool {
    self == RunState::Stopped
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn start_run_pause_resume_cycle() {
    let state = RunState::Starting;
    let state = state.transition(RunAction::StartWithoutDebugger).unwrap();
    let state = state.transition(RunAction::Run).unwrap();
    assert_eq!(state, RunState::Running);

    let state = state.transition(RunAction::Pause).unwrap();
    assert_eq!(state, RunState::Paused);
    assert!(state.is_debugger_active());

    let state = state.transition(RunAction::Resume).unwrap();
    assert_eq!(state, RunState::Resumed);
  }

  #[test]
  fn stop_reachable_from_everywhere_except_stopped() {
    for state in [
      RunState::Starting,
      RunState::Running,
      RunState::Paused,
      RunState::SingleStep,
    ] {
      assert_eq!(state.transition(RunAction::Stop), Some(RunState::Stopped));
    }
    assert_eq!(RunState::Stopped.transition(RunAction::Stop), None);
  }

  #[test]
  fn invalid_transitions_return_none() {
    assert_eq!(RunState::Running.transition(RunAction::Resume), None);
    assert_eq!(RunState::Starting.transition(RunAction::Run), None);
    assert_eq!(RunState::Stopped.transition(RunAction::Run), None);
  }
}
