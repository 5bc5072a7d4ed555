//! Runtime error types.

use weft_flow::FlowError;

use crate::backend::EvalError;

/// Errors that prevent a flow from starting. No partial flow state is
/// retained when any of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
  /// The requested flow is not part of the project.
  #[error("unknown flow '{id}'")]
  UnknownFlow { id: String },

  /// The requested flow has nothing to execute.
  #[error("flow '{id}' has no components")]
  EmptyFlow { id: String },

  /// The flow graph failed structural validation.
  #[error(transparent)]
  Invalid(#[from] FlowError),

  /// A component's kind has no registered handler.
  #[error("no handler registered for component kind '{tag}' (component '{component}' in flow '{flow}')")]
  UnknownComponentKind {
    flow: String,
    component: String,
    tag: String,
  },

  /// The runtime has already been stopped.
  #[error("runtime is stopped")]
  Stopped,
}

/// Errors raised by a component's execution.
///
/// These are caught per component: the runtime records them on the owning
/// flow state and logs them; they never unwind into sibling executions.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
  /// Expression evaluation failed.
  #[error(transparent)]
  Eval(#[from] EvalError),

  /// A mandatory input had no value at execution time.
  #[error("missing input '{input}'")]
  MissingInput { input: String },

  /// The component definition disappeared from its flow mid-execution.
  #[error("component '{component}' not found in flow")]
  MissingComponent { component: String },

  /// Handler-specific failure.
  #[error("{message}")]
  Failed { message: String },
}

impl ComponentError {
  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }
}
