//! Definition validation errors.

/// Errors found while validating flow definitions.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
  /// Two components in one flow share an id.
  #[error("duplicate component id '{id}' in flow '{flow}'")]
  DuplicateComponent { flow: String, id: String },

  /// A connection line's source component does not exist.
  #[error("connection line {index} in flow '{flow}' references unknown source component '{component}'")]
  UnknownSource {
    flow: String,
    index: usize,
    component: String,
  },

  /// A connection line names an output its source component does not declare.
  #[error("connection line {index} in flow '{flow}' references unknown output '{output}' on component '{component}'")]
  UnknownOutput {
    flow: String,
    index: usize,
    component: String,
    output: String,
  },

  /// A container or call component references a flow the project does not contain.
  #[error("component '{component}' in flow '{flow}' references unknown flow '{reference}'")]
  UnknownFlowReference {
    flow: String,
    component: String,
    reference: String,
  },

  /// A flow id was looked up that the project does not contain.
  #[error("unknown flow '{id}'")]
  UnknownFlow { id: String },

  /// A flow has no components to execute.
  #[error("flow '{id}' has no components")]
  EmptyFlow { id: String },
}
