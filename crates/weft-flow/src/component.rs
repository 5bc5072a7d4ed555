use serde::{Deserialize, Serialize};

/// Name of the system sequence input.
pub const SEQ_IN: &str = "@seqin";
/// Name of the system sequence output.
pub const SEQ_OUT: &str = "@seqout";

/// Whether a pin carries data or pure control flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinKind {
  #[default]
  Data,
  Sequence,
}

/// A named input or output declared on a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
  pub name: String,
  #[serde(default)]
  pub kind: PinKind,
  #[serde(default)]
  pub optional: bool,
}

impl Pin {
  /// A mandatory data pin.
  pub fn data(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      kind: PinKind::Data,
      optional: false,
    }
  }

  /// An optional data pin.
  pub fn optional_data(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      kind: PinKind::Data,
      optional: true,
    }
  }

  /// A sequence (control flow) pin.
  pub fn sequence(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      kind: PinKind::Sequence,
      optional: false,
    }
  }
}

/// The kind of a component, with its per-kind configuration.
///
/// Builtin kinds map one-to-one onto handlers registered in the runtime's
/// component registry; `Custom` reaches handlers registered by embedders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ComponentKind {
  /// Entry point of a flow - fires `@seqout` once when the flow starts.
  Start,
  /// Evaluates an expression; optionally assigns it to a variable, and
  /// propagates the result on the `value` output.
  SetValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    variable: Option<String>,
    value: String,
  },
  /// Terminal of a sub-flow - forwards its `value` input to the named
  /// output of the component that spawned the sub-flow.
  Output {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
  },
  /// Appends its input (or a fixed message) to the runtime log.
  Log {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
  },
  /// Sends an instrument command; the command is a template string.
  Scpi { command: String },
  /// Increments a persistent counter on every execution.
  Counter,
  /// Fires `@seqout` after `interval_ms`, once or repeatedly.
  Timer {
    interval_ms: u64,
    #[serde(default)]
    repeat: bool,
  },
  /// Receives error messages thrown anywhere in this flow or its children.
  CatchError,
  /// Runs another flow as a child flow state and fires `@seqout` when it
  /// finishes.
  CallAction { action: String },
  /// Repeats `item_flow` once per element of the bound data source.
  List { data: String, item_flow: String },
  /// Same lifecycle as `List`; geometry is a rendering concern.
  Grid { data: String, item_flow: String },
  /// Runs the branch selected by the bound enum value.
  Select { data: String, branches: Vec<String> },
  /// A user-interactable widget; `action` names a flow to spawn on
  /// interaction when the `action` output is not wired.
  Widget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<String>,
  },
  /// An embedder-registered component kind.
  Custom {
    component_type: String,
    #[serde(default)]
    config: serde_json::Value,
  },
}

impl ComponentKind {
  /// Registry tag used to look up the handler for this kind.
  pub fn tag(&self) -> &str {
    match self {
      ComponentKind::Start => "start",
      ComponentKind::SetValue { .. } => "set-value",
      ComponentKind::Output { .. } => "output",
      ComponentKind::Log { .. } => "log",
      ComponentKind::Scpi { .. } => "scpi",
      ComponentKind::Counter => "counter",
      ComponentKind::Timer { .. } => "timer",
      ComponentKind::CatchError => "catch-error",
      ComponentKind::CallAction { .. } => "call-action",
      ComponentKind::List { .. } => "list",
      ComponentKind::Grid { .. } => "grid",
      ComponentKind::Select { .. } => "select",
      ComponentKind::Widget { .. } => "widget",
      ComponentKind::Custom { component_type, .. } => component_type,
    }
  }

  /// Pins a component of this kind carries when none are declared.
  fn default_inputs(&self) -> Vec<Pin> {
    match self {
      ComponentKind::Start | ComponentKind::List { .. } | ComponentKind::Grid { .. } => vec![],
      ComponentKind::Select { .. } => vec![],
      ComponentKind::Output { .. } => vec![Pin::sequence(SEQ_IN), Pin::optional_data("value")],
      ComponentKind::Log { .. } => vec![Pin::sequence(SEQ_IN), Pin::optional_data("value")],
      ComponentKind::CatchError => vec![Pin::data("message")],
      ComponentKind::Widget { .. } => vec![Pin::optional_data("data")],
      ComponentKind::Custom { .. } => vec![],
      _ => vec![Pin::sequence(SEQ_IN)],
    }
  }

  fn default_outputs(&self) -> Vec<Pin> {
    match self {
      ComponentKind::Start => vec![Pin::sequence(SEQ_OUT)],
      ComponentKind::SetValue { .. } => vec![Pin::data("value"), Pin::sequence(SEQ_OUT)],
      ComponentKind::Output { .. } => vec![],
      ComponentKind::Log { .. } | ComponentKind::Timer { .. } => vec![Pin::sequence(SEQ_OUT)],
      ComponentKind::CatchError => vec![Pin::data("message"), Pin::sequence(SEQ_OUT)],
      ComponentKind::Scpi { .. } => vec![Pin::data("result"), Pin::sequence(SEQ_OUT)],
      ComponentKind::Counter => vec![Pin::data("count"), Pin::sequence(SEQ_OUT)],
      ComponentKind::CallAction { .. } => vec![Pin::data("result"), Pin::sequence(SEQ_OUT)],
      ComponentKind::List { .. } | ComponentKind::Grid { .. } | ComponentKind::Select { .. } => {
        vec![]
      }
      ComponentKind::Widget { .. } => vec![Pin::data("action")],
      ComponentKind::Custom { .. } => vec![],
    }
  }
}

/// A node in a flow graph.
///
/// Identity is the `id`, unique within its flow. Inputs and outputs are
/// structural - they never change during execution. Definitions that omit
/// pins get the defaults of their kind; declared pins replace the defaults
/// wholesale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
  pub id: String,
  #[serde(flatten)]
  pub kind: ComponentKind,
  pub inputs: Vec<Pin>,
  pub outputs: Vec<Pin>,
}

impl<'de> Deserialize<'de> for Component {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    #[derive(Deserialize)]
    struct Raw {
      id: String,
      #[serde(flatten)]
      kind: ComponentKind,
      #[serde(default)]
      inputs: Vec<Pin>,
      #[serde(default)]
      outputs: Vec<Pin>,
    }

    let raw = Raw::deserialize(deserializer)?;
    let inputs = if raw.inputs.is_empty() {
      raw.kind.default_inputs()
    } else {
      raw.inputs
    };
    let outputs = if raw.outputs.is_empty() {
      raw.kind.default_outputs()
    } else {
      raw.outputs
    };
    Ok(Component {
      id: raw.id,
      kind: raw.kind,
      inputs,
      outputs,
    })
  }
}

impl Component {
  /// Create a component with the default pins of its kind.
  pub fn new(id: impl Into<String>, kind: ComponentKind) -> Self {
    let inputs = kind.default_inputs();
    let outputs = kind.default_outputs();
    Self {
      id: id.into(),
      kind,
      inputs,
      outputs,
    }
  }

  pub fn input(&self, name: &str) -> Option<&Pin> {
    self.inputs.iter().find(|pin| pin.name == name)
  }

  pub fn output(&self, name: &str) -> Option<&Pin> {
    self.outputs.iter().find(|pin| pin.name == name)
  }

  /// Inputs that carry control flow.
  pub fn sequence_inputs(&self) -> impl Iterator<Item = &Pin> {
    self
      .inputs
      .iter()
      .filter(|pin| pin.kind == PinKind::Sequence)
  }

  /// Data inputs that must hold a value before the component can run.
  pub fn mandatory_data_inputs(&self) -> impl Iterator<Item = &Pin> {
    self
      .inputs
      .iter()
      .filter(|pin| pin.kind == PinKind::Data && !pin.optional)
  }
}
