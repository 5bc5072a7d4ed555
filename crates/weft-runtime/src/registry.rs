//! Component handler registry.
//!
//! Component kinds resolve to statically registered handlers at startup -
//! a lookup table, never dynamic code loading. Embedders extend the builtin
//! set through [`ComponentRegistry::register`] before constructing the
//! runtime.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::components;
use crate::context::ExecuteContext;
use crate::error::ComponentError;

/// Outcome of one component execution.
pub enum ExecuteResult {
  /// Nothing to clean up.
  Done,
  /// Long-lived work was registered; the token is cancelled exactly once
  /// when the flow stops, the component is superseded, or the child flow
  /// state is disposed.
  Subscription(CancellationToken),
}

/// Advances one component's logic when it has unread input data or is
/// otherwise scheduled.
pub trait ComponentHandler: Send + Sync {
  fn execute(&self, ctx: &mut ExecuteContext<'_>) -> Result<ExecuteResult, ComponentError>;
}

/// Mapping from component-kind tags to handlers.
pub struct ComponentRegistry {
  handlers: HashMap<String, Arc<dyn ComponentHandler>>,
}

impl ComponentRegistry {
  /// An empty registry.
  pub fn new() -> Self {
    Self {
      handlers: HashMap::new(),
    }
  }

  /// The registry with every builtin handler installed.
  pub fn builtin() -> Self {
    let mut registry = Self::new();
    components::register_builtins(&mut registry);
    registry
  }

  /// Register a handler for a kind tag, replacing any existing one.
  pub fn register(&mut self, tag: impl Into<String>, handler: Arc<dyn ComponentHandler>) {
    self.handlers.insert(tag.into(), handler);
  }

  /// Look up the handler for a kind tag.
  pub fn handler(&self, tag: &str) -> Option<Arc<dyn ComponentHandler>> {
    self.handlers.get(tag).cloned()
  }

  pub fn contains(&self, tag: &str) -> bool {
    self.handlers.contains_key(tag)
  }
}

impl Default for ComponentRegistry {
  fn default() -> Self {
    Self::builtin()
  }
}
