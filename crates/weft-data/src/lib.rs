//! Weft Data
//!
//! Hierarchical variable resolution for running flows. A [`DataContext`] is
//! a cheap-to-clone handle onto a scope; child scopes layer local variables
//! or default-value overrides over a parent, and lookups fall through to the
//! parent when a name is not bound locally.
//!
//! Container components use override scopes to bind their iterator/selection
//! variables (`item_index`, `selected_index`) per child flow state while
//! everything else resolves through the shared parent chain.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

/// A scoped variable-resolution environment.
///
/// Clones share the same scope; use the `create_with_*` constructors to
/// derive child scopes.
#[derive(Clone)]
pub struct DataContext {
  scope: Arc<Scope>,
}

struct Scope {
  /// Variables bound in this scope, mutable at runtime.
  values: Mutex<HashMap<String, Value>>,
  /// Immutable default-value overrides shadowing the parent chain.
  overrides: HashMap<String, Value>,
  parent: Option<DataContext>,
}

impl DataContext {
  /// A root context with no bindings.
  pub fn new() -> Self {
    Self::with_scope(HashMap::new(), HashMap::new(), None)
  }

  fn with_scope(
    values: HashMap<String, Value>,
    overrides: HashMap<String, Value>,
    parent: Option<DataContext>,
  ) -> Self {
    Self {
      scope: Arc::new(Scope {
        values: Mutex::new(values),
        overrides,
        parent,
      }),
    }
  }

  /// Derive a child scope that declares the given local variables.
  pub fn create_with_local_variables(&self, variables: HashMap<String, Value>) -> DataContext {
    Self::with_scope(variables, HashMap::new(), Some(self.clone()))
  }

  /// Derive a child scope whose overrides shadow the parent chain.
  pub fn create_with_default_value_overrides(
    &self,
    overrides: HashMap<String, Value>,
  ) -> DataContext {
    Self::with_scope(HashMap::new(), overrides, Some(self.clone()))
  }

  fn values(&self) -> MutexGuard<'_, HashMap<String, Value>> {
    // Single-threaded cooperative access; tolerate a poisoned lock rather
    // than cascading the panic.
    self
      .scope
      .values
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Resolve a variable: local bindings first, then overrides, then the
  /// parent chain.
  pub fn get(&self, name: &str) -> Option<Value> {
    if let Some(value) = self.values().get(name) {
      return Some(value.clone());
    }
    if let Some(value) = self.scope.overrides.get(name) {
      return Some(value.clone());
    }
    self
      .scope
      .parent
      .as_ref()
      .and_then(|parent| parent.get(name))
  }

  /// Assign a variable in the scope that defines it, or bind it locally if
  /// no scope in the chain does.
  pub fn set(&self, name: &str, value: Value) {
    if self.set_existing(name, &value) {
      return;
    }
    self.values().insert(name.to_string(), value);
  }

  fn set_existing(&self, name: &str, value: &Value) -> bool {
    if let Some(slot) = self.values().get_mut(name) {
      *slot = value.clone();
      return true;
    }
    self
      .scope
      .parent
      .as_ref()
      .is_some_and(|parent| parent.set_existing(name, value))
  }

  /// Bind a variable in this scope unconditionally, shadowing any parent.
  pub fn declare(&self, name: &str, value: Value) {
    self.values().insert(name.to_string(), value);
  }

  /// Remove every binding in this scope (parents are untouched).
  pub fn clear(&self) {
    self.values().clear();
  }

  /// Number of elements in the named data source: array length, or a
  /// numeric value coerced to a count; anything else is 0.
  pub fn count(&self, data_id: &str) -> usize {
    match self.get(data_id) {
      Some(Value::Array(items)) => items.len(),
      Some(Value::Number(number)) => number.as_u64().unwrap_or(0) as usize,
      _ => 0,
    }
  }

  /// Enum index of the named data source: numbers as-is, booleans as 0/1;
  /// anything else (including unbound) resolves to 0.
  pub fn get_enum_value(&self, data_id: &str) -> i64 {
    match self.get(data_id) {
      Some(Value::Number(number)) => number.as_i64().unwrap_or(0),
      Some(Value::Bool(flag)) => i64::from(flag),
      _ => 0,
    }
  }

  /// Flatten the chain into one map, innermost bindings winning. Used to
  /// hand the full visible environment to an expression backend.
  pub fn snapshot(&self) -> HashMap<String, Value> {
    let mut merged = self
      .scope
      .parent
      .as_ref()
      .map(|parent| parent.snapshot())
      .unwrap_or_default();
    for (name, value) in &self.scope.overrides {
      merged.insert(name.clone(), value.clone());
    }
    for (name, value) in self.values().iter() {
      merged.insert(name.clone(), value.clone());
    }
    merged
  }
}

impl Default for DataContext {
  fn default() -> Self {
    Self::new()
  }
}

impl std::fmt::Debug for DataContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DataContext")
      .field("values", &*self.values())
      .field("overrides", &self.scope.overrides)
      .field("has_parent", &self.scope.parent.is_some())
      .finish()
  }
}
