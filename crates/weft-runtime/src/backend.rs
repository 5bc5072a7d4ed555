//! Expression evaluation backend.
//!
//! The runtime never interprets expressions itself; everything goes through
//! [`EvalBackend`]. The default [`TemplateBackend`] compiles minijinja
//! expressions against a snapshot of the data-context chain. A compiled or
//! native execution engine plugs in behind the same trait.

use serde_json::Value;
use weft_data::DataContext;

/// Errors from expression evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
  #[error("failed to compile expression '{expression}': {message}")]
  Compile { expression: String, message: String },

  #[error("failed to evaluate expression '{expression}': {message}")]
  Evaluate { expression: String, message: String },

  #[error("expression '{expression}' produced a non-JSON value: {message}")]
  Convert { expression: String, message: String },
}

/// A pluggable expression evaluator.
///
/// Implementations must be pure with respect to the scope: evaluation reads
/// variables but never writes them.
pub trait EvalBackend: Send + Sync {
  /// Evaluate an expression to a value.
  fn evaluate(&self, scope: &DataContext, expression: &str) -> Result<Value, EvalError>;

  /// Render a template string, substituting `{{ ... }}` placeholders from
  /// the scope. Plain strings render to themselves.
  fn render(&self, scope: &DataContext, template: &str) -> Result<String, EvalError>;
}

/// Minijinja-based backend: expressions are compiled per call and evaluated
/// against the flattened variable environment.
#[derive(Debug, Clone, Default)]
pub struct TemplateBackend;

impl TemplateBackend {
  pub fn new() -> Self {
    Self
  }
}

impl EvalBackend for TemplateBackend {
  fn evaluate(&self, scope: &DataContext, expression: &str) -> Result<Value, EvalError> {
    let env = minijinja::Environment::new();
    let compiled = env
      .compile_expression(expression)
      .map_err(|e| EvalError::Compile {
        expression: expression.to_string(),
        message: e.to_string(),
      })?;

    let result = compiled
      .eval(scope.snapshot())
      .map_err(|e| EvalError::Evaluate {
        expression: expression.to_string(),
        message: e.to_string(),
      })?;

    serde_json::to_value(&result).map_err(|e| EvalError::Convert {
      expression: expression.to_string(),
      message: e.to_string(),
    })
  }

  fn render(&self, scope: &DataContext, template: &str) -> Result<String, EvalError> {
    let env = minijinja::Environment::new();
    env
      .render_str(template, scope.snapshot())
      .map_err(|e| EvalError::Evaluate {
        expression: template.to_string(),
        message: e.to_string(),
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn evaluates_literals_and_arithmetic() {
    let backend = TemplateBackend::new();
    let scope = DataContext::new();

    assert_eq!(backend.evaluate(&scope, "5").unwrap(), json!(5));
    assert_eq!(backend.evaluate(&scope, "2 + 3").unwrap(), json!(5));
    assert_eq!(
      backend.evaluate(&scope, "'volt' ~ 'age'").unwrap(),
      json!("voltage")
    );
  }

  #[test]
  fn resolves_variables_through_the_scope_chain() {
    let backend = TemplateBackend::new();
    let root = DataContext::new();
    root.set("offset", json!(10));

    let child = root.create_with_default_value_overrides(
      [("gain".to_string(), json!(3))].into_iter().collect(),
    );

    assert_eq!(
      backend.evaluate(&child, "offset + gain").unwrap(),
      json!(13)
    );
  }

  #[test]
  fn renders_templates_against_the_scope() {
    let backend = TemplateBackend::new();
    let scope = DataContext::new();
    scope.set("channel", json!(2));

    assert_eq!(
      backend.render(&scope, "MEAS:VOLT? (@{{ channel }})").unwrap(),
      "MEAS:VOLT? (@2)"
    );
    assert_eq!(backend.render(&scope, "*IDN?").unwrap(), "*IDN?");
  }

  #[test]
  fn compile_errors_are_reported_not_panicked() {
    let backend = TemplateBackend::new();
    let scope = DataContext::new();

    assert!(matches!(
      backend.evaluate(&scope, "1 +"),
      Err(EvalError::Compile { .. })
    ));
  }
}
