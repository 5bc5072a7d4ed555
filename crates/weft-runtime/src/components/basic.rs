//! Leaf action components: sources, assignment, logging, instrument
//! commands, and error catching.

use serde_json::{Value, json};
use weft_flow::ComponentKind;

use crate::context::ExecuteContext;
use crate::error::ComponentError;
use crate::registry::{ComponentHandler, ExecuteResult};
use crate::state::RunningState;

fn value_to_display(value: &Value) -> String {
  match value {
    Value::String(text) => text.clone(),
    other => other.to_string(),
  }
}

/// Entry point of a flow: fires `@seqout` once.
pub struct StartHandler;

impl ComponentHandler for StartHandler {
  fn execute(&self, ctx: &mut ExecuteContext<'_>) -> Result<ExecuteResult, ComponentError> {
    ctx.propagate_sequence();
    Ok(ExecuteResult::Done)
  }
}

/// Evaluates its expression, optionally assigns a variable, and propagates
/// the result on `value`.
pub struct SetValueHandler;

impl ComponentHandler for SetValueHandler {
  fn execute(&self, ctx: &mut ExecuteContext<'_>) -> Result<ExecuteResult, ComponentError> {
    let ComponentKind::SetValue { variable, value } = ctx.kind()? else {
      return Err(ComponentError::failed("component is not a set-value"));
    };

    let result = ctx.evaluate(&value)?;
    if let Some(name) = variable {
      ctx.set_variable(&name, result.clone())?;
    }
    ctx.propagate("value", result);
    ctx.propagate_sequence();
    Ok(ExecuteResult::Done)
  }
}

/// Terminal of a sub-flow: forwards its `value` input to the named output
/// of the component that spawned the sub-flow.
pub struct OutputHandler;

impl ComponentHandler for OutputHandler {
  fn execute(&self, ctx: &mut ExecuteContext<'_>) -> Result<ExecuteResult, ComponentError> {
    let ComponentKind::Output { name } = ctx.kind()? else {
      return Err(ComponentError::failed("component is not an output"));
    };

    let value = ctx.take_input("value").unwrap_or(Value::Null);
    let output = name.unwrap_or_else(|| "result".to_string());
    ctx.propagate_parent(&output, value);
    Ok(ExecuteResult::Done)
  }
}

/// Appends its input value (or a rendered message template) to the log.
pub struct LogHandler;

impl ComponentHandler for LogHandler {
  fn execute(&self, ctx: &mut ExecuteContext<'_>) -> Result<ExecuteResult, ComponentError> {
    let ComponentKind::Log { message } = ctx.kind()? else {
      return Err(ComponentError::failed("component is not a log"));
    };

    let text = match message {
      Some(template) => ctx.render(&template)?,
      None => {
        let value = ctx.take_input("value").unwrap_or(Value::Null);
        value_to_display(&value)
      }
    };
    ctx.log_info(text);
    ctx.propagate_sequence();
    Ok(ExecuteResult::Done)
  }
}

/// Renders and "sends" an instrument command; the traffic lands in the log
/// with the `scpi` kind so the debugger's SCPI filter picks it up.
pub struct ScpiHandler;

impl ComponentHandler for ScpiHandler {
  fn execute(&self, ctx: &mut ExecuteContext<'_>) -> Result<ExecuteResult, ComponentError> {
    let ComponentKind::Scpi { command } = ctx.kind()? else {
      return Err(ComponentError::failed("component is not a scpi"));
    };

    let rendered = ctx.render(&command)?;
    ctx.log_scpi(rendered.clone());
    ctx.propagate("result", Value::String(rendered));
    ctx.propagate_sequence();
    Ok(ExecuteResult::Done)
  }
}

/// Increments a persistent counter on every execution - running state
/// survives across executions within one flow state.
pub struct CounterHandler;

impl ComponentHandler for CounterHandler {
  fn execute(&self, ctx: &mut ExecuteContext<'_>) -> Result<ExecuteResult, ComponentError> {
    let count = match ctx.running_state() {
      Some(RunningState::Counter(count)) => count + 1,
      _ => 1,
    };
    ctx.set_running_state(RunningState::Counter(count));
    ctx.propagate("count", json!(count));
    ctx.propagate_sequence();
    Ok(ExecuteResult::Done)
  }
}

/// Receives error messages rerouted from failing components in this flow
/// or its children and forwards them for user-defined handling.
pub struct CatchErrorHandler;

impl ComponentHandler for CatchErrorHandler {
  fn execute(&self, ctx: &mut ExecuteContext<'_>) -> Result<ExecuteResult, ComponentError> {
    let message = ctx.take_input("message").unwrap_or(Value::Null);
    ctx.propagate("message", message);
    ctx.propagate_sequence();
    Ok(ExecuteResult::Done)
  }
}
