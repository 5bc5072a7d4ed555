//! Container components: repeated/branching sub-flows and widget hosts.

use tokio_util::sync::CancellationToken;
use weft_flow::ComponentKind;

use crate::context::ExecuteContext;
use crate::error::ComponentError;
use crate::registry::{ComponentHandler, ExecuteResult};

/// Repeats its item flow once per element of the bound data source. Each
/// execution reconciles the child flow states against the current count.
pub struct ListHandler;

impl ComponentHandler for ListHandler {
  fn execute(&self, ctx: &mut ExecuteContext<'_>) -> Result<ExecuteResult, ComponentError> {
    let ComponentKind::List { data, item_flow } = ctx.kind()? else {
      return Err(ComponentError::failed("component is not a list"));
    };
    ctx.settle_list_children(&data, &item_flow)?;
    Ok(ExecuteResult::Done)
  }
}

/// Identical lifecycle to [`ListHandler`]; cell geometry is a rendering
/// concern the runtime never sees.
pub struct GridHandler;

impl ComponentHandler for GridHandler {
  fn execute(&self, ctx: &mut ExecuteContext<'_>) -> Result<ExecuteResult, ComponentError> {
    let ComponentKind::Grid { data, item_flow } = ctx.kind()? else {
      return Err(ComponentError::failed("component is not a grid"));
    };
    ctx.settle_list_children(&data, &item_flow)?;
    Ok(ExecuteResult::Done)
  }
}

/// Keeps exactly one child flow state alive: the branch selected by the
/// bound enum value, falling back to branch 0 when the selection is out of
/// range or unbound. Zero branches means no child.
pub struct SelectHandler;

impl ComponentHandler for SelectHandler {
  fn execute(&self, ctx: &mut ExecuteContext<'_>) -> Result<ExecuteResult, ComponentError> {
    let ComponentKind::Select { data, branches } = ctx.kind()? else {
      return Err(ComponentError::failed("component is not a select"));
    };
    ctx.settle_select_child(&data, &branches)?;
    Ok(ExecuteResult::Done)
  }
}

/// Runs another flow as a child flow state; the caller's `@seqout` fires
/// when the child finishes.
pub struct CallActionHandler;

impl ComponentHandler for CallActionHandler {
  fn execute(&self, ctx: &mut ExecuteContext<'_>) -> Result<ExecuteResult, ComponentError> {
    let ComponentKind::CallAction { action } = ctx.kind()? else {
      return Err(ComponentError::failed("component is not a call-action"));
    };
    ctx.spawn_child_flow(&action)?;
    Ok(ExecuteResult::Done)
  }
}

/// A user-interactable widget. Execution just registers presence: the
/// subscription keeps the owning page's flow state alive until stopped;
/// interactions arrive through `Runtime::execute_widget_action`.
pub struct WidgetHandler;

impl ComponentHandler for WidgetHandler {
  fn execute(&self, _ctx: &mut ExecuteContext<'_>) -> Result<ExecuteResult, ComponentError> {
    Ok(ExecuteResult::Subscription(CancellationToken::new()))
  }
}
