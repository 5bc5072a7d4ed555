//! Builtin component handlers.

mod basic;
mod containers;
mod timer;

pub use basic::{
  CatchErrorHandler, CounterHandler, LogHandler, OutputHandler, ScpiHandler, SetValueHandler,
  StartHandler,
};
pub use containers::{CallActionHandler, GridHandler, ListHandler, SelectHandler, WidgetHandler};
pub use timer::TimerHandler;

use std::sync::Arc;

use crate::registry::ComponentRegistry;

/// Install every builtin handler into the registry.
pub(crate) fn register_builtins(registry: &mut ComponentRegistry) {
  registry.register("start", Arc::new(StartHandler));
  registry.register("set-value", Arc::new(SetValueHandler));
  registry.register("output", Arc::new(OutputHandler));
  registry.register("log", Arc::new(LogHandler));
  registry.register("scpi", Arc::new(ScpiHandler));
  registry.register("counter", Arc::new(CounterHandler));
  registry.register("timer", Arc::new(TimerHandler));
  registry.register("catch-error", Arc::new(CatchErrorHandler));
  registry.register("call-action", Arc::new(CallActionHandler));
  registry.register("list", Arc::new(ListHandler));
  registry.register("grid", Arc::new(GridHandler));
  registry.register("select", Arc::new(SelectHandler));
  registry.register("widget", Arc::new(WidgetHandler));
}
