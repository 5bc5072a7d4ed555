//! Weft Runtime
//!
//! The execution engine for weft flows: [`Runtime`] owns every live
//! [`FlowState`], propagates values along connection lines, runs component
//! handlers from the [`ComponentRegistry`], and maintains the debugger data
//! model ([`Logs`], selection cursors, the [`RunState`] machine).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Runtime                             │
//! │  - flow-state tree, task queue, run-state machine           │
//! │  - propagate_value: record + schedule, never run inline     │
//! │  - pump / run_until_settled / async run(cancel)             │
//! └─────────────────────────────────────────────────────────────┘
//!                │                                 │
//!                ▼                                 ▼
//! ┌───────────────────────────┐   ┌───────────────────────────────┐
//! │      ComponentRegistry    │   │        Logs + events          │
//! │  tag -> ComponentHandler  │   │  append-only log, cursors,    │
//! │  ExecuteResult::{Done,    │   │  RuntimeNotifier transport    │
//! │    Subscription(token)}   │   └───────────────────────────────┘
//! └───────────────────────────┘
//!                │
//!                ▼
//! ┌───────────────────────────┐
//! │        EvalBackend        │
//! │  minijinja TemplateBackend│
//! │  (or a native engine)     │
//! └───────────────────────────┘
//! ```
//!
//! Scheduling is single-threaded and cooperative. Asynchronous component
//! work (timers, streams) registers a subscription token and reports back
//! through an internal channel; the resulting propagation happens on a
//! later pump turn, never atomically with the emitting call.

mod backend;
mod components;
mod context;
mod error;
mod events;
mod logs;
mod registry;
mod run_state;
mod runtime;
mod settings;
mod state;

pub use backend::{EvalBackend, EvalError, TemplateBackend};
pub use components::{
  CallActionHandler, CatchErrorHandler, CounterHandler, GridHandler, ListHandler, LogHandler,
  OutputHandler, ScpiHandler, SelectHandler, SetValueHandler, StartHandler, TimerHandler,
  WidgetHandler,
};
pub use context::{ExecuteContext, OutputHandle};
pub use error::{ComponentError, StartError};
pub use events::{ChannelNotifier, NoopNotifier, RuntimeEvent, RuntimeNotifier};
pub use logs::{LogFilter, LogItem, LogItemId, LogKind, Logs};
pub use registry::{ComponentHandler, ComponentRegistry, ExecuteResult};
pub use run_state::{RunAction, RunState};
pub use runtime::{ITERATOR_VARIABLE, QueueTask, Runtime, SELECTED_VARIABLE};
pub use settings::{Settings, SettingsError};
pub use state::{ComponentState, FlowState, FlowStateId, RunningState};
