//! Timer component: asynchronous work modeled as a subscription.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use weft_flow::ComponentKind;

use crate::context::ExecuteContext;
use crate::error::ComponentError;
use crate::registry::{ComponentHandler, ExecuteResult};

/// Fires `@seqout` after `interval_ms`, once or repeatedly.
///
/// The tick task owns a clone of the subscription token; cancelling the
/// subscription (flow stop, child disposal, re-execution) ends the task.
/// Ticks are delivered through the runtime's external channel, so the
/// resulting propagation happens on a later pump turn.
pub struct TimerHandler;

impl ComponentHandler for TimerHandler {
  fn execute(&self, ctx: &mut ExecuteContext<'_>) -> Result<ExecuteResult, ComponentError> {
    let ComponentKind::Timer {
      interval_ms,
      repeat,
    } = ctx.kind()?
    else {
      return Err(ComponentError::failed("component is not a timer"));
    };

    let token = CancellationToken::new();
    let task_token = token.clone();
    let handle = ctx.output_handle();
    let period = Duration::from_millis(interval_ms);

    tokio::spawn(async move {
      loop {
        tokio::select! {
          _ = task_token.cancelled() => break,
          _ = tokio::time::sleep(period) => {
            handle.emit_sequence();
            if !repeat {
              break;
            }
          }
        }
      }
    });

    Ok(ExecuteResult::Subscription(token))
  }
}
