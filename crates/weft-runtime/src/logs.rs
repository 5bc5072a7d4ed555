//! Append-only execution log.
//!
//! Everything the debugger's log panel shows comes from here. Items are
//! immutable once appended; filtering produces a most-recent-first
//! projection without touching the underlying vector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::FlowStateId;

pub type LogItemId = u64;

/// Kind tag of a log item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
  Debug,
  Info,
  Scpi,
  Error,
}

/// Filter applied by log consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFilter {
  #[default]
  All,
  Scpi,
  Error,
}

impl LogFilter {
  fn matches(self, kind: LogKind) -> bool {
    match self {
      LogFilter::All => true,
      LogFilter::Scpi => kind == LogKind::Scpi,
      LogFilter::Error => kind == LogKind::Error,
    }
  }
}

/// One immutable record of a runtime-observable event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogItem {
  pub id: LogItemId,
  pub timestamp: DateTime<Utc>,
  pub kind: LogKind,
  pub message: String,
  /// Flow state that produced the event, when known.
  pub flow_state: Option<FlowStateId>,
  /// Component that produced the event, when known.
  pub component: Option<String>,
  /// Index of the connection line involved, when known.
  pub connection_line: Option<usize>,
}

/// The append-only log plus its selection cursor.
#[derive(Debug, Default)]
pub struct Logs {
  items: Vec<LogItem>,
  selected: Option<LogItemId>,
  next_id: LogItemId,
}

impl Logs {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append an item; O(1), no dedup. Returns the new item's id.
  pub fn append(
    &mut self,
    kind: LogKind,
    message: impl Into<String>,
    flow_state: Option<FlowStateId>,
    component: Option<String>,
    connection_line: Option<usize>,
  ) -> LogItemId {
    let id = self.next_id;
    self.next_id += 1;
    self.items.push(LogItem {
      id,
      timestamp: Utc::now(),
      kind,
      message: message.into(),
      flow_state,
      component,
      connection_line,
    });
    id
  }

  /// All items in append order.
  pub fn items(&self) -> &[LogItem] {
    &self.items
  }

  pub fn get(&self, id: LogItemId) -> Option<&LogItem> {
    self.items.iter().find(|item| item.id == id)
  }

  /// Empty the log and reset the selection cursor.
  pub fn clear(&mut self) {
    self.items.clear();
    self.selected = None;
  }

  /// Most-recent-first projection of items matching `filter`. Never
  /// mutates the log.
  pub fn filter(&self, filter: LogFilter) -> Vec<&LogItem> {
    self
      .items
      .iter()
      .rev()
      .filter(|item| filter.matches(item.kind))
      .collect()
  }

  /// Point the cursor at an item. Idempotent; unknown ids clear nothing
  /// and return `None`.
  pub fn select(&mut self, id: LogItemId) -> Option<&LogItem> {
    if self.items.iter().any(|item| item.id == id) {
      self.selected = Some(id);
    }
    self.selected()
  }

  pub fn deselect(&mut self) {
    self.selected = None;
  }

  pub fn selected(&self) -> Option<&LogItem> {
    self.selected.and_then(|id| self.get(id))
  }

  /// Whether any item references the given flow state. Used by the
  /// finished-flow-state cleanup to keep states the log still points at.
  pub fn references_flow_state(&self, flow_state: FlowStateId) -> bool {
    self
      .items
      .iter()
      .any(|item| item.flow_state == Some(flow_state))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_logs() -> Logs {
    let mut logs = Logs::new();
    logs.append(LogKind::Info, "flow started", None, None, None);
    logs.append(LogKind::Scpi, "*IDN?", None, Some("idn".to_string()), None);
    logs.append(LogKind::Error, "boom", None, Some("bad".to_string()), None);
    logs.append(LogKind::Scpi, "MEAS:VOLT?", None, None, None);
    logs
  }

  #[test]
  fn filter_is_reverse_chronological_and_non_mutating() {
    let logs = sample_logs();
    let before = logs.items().len();

    let scpi = logs.filter(LogFilter::Scpi);
    assert_eq!(scpi.len(), 2);
    assert_eq!(scpi[0].message, "MEAS:VOLT?");
    assert_eq!(scpi[1].message, "*IDN?");

    let errors = logs.filter(LogFilter::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "boom");

    assert_eq!(logs.items().len(), before);
    assert_eq!(logs.filter(LogFilter::All).len(), before);
  }

  #[test]
  fn clear_resets_selection() {
    let mut logs = sample_logs();
    let id = logs.items()[1].id;
    logs.select(id);
    assert!(logs.selected().is_some());

    logs.clear();
    assert!(logs.selected().is_none());
    assert!(logs.items().is_empty());
  }

  #[test]
  fn select_is_idempotent_and_ignores_unknown_ids() {
    let mut logs = sample_logs();
    let id = logs.items()[0].id;

    logs.select(id);
    logs.select(id);
    assert_eq!(logs.selected().map(|item| item.id), Some(id));

    logs.select(9999);
    assert_eq!(logs.selected().map(|item| item.id), Some(id));
  }
}
