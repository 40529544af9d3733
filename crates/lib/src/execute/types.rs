//! Result types for plan execution.

use serde::{Deserialize, Serialize};

use crate::plan::{Action, Plan};
use crate::report::Summary;

/// Final status of one executed (or skipped) action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
  Succeeded,
  Failed,
  Skipped,
}

/// One action together with its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
  pub action: Action,
  pub status: ActionStatus,
  /// Present iff the action failed.
  pub error_detail: Option<String>,
}

impl ActionRecord {
  pub fn succeeded(action: Action) -> Self {
    Self {
      action,
      status: ActionStatus::Succeeded,
      error_detail: None,
    }
  }

  pub fn failed(action: Action, detail: impl Into<String>) -> Self {
    Self {
      action,
      status: ActionStatus::Failed,
      error_detail: Some(detail.into()),
    }
  }

  pub fn skipped(action: Action) -> Self {
    Self {
      action,
      status: ActionStatus::Skipped,
      error_detail: None,
    }
  }
}

/// Result of one reconciliation run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
  /// The plan that was computed (and, unless dry-run, executed).
  pub plan: Plan,

  /// Per-action outcomes; empty for dry runs.
  pub records: Vec<ActionRecord>,

  pub summary: Summary,

  /// True when a critical action failed and the remainder was abandoned.
  pub aborted: bool,

  /// True when nothing was executed (plan/dry-run mode).
  pub dry_run: bool,
}

impl RunOutcome {
  /// A run is successful when it was not aborted and nothing failed.
  pub fn success(&self) -> bool {
    !self.aborted && self.summary.is_clean()
  }
}

/// Build the end-of-run summary from the action records.
pub fn summarize(records: &[ActionRecord]) -> Summary {
  let mut summary = Summary {
    attempted: records.len(),
    ..Default::default()
  };

  for record in records {
    match record.status {
      ActionStatus::Succeeded => summary.succeeded += 1,
      ActionStatus::Skipped => summary.skipped += 1,
      ActionStatus::Failed => {
        summary.failed += 1;
        summary.failures.push((
          record.action.resource.to_string(),
          record.error_detail.clone().unwrap_or_else(|| "unknown error".to_string()),
        ));
      }
    }
  }

  summary
}
