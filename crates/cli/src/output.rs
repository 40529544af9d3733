//! CLI output formatting utilities.
//!
//! Colored status lines and plan/summary rendering. Color is applied only
//! when the stream supports it.

use owo_colors::{OwoColorize, Stream};
use riglua_lib::execute::{ActionRecord, ActionStatus};
use riglua_lib::plan::{Action, Plan};
use riglua_lib::report::Summary;

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const CHANGE: &str = "+";
  pub const SKIP: &str = "-";
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

fn print_action_line(action: &Action) {
  if action.op.is_skip() {
    println!(
      "  {} {} {}",
      symbols::SKIP.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      action.resource,
      format!("({})", action.op).if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  } else {
    println!(
      "  {} {} {}",
      symbols::CHANGE.if_supports_color(Stream::Stdout, |s| s.green()),
      action.resource,
      format!("({})", action.op).if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  }
}

/// Render the plan, changes first-class and skips dimmed.
pub fn print_plan(plan: &Plan) {
  for action in &plan.actions {
    print_action_line(action);
  }
}

/// Render per-action outcomes after execution.
pub fn print_records(records: &[ActionRecord]) {
  for record in records {
    match record.status {
      ActionStatus::Succeeded => print_success(&format!("{}: {}", record.action.resource, record.action.op)),
      ActionStatus::Skipped => {}
      ActionStatus::Failed => {
        let detail = record.error_detail.as_deref().unwrap_or("unknown error");
        print_error(&format!("{}: {}", record.action.resource, detail));
      }
    }
  }
}

/// Render the end-of-run summary block.
pub fn print_summary(summary: &Summary) {
  println!();
  print_stat("Attempted", &summary.attempted.to_string());
  print_stat("Succeeded", &summary.succeeded.to_string());
  print_stat("Skipped", &summary.skipped.to_string());
  print_stat("Failed", &summary.failed.to_string());

  if !summary.failures.is_empty() {
    println!();
    for (identity, reason) in &summary.failures {
      print_error(&format!("{identity}: {reason}"));
    }
  }
}
