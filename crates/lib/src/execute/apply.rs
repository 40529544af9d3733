//! Apply orchestration.
//!
//! The high-level `apply` flow:
//!
//! 1. Evaluate the Lua config into a [`DesiredState`]
//! 2. Capture the [`RunContext`] from the identity collaborator
//! 3. Acquire the run lock (exclusive; shared for dry runs)
//! 4. Compute the plan against probed state
//! 5. Execute it sequentially (skipped entirely for dry runs)
//! 6. Emit the summary into the run log
//!
//! Action failures do not surface as `Err`: they are recorded in the
//! outcome and itemized in the summary. `Err` means the run could not
//! happen at all (bad config, lock contention, unreadable log path).
//!
//! [`DesiredState`]: crate::manifest::DesiredState

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::context::RunContext;
use crate::eval::{EvalError, evaluate_config};
use crate::plan::compute_plan;
use crate::platform::paths::run_log_path;
use crate::report::{ReportError, Reporter, Summary};
use crate::run_lock::{LockError, LockMode, RunLock};
use crate::system::{System, SystemError};

use super::run::execute_plan;
use super::types::{RunOutcome, summarize};

/// Errors that prevent a run from happening at all.
#[derive(Debug, Error)]
pub enum ApplyError {
  #[error("evaluation error: {0}")]
  Eval(#[from] EvalError),

  #[error("lock error: {0}")]
  Lock(#[from] LockError),

  #[error("report error: {0}")]
  Report(#[from] ReportError),

  #[error("failed to capture run context: {0}")]
  Context(#[from] SystemError),
}

/// Options for the apply operation.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
  /// Compute and report the plan without executing anything.
  pub dry_run: bool,

  /// Override the run log location (defaults to the per-user state dir).
  pub log_path: Option<PathBuf>,
}

/// Apply a configuration file against the real host.
pub async fn apply(config_path: &Path, options: &ApplyOptions) -> Result<RunOutcome, ApplyError> {
  apply_with_system(config_path, options, &System::host()).await
}

/// Apply a configuration file against an injected collaborator set.
pub async fn apply_with_system(
  config_path: &Path,
  options: &ApplyOptions,
  system: &System,
) -> Result<RunOutcome, ApplyError> {
  info!(config = %config_path.display(), dry_run = options.dry_run, "starting run");

  // 1. Desired state from config.
  let desired = evaluate_config(config_path)?;

  // 2. Context, captured once and passed everywhere.
  let ctx = RunContext::capture(system.identity.as_ref()).await?;

  // 3. Mutual exclusion for the duration of the run.
  let mode = if options.dry_run { LockMode::Shared } else { LockMode::Exclusive };
  let command = if options.dry_run { "plan" } else { "apply" };
  let _lock = RunLock::acquire(mode, command, &ctx.hostname)?;

  let mut reporter = if options.dry_run {
    Reporter::console_only()
  } else {
    let path = options.log_path.clone().unwrap_or_else(run_log_path);
    Reporter::open(&path)?
  };

  reporter.info(format!(
    "run started: config {} on {} for {}",
    config_path.display(),
    ctx.hostname,
    ctx.user
  ));

  // 4. Plan.
  let plan = compute_plan(&desired, system, &ctx, &mut reporter).await;
  info!(actions = plan.actions.len(), changes = plan.change_count(), "plan computed");

  // 5. Dry run stops here.
  if options.dry_run {
    reporter.info(format!("dry run: {} change(s) would be applied", plan.change_count()));
    return Ok(RunOutcome {
      plan,
      records: Vec::new(),
      summary: Summary::default(),
      aborted: false,
      dry_run: true,
    });
  }

  // 6. Execute and summarize.
  let records = execute_plan(plan.clone(), system, &ctx, &mut reporter).await;
  let aborted = records
    .iter()
    .any(|r| r.status == super::types::ActionStatus::Failed && r.action.critical);
  let summary = summarize(&records);
  reporter.emit_summary(&summary);

  Ok(RunOutcome {
    plan,
    records,
    summary,
    aborted,
    dry_run: false,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::execute::types::ActionStatus;
  use crate::system::fake::FakeSystem;
  use serial_test::serial;
  use std::sync::Arc;
  use tempfile::TempDir;

  fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("rig.lua");
    std::fs::write(&path, body).unwrap();
    path
  }

  /// Run `f` with HOME and XDG state pointed at a temp directory so locks
  /// and logs stay isolated.
  fn with_temp_state<F, R>(f: F) -> R
  where
    F: FnOnce(&TempDir) -> R,
  {
    let temp_dir = TempDir::new().unwrap();
    temp_env::with_vars(
      [
        (
          "XDG_STATE_HOME",
          Some(temp_dir.path().join("state").to_str().unwrap().to_string()),
        ),
        ("HOME", Some(temp_dir.path().to_str().unwrap().to_string())),
      ],
      || f(&temp_dir),
    )
  }

  fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Runtime::new().unwrap().block_on(future)
  }

  const BASIC_CONFIG: &str = r#"
    return {
      setup = function()
        rig.repo({ name = "rpmfusion-free", url = "https://example/free.rpm" })
        rig.packages({ name = "cli", packages = { "vim", "git" } })
        rig.group({ name = "libvirt" })
      end,
    }
  "#;

  #[test]
  #[serial]
  fn apply_config_not_found() {
    with_temp_state(|temp| {
      let missing = temp.path().join("nope.lua");
      let system = System::from_fake(Arc::new(FakeSystem::new()));
      let result = block_on(apply_with_system(&missing, &ApplyOptions::default(), &system));
      assert!(matches!(result, Err(ApplyError::Eval(EvalError::NotFound(_)))));
    });
  }

  #[test]
  #[serial]
  fn apply_reconciles_and_is_idempotent() {
    with_temp_state(|temp| {
      let config = write_config(temp, BASIC_CONFIG);
      let fake = Arc::new(FakeSystem::new());
      fake.seed_package("git");
      fake.seed_group("libvirt");
      let system = System::from_fake(fake.clone());

      let first = block_on(apply_with_system(&config, &ApplyOptions::default(), &system)).unwrap();
      assert!(first.success());
      assert!(first.summary.failed == 0);
      // repo add + install vim + group add executed; git was a skip.
      assert_eq!(
        fake.calls(),
        ["add-repo:rpmfusion-free", "install:vim", "add-to-group:libvirt:tester"]
      );

      let second = block_on(apply_with_system(&config, &ApplyOptions::default(), &system)).unwrap();
      assert!(second.success());
      assert_eq!(second.plan.change_count(), 0);
      assert!(second.records.iter().all(|r| r.status == ActionStatus::Skipped));
    });
  }

  #[test]
  #[serial]
  fn dry_run_executes_nothing() {
    with_temp_state(|temp| {
      let config = write_config(temp, BASIC_CONFIG);
      let fake = Arc::new(FakeSystem::new());
      let system = System::from_fake(fake.clone());

      let options = ApplyOptions {
        dry_run: true,
        ..Default::default()
      };
      let outcome = block_on(apply_with_system(&config, &options, &system)).unwrap();

      assert!(outcome.dry_run);
      assert!(outcome.plan.has_changes());
      assert!(outcome.records.is_empty());
      assert!(fake.calls().is_empty());
    });
  }

  #[test]
  #[serial]
  fn critical_failure_aborts_and_reports() {
    with_temp_state(|temp| {
      let config = write_config(
        temp,
        r#"
          return {
            setup = function()
              rig.upgrade()
              rig.packages({ name = "cli", packages = { "vim" } })
            end,
          }
        "#,
      );
      let fake = Arc::new(FakeSystem::new());
      fake.fail_upgrade();
      let system = System::from_fake(fake.clone());

      let outcome = block_on(apply_with_system(&config, &ApplyOptions::default(), &system)).unwrap();
      assert!(outcome.aborted);
      assert!(!outcome.success());
      assert_eq!(outcome.summary.failed, 1);
      assert_eq!(fake.calls(), ["upgrade"]);
    });
  }

  #[test]
  #[serial]
  fn run_log_written_with_summary() {
    with_temp_state(|temp| {
      let config = write_config(temp, BASIC_CONFIG);
      let fake = Arc::new(FakeSystem::new());
      fake.seed_group("libvirt");
      let system = System::from_fake(fake);

      let log_path = temp.path().join("log").join("run.log");
      let options = ApplyOptions {
        dry_run: false,
        log_path: Some(log_path.clone()),
      };
      block_on(apply_with_system(&config, &options, &system)).unwrap();

      let content = std::fs::read_to_string(&log_path).unwrap();
      assert!(content.contains("[INFO] run started"));
      assert!(content.contains("run complete:"));
      // Every line follows [timestamp] [LEVEL] message.
      for line in content.lines() {
        assert!(line.starts_with('['), "bad log line: {line}");
        assert!(line.contains("] ["), "bad log line: {line}");
      }
    });
  }
}
