//! Implementation of the `rig apply` command.
//!
//! Evaluates the configuration, reconciles the host against it and prints
//! the per-action outcomes plus the final summary. Exits non-zero when any
//! action failed or the run was aborted on the critical path.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use riglua_lib::execute::{ApplyOptions, apply};
use riglua_lib::platform;

use crate::output;

pub fn cmd_apply(file: &str) -> Result<()> {
  let path = Path::new(file);

  if !platform::is_elevated() {
    output::print_warning("not running as root; most actions will fail to apply");
  }

  let options = ApplyOptions::default();

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let outcome = rt.block_on(apply(path, &options)).context("Apply failed")?;

  info!(
    actions = outcome.records.len(),
    failed = outcome.summary.failed,
    "run finished"
  );

  output::print_records(&outcome.records);
  output::print_summary(&outcome.summary);

  if outcome.aborted {
    output::print_error("run aborted: a critical action failed");
  }

  if !outcome.success() {
    std::process::exit(1);
  }

  output::print_success("system reconciled");
  Ok(())
}
