//! Implementation of the `rig plan` command.
//!
//! Computes the plan against the live host without mutating anything and
//! prints it, changes first-class and already-satisfied resources dimmed.

use std::path::Path;

use anyhow::{Context, Result};

use riglua_lib::execute::{ApplyOptions, apply};

use crate::output;

pub fn cmd_plan(file: &str, json: bool) -> Result<()> {
  let path = Path::new(file);

  let options = ApplyOptions {
    dry_run: true,
    ..Default::default()
  };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let outcome = rt.block_on(apply(path, &options)).context("Plan failed")?;

  if json {
    let rendered = serde_json::to_string_pretty(&outcome.plan).context("Failed to serialize plan")?;
    println!("{rendered}");
    return Ok(());
  }

  if !outcome.plan.has_changes() {
    output::print_info("no changes; the system matches the configuration");
    return Ok(());
  }

  println!();
  output::print_plan(&outcome.plan);
  println!();
  output::print_info(&format!("{} change(s) would be applied", outcome.plan.change_count()));

  Ok(())
}
