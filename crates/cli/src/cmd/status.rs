//! Implementation of the `rig status` command.

use anyhow::Result;

use riglua_lib::consts::DEFAULT_CONFIG;
use riglua_lib::platform::{self, paths};

use crate::output;

pub fn cmd_status() -> Result<()> {
  output::print_info(&format!("rig.lua v{}", env!("CARGO_PKG_VERSION")));
  println!();

  output::print_stat("User", &platform::invoking_user());
  output::print_stat("Hostname", &platform::hostname());
  output::print_stat("Elevated", if platform::is_elevated() { "yes" } else { "no" });
  output::print_stat("Run log", &paths::run_log_path().display().to_string());

  let config = std::path::Path::new(DEFAULT_CONFIG);
  if config.exists() {
    output::print_stat("Config", DEFAULT_CONFIG);
  } else {
    output::print_stat("Config", "none found (run `rig init`)");
  }

  Ok(())
}
