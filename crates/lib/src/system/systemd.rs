//! Service manager collaborator backed by systemctl.

use async_trait::async_trait;
use tracing::info;

use super::cmd::{run, run_checked};
use super::{ServiceManager, SystemError};

#[derive(Debug, Default)]
pub struct Systemd;

impl Systemd {
  pub fn new() -> Self {
    Self
  }
}

#[async_trait]
impl ServiceManager for Systemd {
  async fn is_enabled(&self, unit: &str) -> Result<bool, SystemError> {
    // `systemctl is-enabled` exits non-zero for disabled units; the state
    // string on stdout is authoritative either way.
    let out = run("systemctl", &["is-enabled", unit]).await?;
    Ok(out.stdout.trim() == "enabled")
  }

  async fn set_enabled(&self, unit: &str, enabled: bool) -> Result<(), SystemError> {
    let verb = if enabled { "enable" } else { "disable" };
    info!(unit, verb, "changing service state");
    run_checked("systemctl", &[verb, "--now", unit]).await?;
    Ok(())
  }
}
