//! Host identity collaborator: user, home, hostname.

use async_trait::async_trait;
use tracing::info;

use super::cmd::run_checked;
use super::{SystemError, SystemIdentity};
use crate::platform;

#[derive(Debug, Default)]
pub struct HostIdentity;

impl HostIdentity {
  pub fn new() -> Self {
    Self
  }
}

#[async_trait]
impl SystemIdentity for HostIdentity {
  async fn current_user(&self) -> Result<String, SystemError> {
    Ok(platform::invoking_user())
  }

  async fn home_dir(&self, user: &str) -> Result<String, SystemError> {
    let out = run_checked("getent", &["passwd", user]).await?;
    // passwd line: name:x:uid:gid:gecos:home:shell
    out
      .stdout
      .trim()
      .split(':')
      .nth(5)
      .map(str::to_string)
      .ok_or_else(|| SystemError::Parse {
        cmd: format!("getent passwd {user}"),
        message: "missing home field".to_string(),
      })
  }

  async fn current_hostname(&self) -> Result<String, SystemError> {
    Ok(platform::hostname())
  }

  async fn set_hostname(&self, name: &str) -> Result<(), SystemError> {
    info!(hostname = name, "setting hostname");
    run_checked("hostnamectl", &["set-hostname", name]).await?;
    Ok(())
  }
}
