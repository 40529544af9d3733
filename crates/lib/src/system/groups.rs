//! Group registry collaborator: getent + usermod.

use async_trait::async_trait;
use tracing::info;

use super::cmd::{run, run_checked};
use super::{GroupRegistry, SystemError};

#[derive(Debug, Default)]
pub struct HostGroups;

impl HostGroups {
  pub fn new() -> Self {
    Self
  }
}

/// Parse the member list of a `getent group` line: `name:x:gid:a,b,c`.
fn parse_members(line: &str) -> Vec<String> {
  line
    .trim()
    .split(':')
    .nth(3)
    .map(|members| {
      members
        .split(',')
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
    })
    .unwrap_or_default()
}

#[async_trait]
impl GroupRegistry for HostGroups {
  async fn group_exists(&self, name: &str) -> Result<bool, SystemError> {
    // getent exits 2 when the key is not found.
    let out = run("getent", &["group", name]).await?;
    Ok(out.success)
  }

  async fn is_member(&self, user: &str, name: &str) -> Result<bool, SystemError> {
    let out = run("getent", &["group", name]).await?;
    if !out.success {
      return Ok(false);
    }
    Ok(parse_members(&out.stdout).iter().any(|m| m == user))
  }

  async fn add_user_to_group(&self, user: &str, name: &str) -> Result<(), SystemError> {
    info!(user, group = name, "adding user to group");
    run_checked("usermod", &["-aG", name, user]).await?;
    Ok(())
  }
}
