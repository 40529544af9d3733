//! Filesystem snapshot collaborator backed by snapper.

use async_trait::async_trait;
use tracing::info;

use super::cmd::run_checked;
use super::{SnapshotTool, SystemError};

#[derive(Debug, Default)]
pub struct Snapper;

impl Snapper {
  pub fn new() -> Self {
    Self
  }
}

#[async_trait]
impl SnapshotTool for Snapper {
  async fn config_exists(&self, label: &str) -> Result<bool, SystemError> {
    let out = run_checked("snapper", &["list-configs"]).await?;
    // Output is a table: `<config> | <subvolume>` with a two-line header.
    Ok(
      out
        .stdout
        .lines()
        .skip(2)
        .filter_map(|line| line.split('|').next())
        .any(|name| name.trim() == label),
    )
  }

  async fn create_config(&self, label: &str, path: &str) -> Result<(), SystemError> {
    info!(config = label, path, "creating snapper config");
    run_checked("snapper", &["-c", label, "create-config", path]).await?;
    Ok(())
  }

  async fn create_snapshot(&self, label: &str, description: &str) -> Result<(), SystemError> {
    info!(config = label, description, "creating snapshot");
    run_checked("snapper", &["-c", label, "create", "--description", description]).await?;
    Ok(())
  }
}
