//! Sandboxed app collaborator backed by flatpak.

use async_trait::async_trait;
use tracing::info;

use super::cmd::{run, run_checked};
use super::{AppSandboxClient, SystemError};

#[derive(Debug, Default)]
pub struct Flatpak;

impl Flatpak {
  pub fn new() -> Self {
    Self
  }
}

#[async_trait]
impl AppSandboxClient for Flatpak {
  async fn remote_exists(&self, name: &str) -> Result<bool, SystemError> {
    let out = run_checked("flatpak", &["remotes", "--columns=name"]).await?;
    Ok(out.stdout.lines().any(|line| line.trim() == name))
  }

  async fn add_remote(&self, name: &str, url: &str) -> Result<(), SystemError> {
    info!(remote = name, url, "adding flatpak remote");
    run_checked("flatpak", &["remote-add", "--if-not-exists", name, url]).await?;
    Ok(())
  }

  async fn is_installed(&self, app_id: &str) -> Result<bool, SystemError> {
    // `flatpak info` exits non-zero for apps that are not installed.
    let out = run("flatpak", &["info", app_id]).await?;
    Ok(out.success)
  }

  async fn install(&self, app_ids: &[String]) -> Result<(), SystemError> {
    if app_ids.is_empty() {
      return Ok(());
    }
    info!(count = app_ids.len(), "installing flatpak apps");
    let mut args = vec!["install", "-y", "--noninteractive"];
    args.extend(app_ids.iter().map(String::as_str));
    run_checked("flatpak", &args).await?;
    Ok(())
  }

  async fn prune_unused(&self) -> Result<(), SystemError> {
    info!("pruning unused flatpak runtimes");
    run_checked("flatpak", &["uninstall", "--unused", "-y"]).await?;
    Ok(())
  }
}
