//! Package manager collaborator backed by dnf/rpm.

use async_trait::async_trait;
use tracing::info;

use super::cmd::{run, run_checked};
use super::{PackageManager, SystemError};

/// dnf-based [`PackageManager`].
///
/// Queries go through `rpm -q` and `dnf repolist` (read-only); mutations
/// run `dnf` non-interactively with `-y`.
#[derive(Debug, Default)]
pub struct Dnf;

impl Dnf {
  pub fn new() -> Self {
    Self
  }
}

#[async_trait]
impl PackageManager for Dnf {
  async fn is_installed(&self, name: &str) -> Result<bool, SystemError> {
    // rpm -q exits non-zero when the package is absent.
    let out = run("rpm", &["-q", name]).await?;
    Ok(out.success)
  }

  async fn repository_enabled(&self, id: &str) -> Result<bool, SystemError> {
    let out = run_checked("dnf", &["repolist", "--enabled", "--quiet"]).await?;
    Ok(
      out
        .stdout
        .lines()
        .skip(1) // header row
        .any(|line| line.split_whitespace().next() == Some(id)),
    )
  }

  async fn install(&self, names: &[String]) -> Result<(), SystemError> {
    if names.is_empty() {
      return Ok(());
    }
    info!(count = names.len(), "installing packages");
    let mut args = vec!["install", "-y"];
    args.extend(names.iter().map(String::as_str));
    run_checked("dnf", &args).await?;
    Ok(())
  }

  async fn remove(&self, names: &[String]) -> Result<(), SystemError> {
    if names.is_empty() {
      return Ok(());
    }
    info!(count = names.len(), "removing packages");
    let mut args = vec!["remove", "-y"];
    args.extend(names.iter().map(String::as_str));
    run_checked("dnf", &args).await?;
    Ok(())
  }

  async fn add_repository(&self, id: &str, url: &str) -> Result<(), SystemError> {
    info!(repo = id, url, "adding repository");
    if url.ends_with(".rpm") {
      // Release packages (rpmfusion style) carry the repo definition.
      run_checked("dnf", &["install", "-y", url]).await?;
    } else {
      run_checked("dnf", &["config-manager", "--add-repo", url]).await?;
    }
    Ok(())
  }

  async fn remove_repository(&self, id: &str) -> Result<(), SystemError> {
    info!(repo = id, "disabling repository");
    run_checked("dnf", &["config-manager", "--set-disabled", id]).await?;
    Ok(())
  }

  async fn upgrade_all(&self) -> Result<(), SystemError> {
    info!("upgrading all packages");
    run_checked("dnf", &["upgrade", "-y", "--refresh"]).await?;
    Ok(())
  }
}
