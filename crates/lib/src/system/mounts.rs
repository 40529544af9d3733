//! Mount table collaborator: /proc/self/mounts, /etc/fstab, mount(8).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use super::cmd::run_checked;
use super::{FstabEntry, MountTable, SystemError};

const FSTAB: &str = "/etc/fstab";
const MOUNTS: &str = "/proc/self/mounts";

/// Mount collaborator over the real host.
///
/// `fstab_path`/`mounts_path` are overridable so the fstab parsing and
/// append logic is testable against temp files.
#[derive(Debug)]
pub struct HostMountTable {
  fstab_path: PathBuf,
  mounts_path: PathBuf,
}

impl Default for HostMountTable {
  fn default() -> Self {
    Self::new()
  }
}

impl HostMountTable {
  pub fn new() -> Self {
    Self {
      fstab_path: PathBuf::from(FSTAB),
      mounts_path: PathBuf::from(MOUNTS),
    }
  }

  pub fn with_paths(fstab_path: PathBuf, mounts_path: PathBuf) -> Self {
    Self { fstab_path, mounts_path }
  }

  /// Resolve a device reference to the path whose existence to check.
  fn device_path(device: &str) -> PathBuf {
    if let Some(uuid) = device.strip_prefix("UUID=") {
      Path::new("/dev/disk/by-uuid").join(uuid)
    } else if let Some(label) = device.strip_prefix("LABEL=") {
      Path::new("/dev/disk/by-label").join(label)
    } else {
      PathBuf::from(device)
    }
  }

  async fn read_table(&self, path: &Path) -> Result<String, SystemError> {
    match tokio::fs::read_to_string(path).await {
      Ok(content) => Ok(content),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
      Err(source) => Err(SystemError::Io {
        cmd: format!("read {}", path.display()),
        source,
      }),
    }
  }

  fn table_lists_mount_point(table: &str, path: &str) -> bool {
    table
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty() && !line.starts_with('#'))
      .filter_map(|line| line.split_whitespace().nth(1))
      .any(|mount_point| mount_point == path)
  }
}

#[async_trait]
impl MountTable for HostMountTable {
  async fn device_exists(&self, device: &str) -> Result<bool, SystemError> {
    Ok(Self::device_path(device).exists())
  }

  async fn mount_point_exists(&self, path: &str) -> Result<bool, SystemError> {
    Ok(Path::new(path).is_dir())
  }

  async fn is_mounted(&self, path: &str) -> Result<bool, SystemError> {
    let table = self.read_table(&self.mounts_path).await?;
    Ok(Self::table_lists_mount_point(&table, path))
  }

  async fn fstab_contains(&self, path: &str) -> Result<bool, SystemError> {
    let table = self.read_table(&self.fstab_path).await?;
    Ok(Self::table_lists_mount_point(&table, path))
  }

  async fn create_mount_point(&self, path: &str) -> Result<(), SystemError> {
    info!(path, "creating mount point");
    tokio::fs::create_dir_all(path).await.map_err(|source| SystemError::Io {
      cmd: format!("mkdir -p {path}"),
      source,
    })
  }

  async fn mount(&self, device: &str, path: &str, fstype: &str, options: &str) -> Result<(), SystemError> {
    info!(device, path, fstype, "mounting");
    run_checked("mount", &["-t", fstype, "-o", options, device, path]).await?;
    Ok(())
  }

  async fn append_fstab_entry(&self, entry: &FstabEntry) -> Result<bool, SystemError> {
    let table = self.read_table(&self.fstab_path).await?;
    if Self::table_lists_mount_point(&table, &entry.path) {
      return Ok(false);
    }

    info!(path = %entry.path, "appending fstab entry");
    let mut content = table;
    if !content.is_empty() && !content.ends_with('\n') {
      content.push('\n');
    }
    content.push_str(&entry.render());
    content.push('\n');

    tokio::fs::write(&self.fstab_path, content)
      .await
      .map_err(|source| SystemError::Io {
        cmd: format!("write {}", self.fstab_path.display()),
        source,
      })?;
    Ok(true)
  }
}
