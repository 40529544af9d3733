//! External collaborator interfaces.
//!
//! Every mutation of the host goes through one of these traits; the core
//! never embeds package-manager or mount logic itself. The default
//! implementations shell out to the usual Linux tooling (dnf/rpm, flatpak,
//! snapper, mount, getent/usermod, hostnamectl, systemctl); tests swap in
//! [`fake::FakeSystem`].
//!
//! Probe methods answer read-only questions and treat "absent" as a normal
//! answer. Mutators return `Err` on collaborator failure.

pub mod cmd;
pub mod dnf;
pub mod fake;
pub mod flatpak;
pub mod groups;
pub mod identity;
pub mod mounts;
pub mod snapper;
pub mod systemd;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from collaborator calls.
#[derive(Debug, Error)]
pub enum SystemError {
  /// The external command exited non-zero.
  #[error("command failed with exit code {code:?}: {cmd}: {stderr}")]
  CmdFailed {
    cmd: String,
    code: Option<i32>,
    stderr: String,
  },

  /// The external command could not be spawned or its output read.
  #[error("io error running {cmd}: {source}")]
  Io {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  /// A collaborator answer could not be interpreted.
  #[error("unexpected output from {cmd}: {message}")]
  Parse { cmd: String, message: String },
}

#[async_trait]
pub trait PackageManager: Send + Sync {
  async fn is_installed(&self, name: &str) -> Result<bool, SystemError>;
  async fn repository_enabled(&self, id: &str) -> Result<bool, SystemError>;
  async fn install(&self, names: &[String]) -> Result<(), SystemError>;
  async fn remove(&self, names: &[String]) -> Result<(), SystemError>;
  async fn add_repository(&self, id: &str, url: &str) -> Result<(), SystemError>;
  async fn remove_repository(&self, id: &str) -> Result<(), SystemError>;
  async fn upgrade_all(&self) -> Result<(), SystemError>;
}

#[async_trait]
pub trait AppSandboxClient: Send + Sync {
  async fn remote_exists(&self, name: &str) -> Result<bool, SystemError>;
  async fn add_remote(&self, name: &str, url: &str) -> Result<(), SystemError>;
  async fn is_installed(&self, app_id: &str) -> Result<bool, SystemError>;
  async fn install(&self, app_ids: &[String]) -> Result<(), SystemError>;
  async fn prune_unused(&self) -> Result<(), SystemError>;
}

#[async_trait]
pub trait SnapshotTool: Send + Sync {
  async fn config_exists(&self, label: &str) -> Result<bool, SystemError>;
  async fn create_config(&self, label: &str, path: &str) -> Result<(), SystemError>;
  async fn create_snapshot(&self, label: &str, description: &str) -> Result<(), SystemError>;
}

#[async_trait]
pub trait SystemIdentity: Send + Sync {
  async fn current_user(&self) -> Result<String, SystemError>;
  async fn home_dir(&self, user: &str) -> Result<String, SystemError>;
  async fn current_hostname(&self) -> Result<String, SystemError>;
  async fn set_hostname(&self, name: &str) -> Result<(), SystemError>;
}

#[async_trait]
pub trait MountTable: Send + Sync {
  /// Whether the device reference (`/dev/...`, `UUID=...`, `LABEL=...`)
  /// resolves to a present block device.
  async fn device_exists(&self, device: &str) -> Result<bool, SystemError>;
  async fn mount_point_exists(&self, path: &str) -> Result<bool, SystemError>;
  async fn is_mounted(&self, path: &str) -> Result<bool, SystemError>;
  async fn fstab_contains(&self, path: &str) -> Result<bool, SystemError>;
  async fn create_mount_point(&self, path: &str) -> Result<(), SystemError>;
  async fn mount(&self, device: &str, path: &str, fstype: &str, options: &str) -> Result<(), SystemError>;
  /// Append the entry unless one for the same mount point already exists.
  /// Returns `false` when the entry was already present.
  async fn append_fstab_entry(&self, entry: &FstabEntry) -> Result<bool, SystemError>;
}

/// One line of fstab, kept structured until rendering.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FstabEntry {
  pub device: String,
  pub path: String,
  pub fstype: String,
  pub options: String,
}

impl FstabEntry {
  pub fn render(&self) -> String {
    format!("{}  {}  {}  {}  0 0", self.device, self.path, self.fstype, self.options)
  }
}

#[async_trait]
pub trait GroupRegistry: Send + Sync {
  async fn group_exists(&self, name: &str) -> Result<bool, SystemError>;
  async fn is_member(&self, user: &str, name: &str) -> Result<bool, SystemError>;
  async fn add_user_to_group(&self, user: &str, name: &str) -> Result<(), SystemError>;
}

#[async_trait]
pub trait ServiceManager: Send + Sync {
  async fn is_enabled(&self, unit: &str) -> Result<bool, SystemError>;
  async fn set_enabled(&self, unit: &str, enabled: bool) -> Result<(), SystemError>;
}

/// Bundle of all collaborators, injected into probing and execution.
#[derive(Clone)]
pub struct System {
  pub packages: Arc<dyn PackageManager>,
  pub apps: Arc<dyn AppSandboxClient>,
  pub snapshots: Arc<dyn SnapshotTool>,
  pub identity: Arc<dyn SystemIdentity>,
  pub mounts: Arc<dyn MountTable>,
  pub groups: Arc<dyn GroupRegistry>,
  pub services: Arc<dyn ServiceManager>,
}

impl System {
  /// The real host: dnf, flatpak, snapper, systemd, and friends.
  pub fn host() -> Self {
    Self {
      packages: Arc::new(dnf::Dnf::new()),
      apps: Arc::new(flatpak::Flatpak::new()),
      snapshots: Arc::new(snapper::Snapper::new()),
      identity: Arc::new(identity::HostIdentity::new()),
      mounts: Arc::new(mounts::HostMountTable::new()),
      groups: Arc::new(groups::HostGroups::new()),
      services: Arc::new(systemd::Systemd::new()),
    }
  }

  /// Build a facade where every seam is the same fake, for tests.
  pub fn from_fake(fake: Arc<fake::FakeSystem>) -> Self {
    Self {
      packages: fake.clone(),
      apps: fake.clone(),
      snapshots: fake.clone(),
      identity: fake.clone(),
      mounts: fake.clone(),
      groups: fake.clone(),
      services: fake,
    }
  }
}
