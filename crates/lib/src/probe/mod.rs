//! Read-only probing of actual system state.
//!
//! For each [`ResourceSpec`] the probe answers "what does the host look
//! like right now" through the collaborator interfaces, without mutating
//! anything. A resource that does not exist yet is the common case and a
//! normal answer; [`ProbeError`] means the collaborator could not answer
//! at all (the planner then assumes "not satisfied" and lets the action
//! surface any real problem).

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::context::RunContext;
use crate::manifest::{Precondition, ResourceParams, ResourceSpec};
use crate::placeholder::{self, PlaceholderError};
use crate::system::{System, SystemError};

/// Errors while determining actual state.
#[derive(Debug, Error)]
pub enum ProbeError {
  /// The underlying collaborator query failed.
  #[error("probe failed: {0}")]
  System(#[from] SystemError),

  /// A dotfile spec could not be rendered against the run context.
  #[error("render failed: {0}")]
  Render(#[from] PlaceholderError),
}

/// Point-in-time snapshot of one resource's actual state.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeResult {
  Repository {
    enabled: bool,
  },
  /// Upgrades run every time; there is nothing to probe.
  SystemUpgrade,
  Packages {
    installed: Vec<String>,
    missing: Vec<String>,
  },
  Swap {
    old_installed: bool,
    new_installed: bool,
  },
  AppRemote {
    exists: bool,
  },
  Apps {
    installed: Vec<String>,
    missing: Vec<String>,
  },
  Group {
    exists: bool,
    member: bool,
  },
  Mount {
    device_present: bool,
    point_exists: bool,
    mounted: bool,
    in_fstab: bool,
  },
  SnapshotConfig {
    exists: bool,
  },
  /// Snapshots are distinct per run; nothing to probe.
  Snapshot,
  Hostname {
    current: String,
  },
  Dotfile {
    /// Rendered target path.
    path: String,
    /// Rendered desired content.
    content: String,
    in_sync: bool,
  },
  Service {
    enabled: bool,
  },
}

/// Probe the actual state matching one spec.
pub async fn probe_resource(spec: &ResourceSpec, system: &System, ctx: &RunContext) -> Result<ProbeResult, ProbeError> {
  match &spec.params {
    ResourceParams::Repository(_) => {
      let enabled = system.packages.repository_enabled(&spec.name).await?;
      Ok(ProbeResult::Repository { enabled })
    }

    ResourceParams::SystemUpgrade => Ok(ProbeResult::SystemUpgrade),

    ResourceParams::PackageSet(set) => {
      let mut installed = Vec::new();
      let mut missing = Vec::new();
      for package in &set.packages {
        if system.packages.is_installed(package).await? {
          installed.push(package.clone());
        } else {
          missing.push(package.clone());
        }
      }
      Ok(ProbeResult::Packages { installed, missing })
    }

    ResourceParams::PackageSwap(swap) => Ok(ProbeResult::Swap {
      old_installed: system.packages.is_installed(&swap.remove).await?,
      new_installed: system.packages.is_installed(&swap.install).await?,
    }),

    ResourceParams::AppRemote { .. } => {
      let exists = system.apps.remote_exists(&spec.name).await?;
      Ok(ProbeResult::AppRemote { exists })
    }

    ResourceParams::AppSet { apps, .. } => {
      let mut installed = Vec::new();
      let mut missing = Vec::new();
      for app in apps {
        if system.apps.is_installed(app).await? {
          installed.push(app.clone());
        } else {
          missing.push(app.clone());
        }
      }
      Ok(ProbeResult::Apps { installed, missing })
    }

    ResourceParams::GroupMembership { group } => {
      let exists = system.groups.group_exists(group).await?;
      let member = if exists {
        system.groups.is_member(&ctx.user, group).await?
      } else {
        false
      };
      Ok(ProbeResult::Group { exists, member })
    }

    ResourceParams::Mount(mount) => Ok(ProbeResult::Mount {
      device_present: system.mounts.device_exists(&mount.device).await?,
      point_exists: system.mounts.mount_point_exists(&mount.path).await?,
      mounted: system.mounts.is_mounted(&mount.path).await?,
      in_fstab: system.mounts.fstab_contains(&mount.path).await?,
    }),

    ResourceParams::SnapshotConfig(_) => {
      let exists = system.snapshots.config_exists(&spec.name).await?;
      Ok(ProbeResult::SnapshotConfig { exists })
    }

    ResourceParams::Snapshot(_) => Ok(ProbeResult::Snapshot),

    ResourceParams::Hostname { .. } => {
      let current = system.identity.current_hostname().await?;
      Ok(ProbeResult::Hostname { current })
    }

    ResourceParams::Dotfile(dotfile) => {
      let path = placeholder::render(&dotfile.path, ctx)?;
      let content = placeholder::render(&dotfile.content, ctx)?;
      let in_sync = match tokio::fs::read_to_string(&path).await {
        Ok(existing) => existing == content,
        Err(_) => false,
      };
      Ok(ProbeResult::Dotfile { path, content, in_sync })
    }

    ResourceParams::ServiceState(_) => {
      let enabled = system.services.is_enabled(&spec.name).await?;
      Ok(ProbeResult::Service { enabled })
    }
  }
}

/// Evaluate a precondition against the host.
///
/// Precondition checks are local, read-only filesystem queries; they never
/// go through a collaborator.
pub fn check_precondition(precondition: &Precondition) -> bool {
  match precondition {
    Precondition::CommandAvailable(name) => command_available(name),
    Precondition::FileExists(path) => Path::new(path).exists(),
    Precondition::GpuVendor(vendor) => gpu_vendor_present(vendor, Path::new("/sys/class/drm")),
  }
}

fn command_available(name: &str) -> bool {
  let Ok(path_var) = std::env::var("PATH") else {
    return false;
  };
  std::env::split_paths(&path_var).any(|dir| dir.join(name).is_file())
}

/// PCI vendor ids as exposed in `/sys/class/drm/*/device/vendor`.
fn vendor_id(vendor: &str) -> Option<&'static str> {
  match vendor.to_ascii_lowercase().as_str() {
    "amd" => Some("0x1002"),
    "intel" => Some("0x8086"),
    "nvidia" => Some("0x10de"),
    _ => None,
  }
}

fn gpu_vendor_present(vendor: &str, drm_root: &Path) -> bool {
  let Some(wanted) = vendor_id(vendor) else {
    return false;
  };
  let Ok(entries) = std::fs::read_dir(drm_root) else {
    return false;
  };
  for entry in entries.flatten() {
    let vendor_file: PathBuf = entry.path().join("device").join("vendor");
    if let Ok(id) = std::fs::read_to_string(&vendor_file)
      && id.trim() == wanted
    {
      return true;
    }
  }
  false
}
