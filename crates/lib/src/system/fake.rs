//! In-memory collaborator double for tests.
//!
//! [`FakeSystem`] implements every collaborator trait over a mutable
//! in-memory host model, with per-operation failure injection and a call
//! log, so planner and executor behavior is testable without touching the
//! machine. Mutations really mutate the model: applying a plan and then
//! re-planning exercises the idempotence contract end to end.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
  AppSandboxClient, FstabEntry, GroupRegistry, MountTable, PackageManager, ServiceManager, SnapshotTool,
  SystemError, SystemIdentity,
};

#[derive(Debug, Default)]
struct FakeState {
  installed: BTreeSet<String>,
  repos: BTreeSet<String>,
  remotes: BTreeSet<String>,
  apps: BTreeSet<String>,
  groups: BTreeMap<String, BTreeSet<String>>,
  devices: BTreeSet<String>,
  mount_points: BTreeSet<String>,
  mounted: BTreeSet<String>,
  fstab: Vec<FstabEntry>,
  snapshot_configs: BTreeSet<String>,
  snapshots: Vec<(String, String)>,
  hostname: String,
  enabled_units: BTreeSet<String>,

  fail_upgrade: bool,
  fail_install: BTreeSet<String>,
  fail_remove: BTreeSet<String>,
  fail_repo_add: BTreeSet<String>,

  calls: Vec<String>,
}

/// Shared-state fake implementing all seven collaborator traits.
#[derive(Debug, Default)]
pub struct FakeSystem {
  state: Mutex<FakeState>,
}

fn failed(cmd: &str) -> SystemError {
  SystemError::CmdFailed {
    cmd: cmd.to_string(),
    code: Some(1),
    stderr: "injected failure".to_string(),
  }
}

impl FakeSystem {
  pub fn new() -> Self {
    let fake = Self::default();
    {
      let mut state = fake.state.lock().unwrap();
      state.hostname = "fake-host".to_string();
    }
    fake
  }

  // --- seeding ---

  pub fn seed_package(&self, name: &str) {
    self.state.lock().unwrap().installed.insert(name.to_string());
  }

  pub fn seed_repo(&self, id: &str) {
    self.state.lock().unwrap().repos.insert(id.to_string());
  }

  pub fn seed_group(&self, name: &str) {
    self.state.lock().unwrap().groups.entry(name.to_string()).or_default();
  }

  pub fn seed_group_member(&self, name: &str, user: &str) {
    self
      .state
      .lock()
      .unwrap()
      .groups
      .entry(name.to_string())
      .or_default()
      .insert(user.to_string());
  }

  pub fn seed_device(&self, device: &str) {
    self.state.lock().unwrap().devices.insert(device.to_string());
  }

  pub fn seed_mount_point(&self, path: &str) {
    self.state.lock().unwrap().mount_points.insert(path.to_string());
  }

  pub fn seed_remote(&self, name: &str) {
    self.state.lock().unwrap().remotes.insert(name.to_string());
  }

  pub fn seed_app(&self, app_id: &str) {
    self.state.lock().unwrap().apps.insert(app_id.to_string());
  }

  pub fn seed_snapshot_config(&self, label: &str) {
    self.state.lock().unwrap().snapshot_configs.insert(label.to_string());
  }

  pub fn seed_enabled_unit(&self, unit: &str) {
    self.state.lock().unwrap().enabled_units.insert(unit.to_string());
  }

  pub fn set_hostname_now(&self, name: &str) {
    self.state.lock().unwrap().hostname = name.to_string();
  }

  // --- failure injection ---

  pub fn fail_upgrade(&self) {
    self.state.lock().unwrap().fail_upgrade = true;
  }

  pub fn fail_install_of(&self, name: &str) {
    self.state.lock().unwrap().fail_install.insert(name.to_string());
  }

  pub fn fail_remove_of(&self, name: &str) {
    self.state.lock().unwrap().fail_remove.insert(name.to_string());
  }

  pub fn fail_repo_add_of(&self, id: &str) {
    self.state.lock().unwrap().fail_repo_add.insert(id.to_string());
  }

  // --- inspection ---

  /// Mutator calls in invocation order, rendered as `verb:target` strings.
  pub fn calls(&self) -> Vec<String> {
    self.state.lock().unwrap().calls.clone()
  }

  pub fn snapshots_taken(&self) -> Vec<(String, String)> {
    self.state.lock().unwrap().snapshots.clone()
  }

  pub fn fstab_entries(&self) -> Vec<FstabEntry> {
    self.state.lock().unwrap().fstab.clone()
  }

  fn record(&self, call: String) {
    self.state.lock().unwrap().calls.push(call);
  }
}

#[async_trait]
impl PackageManager for FakeSystem {
  async fn is_installed(&self, name: &str) -> Result<bool, SystemError> {
    Ok(self.state.lock().unwrap().installed.contains(name))
  }

  async fn repository_enabled(&self, id: &str) -> Result<bool, SystemError> {
    Ok(self.state.lock().unwrap().repos.contains(id))
  }

  async fn install(&self, names: &[String]) -> Result<(), SystemError> {
    self.record(format!("install:{}", names.join(",")));
    let mut state = self.state.lock().unwrap();
    for name in names {
      if state.fail_install.contains(name) {
        return Err(failed(&format!("install {name}")));
      }
    }
    state.installed.extend(names.iter().cloned());
    Ok(())
  }

  async fn remove(&self, names: &[String]) -> Result<(), SystemError> {
    self.record(format!("remove:{}", names.join(",")));
    let mut state = self.state.lock().unwrap();
    for name in names {
      if state.fail_remove.contains(name) {
        return Err(failed(&format!("remove {name}")));
      }
    }
    for name in names {
      state.installed.remove(name);
    }
    Ok(())
  }

  async fn add_repository(&self, id: &str, _url: &str) -> Result<(), SystemError> {
    self.record(format!("add-repo:{id}"));
    let mut state = self.state.lock().unwrap();
    if state.fail_repo_add.contains(id) {
      return Err(failed(&format!("add-repo {id}")));
    }
    state.repos.insert(id.to_string());
    Ok(())
  }

  async fn remove_repository(&self, id: &str) -> Result<(), SystemError> {
    self.record(format!("remove-repo:{id}"));
    self.state.lock().unwrap().repos.remove(id);
    Ok(())
  }

  async fn upgrade_all(&self) -> Result<(), SystemError> {
    self.record("upgrade".to_string());
    if self.state.lock().unwrap().fail_upgrade {
      return Err(failed("upgrade"));
    }
    Ok(())
  }
}

#[async_trait]
impl AppSandboxClient for FakeSystem {
  async fn remote_exists(&self, name: &str) -> Result<bool, SystemError> {
    Ok(self.state.lock().unwrap().remotes.contains(name))
  }

  async fn add_remote(&self, name: &str, _url: &str) -> Result<(), SystemError> {
    self.record(format!("add-remote:{name}"));
    self.state.lock().unwrap().remotes.insert(name.to_string());
    Ok(())
  }

  async fn is_installed(&self, app_id: &str) -> Result<bool, SystemError> {
    Ok(self.state.lock().unwrap().apps.contains(app_id))
  }

  async fn install(&self, app_ids: &[String]) -> Result<(), SystemError> {
    self.record(format!("install-apps:{}", app_ids.join(",")));
    self.state.lock().unwrap().apps.extend(app_ids.iter().cloned());
    Ok(())
  }

  async fn prune_unused(&self) -> Result<(), SystemError> {
    self.record("prune-apps".to_string());
    Ok(())
  }
}

#[async_trait]
impl SnapshotTool for FakeSystem {
  async fn config_exists(&self, label: &str) -> Result<bool, SystemError> {
    Ok(self.state.lock().unwrap().snapshot_configs.contains(label))
  }

  async fn create_config(&self, label: &str, _path: &str) -> Result<(), SystemError> {
    self.record(format!("create-snapshot-config:{label}"));
    self.state.lock().unwrap().snapshot_configs.insert(label.to_string());
    Ok(())
  }

  async fn create_snapshot(&self, label: &str, description: &str) -> Result<(), SystemError> {
    self.record(format!("create-snapshot:{label}"));
    self
      .state
      .lock()
      .unwrap()
      .snapshots
      .push((label.to_string(), description.to_string()));
    Ok(())
  }
}

#[async_trait]
impl SystemIdentity for FakeSystem {
  async fn current_user(&self) -> Result<String, SystemError> {
    Ok("tester".to_string())
  }

  async fn home_dir(&self, user: &str) -> Result<String, SystemError> {
    Ok(format!("/home/{user}"))
  }

  async fn current_hostname(&self) -> Result<String, SystemError> {
    Ok(self.state.lock().unwrap().hostname.clone())
  }

  async fn set_hostname(&self, name: &str) -> Result<(), SystemError> {
    self.record(format!("set-hostname:{name}"));
    self.state.lock().unwrap().hostname = name.to_string();
    Ok(())
  }
}

#[async_trait]
impl MountTable for FakeSystem {
  async fn device_exists(&self, device: &str) -> Result<bool, SystemError> {
    Ok(self.state.lock().unwrap().devices.contains(device))
  }

  async fn mount_point_exists(&self, path: &str) -> Result<bool, SystemError> {
    Ok(self.state.lock().unwrap().mount_points.contains(path))
  }

  async fn is_mounted(&self, path: &str) -> Result<bool, SystemError> {
    Ok(self.state.lock().unwrap().mounted.contains(path))
  }

  async fn fstab_contains(&self, path: &str) -> Result<bool, SystemError> {
    Ok(self.state.lock().unwrap().fstab.iter().any(|e| e.path == path))
  }

  async fn create_mount_point(&self, path: &str) -> Result<(), SystemError> {
    self.record(format!("mkdir:{path}"));
    self.state.lock().unwrap().mount_points.insert(path.to_string());
    Ok(())
  }

  async fn mount(&self, _device: &str, path: &str, _fstype: &str, _options: &str) -> Result<(), SystemError> {
    self.record(format!("mount:{path}"));
    self.state.lock().unwrap().mounted.insert(path.to_string());
    Ok(())
  }

  async fn append_fstab_entry(&self, entry: &FstabEntry) -> Result<bool, SystemError> {
    let mut state = self.state.lock().unwrap();
    if state.fstab.iter().any(|e| e.path == entry.path) {
      return Ok(false);
    }
    state.calls.push(format!("fstab:{}", entry.path));
    state.fstab.push(entry.clone());
    Ok(true)
  }
}

#[async_trait]
impl GroupRegistry for FakeSystem {
  async fn group_exists(&self, name: &str) -> Result<bool, SystemError> {
    Ok(self.state.lock().unwrap().groups.contains_key(name))
  }

  async fn is_member(&self, user: &str, name: &str) -> Result<bool, SystemError> {
    Ok(
      self
        .state
        .lock()
        .unwrap()
        .groups
        .get(name)
        .is_some_and(|members| members.contains(user)),
    )
  }

  async fn add_user_to_group(&self, user: &str, name: &str) -> Result<(), SystemError> {
    self.record(format!("add-to-group:{name}:{user}"));
    let mut state = self.state.lock().unwrap();
    match state.groups.get_mut(name) {
      Some(members) => {
        members.insert(user.to_string());
        Ok(())
      }
      None => Err(failed(&format!("usermod -aG {name}"))),
    }
  }
}

#[async_trait]
impl ServiceManager for FakeSystem {
  async fn is_enabled(&self, unit: &str) -> Result<bool, SystemError> {
    Ok(self.state.lock().unwrap().enabled_units.contains(unit))
  }

  async fn set_enabled(&self, unit: &str, enabled: bool) -> Result<(), SystemError> {
    self.record(format!("set-service:{unit}:{enabled}"));
    let mut state = self.state.lock().unwrap();
    if enabled {
      state.enabled_units.insert(unit.to_string());
    } else {
      state.enabled_units.remove(unit);
    }
    Ok(())
  }
}
