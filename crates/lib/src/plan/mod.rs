//! Diff engine: desired state vs probed state, producing an ordered plan.
//!
//! The plan preserves the declared resource order; per-kind policies decide
//! which imperative steps each resource needs. Already-satisfied resources
//! still appear in the plan as explicit skips, so the final accounting
//! covers the full desired state.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::RunContext;
use crate::manifest::{DesiredState, RepoOp, ResourceId, ResourceParams, ResourceSpec, ServiceTarget};
use crate::probe::{ProbeResult, check_precondition, probe_resource};
use crate::report::Reporter;
use crate::system::{FstabEntry, System};

/// One imperative step of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
  AddRepository { id: String, url: String },
  RemoveRepository { id: String },
  UpgradeSystem,
  InstallPackages { packages: Vec<String> },
  RemovePackages { packages: Vec<String> },
  AddAppRemote { name: String, url: String },
  InstallApps { apps: Vec<String> },
  PruneUnusedApps,
  AddUserToGroup { user: String, group: String },
  CreateMountPoint { path: String },
  MountDevice { device: String, path: String, fstype: String, options: String },
  AppendFstabEntry { entry: FstabEntry },
  CreateSnapshotConfig { label: String, path: String },
  CreateSnapshot { label: String, description: String },
  SetHostname { name: String },
  WriteDotfile { path: String, content: String },
  SetServiceState { unit: String, enabled: bool },
  /// Nothing to do; `warn` marks precondition/guard skips as opposed to
  /// already-satisfied state.
  Skip { reason: String, warn: bool },
}

impl Op {
  pub fn is_skip(&self) -> bool {
    matches!(self, Op::Skip { .. })
  }
}

impl fmt::Display for Op {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Op::AddRepository { id, .. } => write!(f, "add repository {id}"),
      Op::RemoveRepository { id } => write!(f, "remove repository {id}"),
      Op::UpgradeSystem => write!(f, "upgrade all packages"),
      Op::InstallPackages { packages } => write!(f, "install {}", packages.join(", ")),
      Op::RemovePackages { packages } => write!(f, "remove {}", packages.join(", ")),
      Op::AddAppRemote { name, .. } => write!(f, "add app remote {name}"),
      Op::InstallApps { apps } => write!(f, "install apps {}", apps.join(", ")),
      Op::PruneUnusedApps => write!(f, "prune unused apps"),
      Op::AddUserToGroup { user, group } => write!(f, "add {user} to group {group}"),
      Op::CreateMountPoint { path } => write!(f, "create mount point {path}"),
      Op::MountDevice { path, .. } => write!(f, "mount {path}"),
      Op::AppendFstabEntry { entry } => write!(f, "add fstab entry for {}", entry.path),
      Op::CreateSnapshotConfig { label, .. } => write!(f, "create snapshot config {label}"),
      Op::CreateSnapshot { label, description } => write!(f, "snapshot {label} ({description})"),
      Op::SetHostname { name } => write!(f, "set hostname to {name}"),
      Op::WriteDotfile { path, .. } => write!(f, "write {path}"),
      Op::SetServiceState { unit, enabled } => {
        write!(f, "{} {unit}", if *enabled { "enable" } else { "disable" })
      }
      Op::Skip { reason, .. } => write!(f, "skip: {reason}"),
    }
  }
}

/// A planned step tied to the resource that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
  pub resource: ResourceId,
  pub op: Op,
  /// Failure of a critical action aborts the remainder of the run.
  pub critical: bool,
  /// Actions sharing a pair key succeed or fail together (package swaps).
  pub pair: Option<String>,
}

impl Action {
  fn new(resource: ResourceId, op: Op) -> Self {
    Self {
      resource,
      op,
      critical: false,
      pair: None,
    }
  }

  fn critical(mut self) -> Self {
    self.critical = true;
    self
  }

  fn paired(mut self, key: &str) -> Self {
    self.pair = Some(key.to_string());
    self
  }
}

/// Ordered action list for one run.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
  pub actions: Vec<Action>,
}

impl Plan {
  /// Number of actions that would mutate the system.
  pub fn change_count(&self) -> usize {
    self.actions.iter().filter(|a| !a.op.is_skip()).count()
  }

  pub fn has_changes(&self) -> bool {
    self.change_count() > 0
  }
}

/// Compute the ordered plan for a desired state.
///
/// Probing errors are not fatal here: the planner logs a warning, assumes
/// the resource is unsatisfied and emits the create action; if the state
/// really is unreachable the action itself will fail and be recorded.
pub async fn compute_plan(
  desired: &DesiredState,
  system: &System,
  ctx: &RunContext,
  reporter: &mut Reporter,
) -> Plan {
  let mut plan = Plan::default();

  for spec in desired {
    if let Some(precondition) = &spec.precondition
      && !check_precondition(precondition)
    {
      reporter.warning(format!("{}: precondition not met, skipping", spec.id()));
      push_precondition_skips(&mut plan, spec);
      continue;
    }

    let probed = match probe_resource(spec, system, ctx).await {
      Ok(result) => Some(result),
      Err(e) => {
        warn!(resource = %spec.id(), error = %e, "probe failed, assuming unsatisfied");
        reporter.warning(format!("{}: probe failed ({e}), assuming not satisfied", spec.id()));
        None
      }
    };

    plan_resource(&mut plan, spec, probed, ctx);
  }

  debug!(actions = plan.actions.len(), changes = plan.change_count(), "plan computed");
  plan
}

/// Emit skip actions for a resource whose precondition failed.
///
/// Mounts expand to their three sub-actions so the accounting matches what
/// a passing precondition would have produced.
fn push_precondition_skips(plan: &mut Plan, spec: &ResourceSpec) {
  let reason = "precondition not met".to_string();
  let count = if matches!(spec.params, ResourceParams::Mount(_)) { 3 } else { 1 };
  for _ in 0..count {
    plan.actions.push(Action::new(
      spec.id(),
      Op::Skip {
        reason: reason.clone(),
        warn: true,
      },
    ));
  }
}

fn skip(spec: &ResourceSpec, reason: impl Into<String>) -> Action {
  Action::new(
    spec.id(),
    Op::Skip {
      reason: reason.into(),
      warn: false,
    },
  )
}

fn skip_warn(spec: &ResourceSpec, reason: impl Into<String>) -> Action {
  Action::new(
    spec.id(),
    Op::Skip {
      reason: reason.into(),
      warn: true,
    },
  )
}

fn plan_resource(plan: &mut Plan, spec: &ResourceSpec, probed: Option<ProbeResult>, ctx: &RunContext) {
  let id = spec.id();

  match &spec.params {
    ResourceParams::Repository(repo) => {
      let enabled = matches!(probed, Some(ProbeResult::Repository { enabled: true }));
      let action = match (repo.op, enabled) {
        (RepoOp::Add, true) => skip(spec, "repository already enabled"),
        (RepoOp::Add, false) => Action::new(
          id,
          Op::AddRepository {
            id: spec.name.clone(),
            url: repo.url.clone().unwrap_or_default(),
          },
        )
        .critical(),
        (RepoOp::Remove, true) => Action::new(id, Op::RemoveRepository { id: spec.name.clone() }).critical(),
        (RepoOp::Remove, false) => skip(spec, "repository already absent"),
      };
      plan.actions.push(action);
    }

    ResourceParams::SystemUpgrade => {
      plan.actions.push(Action::new(id, Op::UpgradeSystem).critical());
    }

    ResourceParams::PackageSet(set) => {
      let (installed, missing) = match probed {
        Some(ProbeResult::Packages { installed, missing }) => (installed, missing),
        _ => (Vec::new(), set.packages.clone()),
      };

      if missing.is_empty() {
        plan.actions.push(skip(spec, "all packages already installed"));
        return;
      }
      plan
        .actions
        .push(Action::new(id.clone(), Op::InstallPackages { packages: missing }));
      if !installed.is_empty() {
        plan
          .actions
          .push(skip(spec, format!("already installed: {}", installed.join(", "))));
      }
    }

    ResourceParams::PackageSwap(swap) => {
      let (old_installed, new_installed) = match probed {
        Some(ProbeResult::Swap {
          old_installed,
          new_installed,
        }) => (old_installed, new_installed),
        _ => (true, false),
      };

      match (old_installed, new_installed) {
        (false, true) => plan.actions.push(skip(spec, "swap already applied")),
        (false, false) => plan.actions.push(Action::new(
          id,
          Op::InstallPackages {
            packages: vec![swap.install.clone()],
          },
        )),
        (true, _) => {
          // Both halves must land or the pair is reported failed together.
          let key = format!("swap:{}", spec.name);
          plan.actions.push(
            Action::new(
              id.clone(),
              Op::RemovePackages {
                packages: vec![swap.remove.clone()],
              },
            )
            .paired(&key),
          );
          plan.actions.push(
            Action::new(
              id,
              Op::InstallPackages {
                packages: vec![swap.install.clone()],
              },
            )
            .paired(&key),
          );
        }
      }
    }

    ResourceParams::AppRemote { url } => {
      let exists = matches!(probed, Some(ProbeResult::AppRemote { exists: true }));
      if exists {
        plan.actions.push(skip(spec, "remote already configured"));
      } else {
        plan.actions.push(Action::new(
          id,
          Op::AddAppRemote {
            name: spec.name.clone(),
            url: url.clone(),
          },
        ));
      }
    }

    ResourceParams::AppSet { apps, prune } => {
      let (installed, missing) = match probed {
        Some(ProbeResult::Apps { installed, missing }) => (installed, missing),
        _ => (Vec::new(), apps.clone()),
      };

      if missing.is_empty() {
        plan.actions.push(skip(spec, "all apps already installed"));
      } else {
        plan
          .actions
          .push(Action::new(id.clone(), Op::InstallApps { apps: missing }));
        if !installed.is_empty() {
          plan
            .actions
            .push(skip(spec, format!("already installed: {}", installed.join(", "))));
        }
      }

      // Pruning is a cleanup pass, requested per set and run every time.
      if *prune {
        plan.actions.push(Action::new(id, Op::PruneUnusedApps));
      }
    }

    ResourceParams::GroupMembership { group } => {
      let (exists, member) = match probed {
        Some(ProbeResult::Group { exists, member }) => (exists, member),
        _ => (false, false),
      };

      if !exists {
        plan.actions.push(skip_warn(spec, format!("group {group} does not exist")));
      } else if member {
        plan.actions.push(skip(spec, "already a member"));
      } else {
        plan.actions.push(Action::new(
          id,
          Op::AddUserToGroup {
            user: ctx.user.clone(),
            group: group.clone(),
          },
        ));
      }
    }

    ResourceParams::Mount(mount) => {
      let (device_present, point_exists, mounted, in_fstab) = match probed {
        Some(ProbeResult::Mount {
          device_present,
          point_exists,
          mounted,
          in_fstab,
        }) => (device_present, point_exists, mounted, in_fstab),
        _ => (false, false, false, false),
      };

      if !device_present {
        // All three sub-actions are skipped as a group when the backing
        // device is missing; none of them may fail.
        let reason = format!("device {} not present", mount.device);
        for _ in 0..3 {
          plan.actions.push(skip_warn(spec, reason.clone()));
        }
        return;
      }

      plan.actions.push(if point_exists {
        skip(spec, "mount point already exists")
      } else {
        Action::new(id.clone(), Op::CreateMountPoint { path: mount.path.clone() })
      });

      plan.actions.push(if mounted {
        skip(spec, "already mounted")
      } else {
        Action::new(
          id.clone(),
          Op::MountDevice {
            device: mount.device.clone(),
            path: mount.path.clone(),
            fstype: mount.fstype.clone(),
            options: mount.options.clone(),
          },
        )
      });

      plan.actions.push(if in_fstab {
        skip(spec, "fstab entry already present")
      } else {
        Action::new(
          id,
          Op::AppendFstabEntry {
            entry: FstabEntry {
              device: mount.device.clone(),
              path: mount.path.clone(),
              fstype: mount.fstype.clone(),
              options: mount.options.clone(),
            },
          },
        )
      });
    }

    ResourceParams::SnapshotConfig(config) => {
      let exists = matches!(probed, Some(ProbeResult::SnapshotConfig { exists: true }));
      if exists {
        plan.actions.push(skip(spec, "snapshot config already exists"));
      } else {
        plan.actions.push(Action::new(
          id,
          Op::CreateSnapshotConfig {
            label: spec.name.clone(),
            path: config.path.clone(),
          },
        ));
      }
    }

    ResourceParams::Snapshot(snapshot) => {
      // Each run's snapshot is distinct; never idempotency-skipped.
      plan.actions.push(Action::new(
        id,
        Op::CreateSnapshot {
          label: snapshot.config.clone(),
          description: snapshot.description.clone(),
        },
      ));
    }

    ResourceParams::Hostname { name } => {
      let current = match probed {
        Some(ProbeResult::Hostname { current }) => current,
        _ => String::new(),
      };
      if current == *name {
        plan.actions.push(skip(spec, "hostname already set"));
      } else {
        plan.actions.push(Action::new(id, Op::SetHostname { name: name.clone() }));
      }
    }

    ResourceParams::Dotfile(dotfile) => match probed {
      Some(ProbeResult::Dotfile { in_sync: true, .. }) => {
        plan.actions.push(skip(spec, "dotfile already in sync"));
      }
      Some(ProbeResult::Dotfile { path, content, .. }) => {
        plan.actions.push(Action::new(id, Op::WriteDotfile { path, content }));
      }
      _ => {
        // Probe (and therefore rendering) failed; fall back to raw values
        // so the executor surfaces the real error.
        plan.actions.push(Action::new(
          id,
          Op::WriteDotfile {
            path: dotfile.path.clone(),
            content: dotfile.content.clone(),
          },
        ));
      }
    },

    ResourceParams::ServiceState(service) => {
      let enabled = matches!(probed, Some(ProbeResult::Service { enabled: true }));
      let wanted = service.state == ServiceTarget::Enabled;
      if enabled == wanted {
        plan.actions.push(skip(spec, "service already in desired state"));
      } else {
        plan.actions.push(Action::new(
          id,
          Op::SetServiceState {
            unit: spec.name.clone(),
            enabled: wanted,
          },
        ));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::manifest::{
    MountSpec, PackageSetSpec, PackageSwapSpec, Precondition, RepositorySpec, ResourceSpec, SnapshotSpec,
  };
  use crate::system::fake::FakeSystem;
  use std::sync::Arc;

  fn ctx() -> RunContext {
    RunContext {
      user: "tester".to_string(),
      home: "/home/tester".to_string(),
      hostname: "fake-host".to_string(),
      elevated: true,
    }
  }

  fn fake_system() -> (Arc<FakeSystem>, System) {
    let fake = Arc::new(FakeSystem::new());
    let system = System::from_fake(fake.clone());
    (fake, system)
  }

  fn repo_add(name: &str) -> ResourceSpec {
    ResourceSpec::new(
      name,
      ResourceParams::Repository(RepositorySpec {
        url: Some(format!("https://repo.example/{name}.repo")),
        op: RepoOp::Add,
      }),
    )
  }

  fn package_set(name: &str, pkgs: &[&str]) -> ResourceSpec {
    ResourceSpec::new(
      name,
      ResourceParams::PackageSet(PackageSetSpec {
        packages: pkgs.iter().map(|s| s.to_string()).collect(),
      }),
    )
  }

  async fn plan_for(desired: &DesiredState, system: &System) -> Plan {
    let mut reporter = Reporter::silent();
    compute_plan(desired, system, &ctx(), &mut reporter).await
  }

  #[tokio::test]
  async fn worked_example_repo_and_packages() {
    // Desired: [repo A (add), package-set {vim, git}]; probed: git installed.
    let (fake, system) = fake_system();
    fake.seed_package("git");

    let mut desired = DesiredState::new();
    desired.push(repo_add("repo-a"));
    desired.push(package_set("tools", &["vim", "git"]));

    let plan = plan_for(&desired, &system).await;

    let ops: Vec<&Op> = plan.actions.iter().map(|a| &a.op).collect();
    assert_eq!(ops.len(), 3);
    assert!(matches!(ops[0], Op::AddRepository { id, .. } if id == "repo-a"));
    assert!(matches!(ops[1], Op::InstallPackages { packages } if packages == &["vim".to_string()]));
    assert!(matches!(ops[2], Op::Skip { reason, .. } if reason.contains("git")));
  }

  #[tokio::test]
  async fn repository_actions_precede_installs_even_when_declared_late() {
    let (fake, system) = fake_system();
    fake.seed_repo("fedora-cisco-openh264");

    let mut desired = DesiredState::new();
    desired.push(repo_add("rpmfusion"));
    desired.push(package_set("codecs", &["ffmpeg"]));
    desired.push(ResourceSpec::new(
      "fedora-cisco-openh264",
      ResourceParams::Repository(RepositorySpec {
        url: None,
        op: RepoOp::Remove,
      }),
    ));
    desired.normalize();

    let plan = plan_for(&desired, &system).await;

    let removal_idx = plan
      .actions
      .iter()
      .position(|a| matches!(a.op, Op::RemoveRepository { .. }))
      .unwrap();
    let add_idx = plan
      .actions
      .iter()
      .position(|a| matches!(a.op, Op::AddRepository { .. }))
      .unwrap();
    let install_idx = plan
      .actions
      .iter()
      .position(|a| matches!(a.op, Op::InstallPackages { .. }))
      .unwrap();

    assert!(removal_idx < add_idx);
    assert!(add_idx < install_idx);
  }

  #[tokio::test]
  async fn missing_group_produces_warning_skip_not_failure() {
    let (_fake, system) = fake_system();

    let mut desired = DesiredState::new();
    desired.push(ResourceSpec::new(
      "libvirt",
      ResourceParams::GroupMembership {
        group: "libvirt".to_string(),
      },
    ));

    let plan = plan_for(&desired, &system).await;
    assert_eq!(plan.actions.len(), 1);
    assert!(matches!(
      &plan.actions[0].op,
      Op::Skip { warn: true, reason } if reason.contains("does not exist")
    ));
    assert_eq!(plan.change_count(), 0);
  }

  #[tokio::test]
  async fn absent_device_skips_all_three_mount_sub_actions() {
    let (_fake, system) = fake_system();

    let mut desired = DesiredState::new();
    desired.push(ResourceSpec::new(
      "/mnt/games",
      ResourceParams::Mount(MountSpec {
        device: "UUID=missing".to_string(),
        path: "/mnt/games".to_string(),
        fstype: "ext4".to_string(),
        options: "defaults".to_string(),
      }),
    ));

    let plan = plan_for(&desired, &system).await;
    assert_eq!(plan.actions.len(), 3);
    assert!(plan.actions.iter().all(|a| matches!(a.op, Op::Skip { warn: true, .. })));
  }

  #[tokio::test]
  async fn present_device_plans_only_unsatisfied_sub_actions() {
    let (fake, system) = fake_system();
    fake.seed_device("UUID=abcd");
    fake.seed_mount_point("/mnt/games");

    let mut desired = DesiredState::new();
    desired.push(ResourceSpec::new(
      "/mnt/games",
      ResourceParams::Mount(MountSpec {
        device: "UUID=abcd".to_string(),
        path: "/mnt/games".to_string(),
        fstype: "ext4".to_string(),
        options: "defaults".to_string(),
      }),
    ));

    let plan = plan_for(&desired, &system).await;
    assert_eq!(plan.actions.len(), 3);
    assert!(matches!(plan.actions[0].op, Op::Skip { .. }));
    assert!(matches!(plan.actions[1].op, Op::MountDevice { .. }));
    assert!(matches!(plan.actions[2].op, Op::AppendFstabEntry { .. }));
  }

  #[tokio::test]
  async fn snapshot_is_never_skipped() {
    let (fake, system) = fake_system();
    fake.seed_snapshot_config("root");

    let mut desired = DesiredState::new();
    desired.push(ResourceSpec::new(
      "baseline",
      ResourceParams::Snapshot(SnapshotSpec {
        config: "root".to_string(),
        description: "before provisioning".to_string(),
      }),
    ));

    // Two consecutive plans both contain the snapshot action.
    for _ in 0..2 {
      let plan = plan_for(&desired, &system).await;
      assert!(matches!(plan.actions[0].op, Op::CreateSnapshot { .. }));
    }
  }

  #[tokio::test]
  async fn swap_emits_paired_actions() {
    let (fake, system) = fake_system();
    fake.seed_package("ffmpeg-free");

    let mut desired = DesiredState::new();
    desired.push(ResourceSpec::new(
      "ffmpeg",
      ResourceParams::PackageSwap(PackageSwapSpec {
        remove: "ffmpeg-free".to_string(),
        install: "ffmpeg".to_string(),
      }),
    ));

    let plan = plan_for(&desired, &system).await;
    assert_eq!(plan.actions.len(), 2);
    assert!(matches!(plan.actions[0].op, Op::RemovePackages { .. }));
    assert!(matches!(plan.actions[1].op, Op::InstallPackages { .. }));
    assert_eq!(plan.actions[0].pair, plan.actions[1].pair);
    assert!(plan.actions[0].pair.is_some());
  }

  #[tokio::test]
  async fn applied_swap_is_skipped() {
    let (fake, system) = fake_system();
    fake.seed_package("ffmpeg");

    let mut desired = DesiredState::new();
    desired.push(ResourceSpec::new(
      "ffmpeg",
      ResourceParams::PackageSwap(PackageSwapSpec {
        remove: "ffmpeg-free".to_string(),
        install: "ffmpeg".to_string(),
      }),
    ));

    let plan = plan_for(&desired, &system).await;
    assert_eq!(plan.actions.len(), 1);
    assert!(plan.actions[0].op.is_skip());
  }

  #[tokio::test]
  async fn app_set_installs_missing_and_prunes_on_request() {
    let (fake, system) = fake_system();
    fake.seed_app("org.mozilla.firefox");

    let mut desired = DesiredState::new();
    desired.push(ResourceSpec::new(
      "desktop-apps",
      ResourceParams::AppSet {
        apps: vec!["org.mozilla.firefox".to_string(), "org.gimp.GIMP".to_string()],
        prune: true,
      },
    ));

    let plan = plan_for(&desired, &system).await;
    let ops: Vec<&Op> = plan.actions.iter().map(|a| &a.op).collect();
    assert_eq!(ops.len(), 3);
    assert!(matches!(ops[0], Op::InstallApps { apps } if apps == &["org.gimp.GIMP".to_string()]));
    assert!(matches!(ops[1], Op::Skip { reason, .. } if reason.contains("org.mozilla.firefox")));
    assert!(matches!(ops[2], Op::PruneUnusedApps));
  }

  #[tokio::test]
  async fn failed_precondition_skips_resource_with_warning() {
    let (_fake, system) = fake_system();

    let mut desired = DesiredState::new();
    desired.push(
      package_set("amd-tools", &["radeontop"])
        .with_precondition(Precondition::FileExists("/definitely/not/here".to_string())),
    );

    let plan = plan_for(&desired, &system).await;
    assert_eq!(plan.actions.len(), 1);
    assert!(matches!(plan.actions[0].op, Op::Skip { warn: true, .. }));
  }

  #[tokio::test]
  async fn critical_flags_are_limited_to_repos_and_upgrade() {
    let (_fake, system) = fake_system();

    let mut desired = DesiredState::new();
    desired.push(repo_add("rpmfusion"));
    desired.push(ResourceSpec::new("base", ResourceParams::SystemUpgrade));
    desired.push(package_set("tools", &["vim"]));

    let plan = plan_for(&desired, &system).await;
    let critical: Vec<bool> = plan.actions.iter().map(|a| a.critical).collect();
    assert_eq!(critical, [true, true, false]);
  }

  #[tokio::test]
  async fn satisfied_state_plans_only_skips() {
    let (fake, system) = fake_system();
    fake.seed_repo("rpmfusion");
    fake.seed_package("vim");
    fake.seed_group("libvirt");
    fake.seed_group_member("libvirt", "tester");

    let mut desired = DesiredState::new();
    desired.push(repo_add("rpmfusion"));
    desired.push(package_set("tools", &["vim"]));
    desired.push(ResourceSpec::new(
      "libvirt",
      ResourceParams::GroupMembership {
        group: "libvirt".to_string(),
      },
    ));

    let plan = plan_for(&desired, &system).await;
    assert!(!plan.has_changes());
    assert_eq!(plan.actions.len(), 3);
  }
}
