//! Sequential plan executor.
//!
//! Actions run strictly in plan order. Immediately before each action the
//! executor re-checks idempotency with a cheap re-probe, so drift caused by
//! earlier actions in the same run (a swap installing a package another set
//! also wants, say) turns into a skip instead of a redundant mutation.
//!
//! A failed action does not halt the run unless it is critical; critical
//! failures abandon the remainder of the plan, which is recorded as
//! skipped. The two halves of a package swap succeed or fail together.

use std::collections::HashSet;

use tracing::{debug, error, info};

use crate::context::RunContext;
use crate::plan::{Op, Plan};
use crate::report::Reporter;
use crate::system::{System, SystemError};

use super::types::{ActionRecord, ActionStatus};

/// Execute the plan, returning one record per action.
pub async fn execute_plan(
  plan: Plan,
  system: &System,
  ctx: &RunContext,
  reporter: &mut Reporter,
) -> Vec<ActionRecord> {
  debug!(user = %ctx.user, host = %ctx.hostname, actions = plan.actions.len(), "executing plan");

  let mut records: Vec<ActionRecord> = Vec::with_capacity(plan.actions.len());
  let mut aborted = false;

  for action in plan.actions {
    if aborted {
      reporter.warning(format!("{}: skipped, run aborted after critical failure", action.resource));
      records.push(ActionRecord::skipped(action));
      continue;
    }

    if let Op::Skip { reason, warn } = &action.op {
      if *warn {
        reporter.warning(format!("{}: {}", action.resource, reason));
      } else {
        reporter.info(format!("{}: {}", action.resource, reason));
      }
      records.push(ActionRecord::skipped(action));
      continue;
    }

    // Idempotency guard: re-probe right before executing, not only at plan
    // time, to tolerate drift from earlier actions in this run.
    let op = match refine_op(&action.op, system).await {
      Ok(Some(op)) => op,
      Ok(None) => {
        reporter.info(format!("{}: already satisfied", action.resource));
        records.push(ActionRecord::skipped(action));
        continue;
      }
      // The re-probe failing is not a reason to give up; run the planned op.
      Err(_) => action.op.clone(),
    };

    reporter.info(format!("{}: {}", action.resource, op));
    match perform(&op, system).await {
      Ok(()) => {
        info!(resource = %action.resource, "action succeeded");
        reporter.success(format!("{}: done", action.resource));
        records.push(ActionRecord::succeeded(action));
      }
      Err(e) => {
        error!(resource = %action.resource, error = %e, "action failed");
        reporter.error(format!("{}: {}", action.resource, e));
        let critical = action.critical;
        records.push(ActionRecord::failed(action, e.to_string()));
        if critical {
          reporter.error("critical action failed, aborting remaining plan");
          aborted = true;
        }
      }
    }
  }

  fail_broken_pairs(&mut records, reporter);
  records
}

/// Re-check whether an op is still needed; `None` means already satisfied.
///
/// Package and app installs are narrowed to the still-missing subset.
async fn refine_op(op: &Op, system: &System) -> Result<Option<Op>, SystemError> {
  match op {
    Op::AddRepository { id, .. } => {
      if system.packages.repository_enabled(id).await? {
        return Ok(None);
      }
    }
    Op::RemoveRepository { id } => {
      if !system.packages.repository_enabled(id).await? {
        return Ok(None);
      }
    }
    Op::InstallPackages { packages } => {
      let mut missing = Vec::new();
      for package in packages {
        if !system.packages.is_installed(package).await? {
          missing.push(package.clone());
        }
      }
      if missing.is_empty() {
        return Ok(None);
      }
      return Ok(Some(Op::InstallPackages { packages: missing }));
    }
    Op::RemovePackages { packages } => {
      let mut present = Vec::new();
      for package in packages {
        if system.packages.is_installed(package).await? {
          present.push(package.clone());
        }
      }
      if present.is_empty() {
        return Ok(None);
      }
      return Ok(Some(Op::RemovePackages { packages: present }));
    }
    Op::AddAppRemote { name, .. } => {
      if system.apps.remote_exists(name).await? {
        return Ok(None);
      }
    }
    Op::InstallApps { apps } => {
      let mut missing = Vec::new();
      for app in apps {
        if !system.apps.is_installed(app).await? {
          missing.push(app.clone());
        }
      }
      if missing.is_empty() {
        return Ok(None);
      }
      return Ok(Some(Op::InstallApps { apps: missing }));
    }
    Op::AddUserToGroup { user, group } => {
      if system.groups.is_member(user, group).await? {
        return Ok(None);
      }
    }
    Op::CreateMountPoint { path } => {
      if system.mounts.mount_point_exists(path).await? {
        return Ok(None);
      }
    }
    Op::MountDevice { path, .. } => {
      if system.mounts.is_mounted(path).await? {
        return Ok(None);
      }
    }
    Op::AppendFstabEntry { entry } => {
      if system.mounts.fstab_contains(&entry.path).await? {
        return Ok(None);
      }
    }
    Op::CreateSnapshotConfig { label, .. } => {
      if system.snapshots.config_exists(label).await? {
        return Ok(None);
      }
    }
    Op::SetHostname { name } => {
      if system.identity.current_hostname().await? == *name {
        return Ok(None);
      }
    }
    Op::SetServiceState { unit, enabled } => {
      if system.services.is_enabled(unit).await? == *enabled {
        return Ok(None);
      }
    }
    Op::WriteDotfile { path, content } => {
      if let Ok(existing) = tokio::fs::read_to_string(path).await
        && existing == *content
      {
        return Ok(None);
      }
    }
    // Upgrades, snapshots and prune passes run every time.
    Op::UpgradeSystem | Op::CreateSnapshot { .. } | Op::PruneUnusedApps => {}
    Op::Skip { .. } => return Ok(None),
  }

  Ok(Some(op.clone()))
}

/// Invoke the collaborator call backing an op.
async fn perform(op: &Op, system: &System) -> Result<(), SystemError> {
  match op {
    Op::AddRepository { id, url } => system.packages.add_repository(id, url).await,
    Op::RemoveRepository { id } => system.packages.remove_repository(id).await,
    Op::UpgradeSystem => system.packages.upgrade_all().await,
    Op::InstallPackages { packages } => system.packages.install(packages).await,
    Op::RemovePackages { packages } => system.packages.remove(packages).await,
    Op::AddAppRemote { name, url } => system.apps.add_remote(name, url).await,
    Op::InstallApps { apps } => system.apps.install(apps).await,
    Op::PruneUnusedApps => system.apps.prune_unused().await,
    Op::AddUserToGroup { user, group } => system.groups.add_user_to_group(user, group).await,
    Op::CreateMountPoint { path } => system.mounts.create_mount_point(path).await,
    Op::MountDevice {
      device,
      path,
      fstype,
      options,
    } => system.mounts.mount(device, path, fstype, options).await,
    Op::AppendFstabEntry { entry } => system.mounts.append_fstab_entry(entry).await.map(|_| ()),
    Op::CreateSnapshotConfig { label, path } => system.snapshots.create_config(label, path).await,
    Op::CreateSnapshot { label, description } => system.snapshots.create_snapshot(label, description).await,
    Op::SetHostname { name } => system.identity.set_hostname(name).await,
    Op::WriteDotfile { path, content } => write_dotfile(path, content).await,
    Op::SetServiceState { unit, enabled } => system.services.set_enabled(unit, *enabled).await,
    Op::Skip { .. } => Ok(()),
  }
}

async fn write_dotfile(path: &str, content: &str) -> Result<(), SystemError> {
  if let Some(parent) = std::path::Path::new(path).parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .map_err(|source| SystemError::Io {
        cmd: format!("mkdir -p {}", parent.display()),
        source,
      })?;
  }
  tokio::fs::write(path, content).await.map_err(|source| SystemError::Io {
    cmd: format!("write {path}"),
    source,
  })
}

/// Report both halves of a swap as failed when either half failed.
fn fail_broken_pairs(records: &mut [ActionRecord], reporter: &mut Reporter) {
  let broken: HashSet<String> = records
    .iter()
    .filter(|r| r.status == ActionStatus::Failed)
    .filter_map(|r| r.action.pair.clone())
    .collect();

  if broken.is_empty() {
    return;
  }

  for record in records.iter_mut() {
    if record.status == ActionStatus::Succeeded
      && let Some(pair) = &record.action.pair
      && broken.contains(pair)
    {
      reporter.error(format!("{}: paired action failed, reporting pair as failed", record.action.resource));
      record.status = ActionStatus::Failed;
      record.error_detail = Some("paired action failed".to_string());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::manifest::{
    DesiredState, PackageSetSpec, PackageSwapSpec, ResourceParams, ResourceSpec,
  };
  use crate::plan::compute_plan;
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

  fn package_set(name: &str, pkgs: &[&str]) -> ResourceSpec {
    ResourceSpec::new(
      name,
      ResourceParams::PackageSet(PackageSetSpec {
        packages: pkgs.iter().map(|s| s.to_string()).collect(),
      }),
    )
  }

  async fn run(desired: &DesiredState, system: &System) -> Vec<ActionRecord> {
    let mut reporter = Reporter::silent();
    let plan = compute_plan(desired, system, &ctx(), &mut reporter).await;
    execute_plan(plan, system, &ctx(), &mut reporter).await
  }

  #[tokio::test]
  async fn execution_mutates_fake_state() {
    let (fake, system) = fake_system();

    let mut desired = DesiredState::new();
    desired.push(package_set("tools", &["vim", "git"]));

    let records = run(&desired, &system).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ActionStatus::Succeeded);
    assert_eq!(fake.calls(), ["install:vim,git"]);
  }

  #[tokio::test]
  async fn second_run_is_all_skips() {
    let (_fake, system) = fake_system();

    let mut desired = DesiredState::new();
    desired.push(package_set("tools", &["vim"]));
    desired.push(ResourceSpec::new(
      "workstation",
      ResourceParams::Hostname {
        name: "workstation".to_string(),
      },
    ));

    let first = run(&desired, &system).await;
    assert!(first.iter().all(|r| r.status == ActionStatus::Succeeded));

    // Idempotence: the second plan carries no changes at all.
    let mut reporter = Reporter::silent();
    let second_plan = compute_plan(&desired, &system, &ctx(), &mut reporter).await;
    assert_eq!(second_plan.change_count(), 0);

    let second = execute_plan(second_plan, &system, &ctx(), &mut reporter).await;
    assert!(second.iter().all(|r| r.status == ActionStatus::Skipped));
  }

  #[tokio::test]
  async fn critical_failure_aborts_remaining_actions() {
    let (fake, system) = fake_system();
    fake.fail_upgrade();

    let mut desired = DesiredState::new();
    desired.push(ResourceSpec::new("base", ResourceParams::SystemUpgrade));
    desired.push(package_set("tools", &["vim"]));

    let records = run(&desired, &system).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, ActionStatus::Failed);
    assert_eq!(records[1].status, ActionStatus::Skipped);

    // Nothing after the critical failure was attempted.
    assert_eq!(fake.calls(), ["upgrade"]);
  }

  #[tokio::test]
  async fn non_critical_failure_continues() {
    let (fake, system) = fake_system();
    fake.fail_install_of("broken-pkg");

    let mut desired = DesiredState::new();
    desired.push(package_set("bad", &["broken-pkg"]));
    desired.push(package_set("good", &["vim"]));

    let records = run(&desired, &system).await;
    assert_eq!(records[0].status, ActionStatus::Failed);
    assert_eq!(records[1].status, ActionStatus::Succeeded);
  }

  #[tokio::test]
  async fn failed_swap_half_fails_the_pair() {
    let (fake, system) = fake_system();
    fake.seed_package("ffmpeg-free");
    fake.fail_install_of("ffmpeg");

    let mut desired = DesiredState::new();
    desired.push(ResourceSpec::new(
      "ffmpeg",
      ResourceParams::PackageSwap(PackageSwapSpec {
        remove: "ffmpeg-free".to_string(),
        install: "ffmpeg".to_string(),
      }),
    ));

    let records = run(&desired, &system).await;
    assert_eq!(records.len(), 2);
    // The remove succeeded on the host, but the pair is reported failed.
    assert!(records.iter().all(|r| r.status == ActionStatus::Failed));
    assert_eq!(records[0].error_detail.as_deref(), Some("paired action failed"));
  }

  #[tokio::test]
  async fn drift_between_plan_and_execute_becomes_a_skip() {
    let (fake, system) = fake_system();

    let mut desired = DesiredState::new();
    desired.push(package_set("tools", &["vim"]));

    let mut reporter = Reporter::silent();
    let plan = compute_plan(&desired, &system, &ctx(), &mut reporter).await;
    assert_eq!(plan.change_count(), 1);

    // Package shows up between planning and execution.
    fake.seed_package("vim");

    let records = execute_plan(plan, &system, &ctx(), &mut reporter).await;
    assert_eq!(records[0].status, ActionStatus::Skipped);
    assert!(fake.calls().is_empty());
  }

  #[tokio::test]
  async fn snapshots_execute_every_run() {
    let (fake, system) = fake_system();
    fake.seed_snapshot_config("root");

    let mut desired = DesiredState::new();
    desired.push(ResourceSpec::new(
      "baseline",
      ResourceParams::Snapshot(crate::manifest::SnapshotSpec {
        config: "root".to_string(),
        description: "before".to_string(),
      }),
    ));

    run(&desired, &system).await;
    run(&desired, &system).await;
    assert_eq!(fake.snapshots_taken().len(), 2);
  }

  #[tokio::test]
  async fn dotfile_written_with_parent_dirs() {
    let (_fake, system) = fake_system();
    let temp = tempfile::TempDir::new().unwrap();
    let target = temp.path().join("nested").join("init.vim");

    let mut desired = DesiredState::new();
    desired.push(ResourceSpec::new(
      "init.vim",
      ResourceParams::Dotfile(crate::manifest::DotfileSpec {
        path: target.to_string_lossy().to_string(),
        content: "set number\n".to_string(),
      }),
    ));

    let records = run(&desired, &system).await;
    assert_eq!(records[0].status, ActionStatus::Succeeded);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "set number\n");
  }
}
