//! Global Lua values and the `rig` table.
//!
//! The `rig` global provides:
//! - Host facts for conditionals: `rig.os`, `rig.arch`, `rig.user`,
//!   `rig.hostname_now`
//! - Resource registration: `rig.repo{}`, `rig.packages{}`, `rig.swap{}`,
//!   `rig.flatpak_remote{}`, `rig.flatpak{}`, `rig.group{}`, `rig.mount{}`,
//!   `rig.snapshot_config{}`, `rig.snapshot{}`, `rig.dotfile{}`,
//!   `rig.service{}`, `rig.hostname()`, `rig.upgrade()`
//!
//! Registration order in the config is the reconciliation order.

use std::cell::RefCell;
use std::rc::Rc;

use mlua::LuaSerdeExt;
use mlua::prelude::*;
use serde::Deserialize;

use crate::manifest::{
  DesiredState, DotfileSpec, MountSpec, PackageSetSpec, PackageSwapSpec, Precondition, RepoOp, RepositorySpec,
  ResourceParams, ResourceSpec, ServiceSpec, ServiceTarget, SnapshotConfigSpec, SnapshotSpec,
};
use crate::platform;

/// `when = { ... }` clause accepted by most registration functions.
#[derive(Debug, Default, Deserialize)]
struct WhenOpts {
  #[serde(default)]
  command: Option<String>,
  #[serde(default)]
  file: Option<String>,
  #[serde(default)]
  gpu: Option<String>,
}

impl WhenOpts {
  fn into_precondition(self) -> Option<Precondition> {
    if let Some(command) = self.command {
      Some(Precondition::CommandAvailable(command))
    } else if let Some(file) = self.file {
      Some(Precondition::FileExists(file))
    } else {
      self.gpu.map(Precondition::GpuVendor)
    }
  }
}

fn apply_when(spec: ResourceSpec, when: Option<WhenOpts>) -> ResourceSpec {
  match when.and_then(WhenOpts::into_precondition) {
    Some(precondition) => spec.with_precondition(precondition),
    None => spec,
  }
}

/// Register the `rig` global table in the Lua runtime.
pub fn register_globals(lua: &Lua, desired: Rc<RefCell<DesiredState>>) -> LuaResult<()> {
  let rig = lua.create_table()?;

  // Host facts
  rig.set("os", std::env::consts::OS)?;
  rig.set("arch", std::env::consts::ARCH)?;
  rig.set("user", platform::invoking_user())?;
  rig.set("hostname_now", platform::hostname())?;

  register_repo(lua, &rig, desired.clone())?;
  register_upgrade(lua, &rig, desired.clone())?;
  register_packages(lua, &rig, desired.clone())?;
  register_swap(lua, &rig, desired.clone())?;
  register_flatpak_remote(lua, &rig, desired.clone())?;
  register_flatpak(lua, &rig, desired.clone())?;
  register_group(lua, &rig, desired.clone())?;
  register_mount(lua, &rig, desired.clone())?;
  register_snapshot_config(lua, &rig, desired.clone())?;
  register_snapshot(lua, &rig, desired.clone())?;
  register_hostname(lua, &rig, desired.clone())?;
  register_dotfile(lua, &rig, desired.clone())?;
  register_service(lua, &rig, desired)?;

  lua.globals().set("rig", rig)?;
  Ok(())
}

fn register_repo(lua: &Lua, rig: &LuaTable, desired: Rc<RefCell<DesiredState>>) -> LuaResult<()> {
  #[derive(Deserialize)]
  struct RepoOpts {
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    remove: bool,
    #[serde(default)]
    when: Option<WhenOpts>,
  }

  let func = lua.create_function(move |lua, opts: LuaValue| {
    let opts: RepoOpts = lua.from_value(opts)?;
    if !opts.remove && opts.url.is_none() {
      return Err(LuaError::external(format!("repo '{}': url is required unless remove = true", opts.name)));
    }
    let spec = ResourceSpec::new(
      opts.name,
      ResourceParams::Repository(RepositorySpec {
        url: opts.url,
        op: if opts.remove { RepoOp::Remove } else { RepoOp::Add },
      }),
    );
    desired.borrow_mut().push(apply_when(spec, opts.when));
    Ok(())
  })?;
  rig.set("repo", func)
}

fn register_upgrade(lua: &Lua, rig: &LuaTable, desired: Rc<RefCell<DesiredState>>) -> LuaResult<()> {
  let func = lua.create_function(move |_lua, ()| {
    desired
      .borrow_mut()
      .push(ResourceSpec::new("base", ResourceParams::SystemUpgrade));
    Ok(())
  })?;
  rig.set("upgrade", func)
}

fn register_packages(lua: &Lua, rig: &LuaTable, desired: Rc<RefCell<DesiredState>>) -> LuaResult<()> {
  #[derive(Deserialize)]
  struct PackagesOpts {
    name: String,
    packages: Vec<String>,
    #[serde(default)]
    when: Option<WhenOpts>,
  }

  let func = lua.create_function(move |lua, opts: LuaValue| {
    let opts: PackagesOpts = lua.from_value(opts)?;
    let spec = ResourceSpec::new(
      opts.name,
      ResourceParams::PackageSet(PackageSetSpec {
        packages: opts.packages,
      }),
    );
    desired.borrow_mut().push(apply_when(spec, opts.when));
    Ok(())
  })?;
  rig.set("packages", func)
}

fn register_swap(lua: &Lua, rig: &LuaTable, desired: Rc<RefCell<DesiredState>>) -> LuaResult<()> {
  #[derive(Deserialize)]
  struct SwapOpts {
    #[serde(default)]
    name: Option<String>,
    remove: String,
    install: String,
    #[serde(default)]
    when: Option<WhenOpts>,
  }

  let func = lua.create_function(move |lua, opts: LuaValue| {
    let opts: SwapOpts = lua.from_value(opts)?;
    let name = opts.name.unwrap_or_else(|| opts.install.clone());
    let spec = ResourceSpec::new(
      name,
      ResourceParams::PackageSwap(PackageSwapSpec {
        remove: opts.remove,
        install: opts.install,
      }),
    );
    desired.borrow_mut().push(apply_when(spec, opts.when));
    Ok(())
  })?;
  rig.set("swap", func)
}

fn register_flatpak_remote(lua: &Lua, rig: &LuaTable, desired: Rc<RefCell<DesiredState>>) -> LuaResult<()> {
  #[derive(Deserialize)]
  struct RemoteOpts {
    name: String,
    url: String,
  }

  let func = lua.create_function(move |lua, opts: LuaValue| {
    let opts: RemoteOpts = lua.from_value(opts)?;
    desired
      .borrow_mut()
      .push(ResourceSpec::new(opts.name, ResourceParams::AppRemote { url: opts.url }));
    Ok(())
  })?;
  rig.set("flatpak_remote", func)
}

fn register_flatpak(lua: &Lua, rig: &LuaTable, desired: Rc<RefCell<DesiredState>>) -> LuaResult<()> {
  #[derive(Deserialize)]
  struct FlatpakOpts {
    name: String,
    apps: Vec<String>,
    #[serde(default)]
    prune: bool,
    #[serde(default)]
    when: Option<WhenOpts>,
  }

  let func = lua.create_function(move |lua, opts: LuaValue| {
    let opts: FlatpakOpts = lua.from_value(opts)?;
    let spec = ResourceSpec::new(
      opts.name,
      ResourceParams::AppSet {
        apps: opts.apps,
        prune: opts.prune,
      },
    );
    desired.borrow_mut().push(apply_when(spec, opts.when));
    Ok(())
  })?;
  rig.set("flatpak", func)
}

fn register_group(lua: &Lua, rig: &LuaTable, desired: Rc<RefCell<DesiredState>>) -> LuaResult<()> {
  #[derive(Deserialize)]
  struct GroupOpts {
    name: String,
    #[serde(default)]
    when: Option<WhenOpts>,
  }

  let func = lua.create_function(move |lua, opts: LuaValue| {
    let opts: GroupOpts = lua.from_value(opts)?;
    let spec = ResourceSpec::new(
      opts.name.clone(),
      ResourceParams::GroupMembership { group: opts.name },
    );
    desired.borrow_mut().push(apply_when(spec, opts.when));
    Ok(())
  })?;
  rig.set("group", func)
}

fn register_mount(lua: &Lua, rig: &LuaTable, desired: Rc<RefCell<DesiredState>>) -> LuaResult<()> {
  #[derive(Deserialize)]
  struct MountOpts {
    device: String,
    path: String,
    fstype: String,
    #[serde(default)]
    options: Option<String>,
    #[serde(default)]
    when: Option<WhenOpts>,
  }

  let func = lua.create_function(move |lua, opts: LuaValue| {
    let opts: MountOpts = lua.from_value(opts)?;
    let spec = ResourceSpec::new(
      opts.path.clone(),
      ResourceParams::Mount(MountSpec {
        device: opts.device,
        path: opts.path,
        fstype: opts.fstype,
        options: opts.options.unwrap_or_else(|| "defaults".to_string()),
      }),
    );
    desired.borrow_mut().push(apply_when(spec, opts.when));
    Ok(())
  })?;
  rig.set("mount", func)
}

fn register_snapshot_config(lua: &Lua, rig: &LuaTable, desired: Rc<RefCell<DesiredState>>) -> LuaResult<()> {
  #[derive(Deserialize)]
  struct SnapshotConfigOpts {
    name: String,
    path: String,
  }

  let func = lua.create_function(move |lua, opts: LuaValue| {
    let opts: SnapshotConfigOpts = lua.from_value(opts)?;
    desired.borrow_mut().push(ResourceSpec::new(
      opts.name,
      ResourceParams::SnapshotConfig(SnapshotConfigSpec { path: opts.path }),
    ));
    Ok(())
  })?;
  rig.set("snapshot_config", func)
}

fn register_snapshot(lua: &Lua, rig: &LuaTable, desired: Rc<RefCell<DesiredState>>) -> LuaResult<()> {
  #[derive(Deserialize)]
  struct SnapshotOpts {
    name: String,
    config: String,
    description: String,
  }

  let func = lua.create_function(move |lua, opts: LuaValue| {
    let opts: SnapshotOpts = lua.from_value(opts)?;
    desired.borrow_mut().push(ResourceSpec::new(
      opts.name,
      ResourceParams::Snapshot(SnapshotSpec {
        config: opts.config,
        description: opts.description,
      }),
    ));
    Ok(())
  })?;
  rig.set("snapshot", func)
}

fn register_hostname(lua: &Lua, rig: &LuaTable, desired: Rc<RefCell<DesiredState>>) -> LuaResult<()> {
  let func = lua.create_function(move |_lua, name: String| {
    // Fixed identity: declaring a hostname twice is last-write-wins.
    desired
      .borrow_mut()
      .push(ResourceSpec::new("system", ResourceParams::Hostname { name }));
    Ok(())
  })?;
  rig.set("hostname", func)
}

fn register_dotfile(lua: &Lua, rig: &LuaTable, desired: Rc<RefCell<DesiredState>>) -> LuaResult<()> {
  #[derive(Deserialize)]
  struct DotfileOpts {
    path: String,
    content: String,
    #[serde(default)]
    when: Option<WhenOpts>,
  }

  let func = lua.create_function(move |lua, opts: LuaValue| {
    let opts: DotfileOpts = lua.from_value(opts)?;
    let spec = ResourceSpec::new(
      opts.path.clone(),
      ResourceParams::Dotfile(DotfileSpec {
        path: opts.path,
        content: opts.content,
      }),
    );
    desired.borrow_mut().push(apply_when(spec, opts.when));
    Ok(())
  })?;
  rig.set("dotfile", func)
}

fn register_service(lua: &Lua, rig: &LuaTable, desired: Rc<RefCell<DesiredState>>) -> LuaResult<()> {
  #[derive(Deserialize)]
  struct ServiceOpts {
    unit: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    when: Option<WhenOpts>,
  }

  let func = lua.create_function(move |lua, opts: LuaValue| {
    let opts: ServiceOpts = lua.from_value(opts)?;
    let state = match opts.state.as_deref() {
      None | Some("enabled") => ServiceTarget::Enabled,
      Some("disabled") => ServiceTarget::Disabled,
      Some(other) => {
        return Err(LuaError::external(format!(
          "service '{}': unknown state '{}', expected 'enabled' or 'disabled'",
          opts.unit, other
        )));
      }
    };
    let spec = ResourceSpec::new(opts.unit, ResourceParams::ServiceState(ServiceSpec { state }));
    desired.borrow_mut().push(apply_when(spec, opts.when));
    Ok(())
  })?;
  rig.set("service", func)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::manifest::ResourceKind;

  fn eval_setup(body: &str) -> DesiredState {
    let desired = Rc::new(RefCell::new(DesiredState::new()));
    let lua = Lua::new();
    register_globals(&lua, desired.clone()).unwrap();
    lua.load(body).exec().unwrap();
    drop(lua);
    Rc::try_unwrap(desired).expect("desired state still referenced").into_inner()
  }

  #[test]
  fn rig_global_exists() {
    let desired = Rc::new(RefCell::new(DesiredState::new()));
    let lua = Lua::new();
    register_globals(&lua, desired).unwrap();

    let rig: LuaTable = lua.globals().get("rig").unwrap();
    for key in [
      "os", "arch", "user", "repo", "packages", "swap", "group", "mount", "snapshot", "dotfile", "service",
    ] {
      assert!(rig.contains_key(key).unwrap(), "missing rig.{key}");
    }
  }

  #[test]
  fn registration_preserves_order() {
    let desired = eval_setup(
      r#"
        rig.repo({ name = "rpmfusion", url = "https://example/free.rpm" })
        rig.upgrade()
        rig.packages({ name = "tools", packages = { "vim", "git" } })
      "#,
    );

    let kinds: Vec<ResourceKind> = desired.iter().map(|s| s.params.kind()).collect();
    assert_eq!(
      kinds,
      [ResourceKind::Repository, ResourceKind::SystemUpgrade, ResourceKind::PackageSet]
    );
  }

  #[test]
  fn repo_without_url_requires_remove() {
    let desired = Rc::new(RefCell::new(DesiredState::new()));
    let lua = Lua::new();
    register_globals(&lua, desired).unwrap();

    let result = lua.load(r#"rig.repo({ name = "broken" })"#).exec();
    assert!(result.is_err());

    let ok = lua.load(r#"rig.repo({ name = "old-repo", remove = true })"#).exec();
    assert!(ok.is_ok());
  }

  #[test]
  fn when_clause_becomes_precondition() {
    let desired = eval_setup(
      r#"
        rig.packages({ name = "amd", packages = { "radeontop" }, when = { gpu = "amd" } })
      "#,
    );

    let spec = desired.iter().next().unwrap();
    assert_eq!(spec.precondition, Some(Precondition::GpuVendor("amd".to_string())));
  }

  #[test]
  fn mount_defaults_options() {
    let desired = eval_setup(
      r#"
        rig.mount({ device = "UUID=abcd", path = "/mnt/data", fstype = "ext4" })
      "#,
    );

    let spec = desired.iter().next().unwrap();
    match &spec.params {
      ResourceParams::Mount(mount) => assert_eq!(mount.options, "defaults"),
      other => panic!("unexpected params: {other:?}"),
    }
  }

  #[test]
  fn service_rejects_unknown_state() {
    let desired = Rc::new(RefCell::new(DesiredState::new()));
    let lua = Lua::new();
    register_globals(&lua, desired).unwrap();

    let result = lua.load(r#"rig.service({ unit = "sshd", state = "stopped" })"#).exec();
    assert!(result.is_err());
  }

  #[test]
  fn host_facts_are_readable_from_lua() {
    let desired = Rc::new(RefCell::new(DesiredState::new()));
    let lua = Lua::new();
    register_globals(&lua, desired).unwrap();

    let os: String = lua.load("return rig.os").eval().unwrap();
    assert!(!os.is_empty());
  }
}
