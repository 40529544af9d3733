//! Configuration file evaluation.
//!
//! `evaluate_config` takes a path to a Lua configuration file and returns
//! the [`DesiredState`] it declares. The config returns a table with a
//! `setup` function; resources registered inside `setup` (via the `rig`
//! global) make up the desired state, in registration order.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;
use tracing::info;

use crate::lua::runtime;
use crate::manifest::DesiredState;

/// Errors that can occur during config evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
  /// Config file not found.
  #[error("config file not found: {0}")]
  NotFound(PathBuf),

  /// Lua evaluation error. Stored as a string so the error stays Send + Sync.
  #[error("lua error: {0}")]
  Lua(String),
}

impl From<LuaError> for EvalError {
  fn from(e: LuaError) -> Self {
    EvalError::Lua(e.to_string())
  }
}

/// Evaluate a Lua configuration file and return the declared desired state.
///
/// The returned state is normalized: duplicate identities are resolved
/// last-write-wins and repository removals are ordered ahead of additions.
pub fn evaluate_config(path: &Path) -> Result<DesiredState, EvalError> {
  if !path.exists() {
    return Err(EvalError::NotFound(path.to_path_buf()));
  }

  let desired = Rc::new(RefCell::new(DesiredState::new()));

  // Evaluate in a block so the Lua state is dropped before unwrapping the Rc.
  {
    let lua = runtime::create_runtime(desired.clone())?;
    let config = runtime::load_file(&lua, path)?;

    let LuaValue::Table(config_table) = config else {
      return Err(LuaError::external("config must return a table with a 'setup' function").into());
    };

    let setup: LuaFunction = config_table
      .get("setup")
      .map_err(|_| LuaError::external("config must return a table with a 'setup' function"))?;

    setup.call::<()>(())?;
  }

  let mut desired = Rc::try_unwrap(desired)
    .expect("desired state still has references")
    .into_inner();
  desired.normalize();

  info!(resources = desired.len(), "config evaluated");
  Ok(desired)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::manifest::ResourceKind;
  use std::fs;
  use tempfile::TempDir;

  #[test]
  fn evaluate_empty_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rig.lua");
    fs::write(
      &config_path,
      r#"
        return {
          setup = function()
            -- empty setup
          end,
        }
      "#,
    )
    .unwrap();

    let desired = evaluate_config(&config_path).unwrap();
    assert!(desired.is_empty());
  }

  #[test]
  fn evaluate_config_with_resources() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rig.lua");
    fs::write(
      &config_path,
      r#"
        return {
          setup = function()
            rig.snapshot({ name = "baseline", config = "root", description = "before" })
            rig.repo({ name = "rpmfusion-free", url = "https://example/free.rpm" })
            rig.upgrade()
            rig.packages({ name = "cli", packages = { "vim", "git", "ripgrep" } })
            rig.snapshot({ name = "final", config = "root", description = "after" })
          end,
        }
      "#,
    )
    .unwrap();

    let desired = evaluate_config(&config_path).unwrap();
    assert_eq!(desired.len(), 5);

    let kinds: Vec<ResourceKind> = desired.iter().map(|s| s.params.kind()).collect();
    assert_eq!(kinds[0], ResourceKind::Snapshot);
    assert_eq!(kinds[4], ResourceKind::Snapshot);
  }

  #[test]
  fn evaluate_config_hoists_repo_removals() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rig.lua");
    fs::write(
      &config_path,
      r#"
        return {
          setup = function()
            rig.repo({ name = "rpmfusion-free", url = "https://example/free.rpm" })
            rig.repo({ name = "conflicting", remove = true })
          end,
        }
      "#,
    )
    .unwrap();

    let desired = evaluate_config(&config_path).unwrap();
    let names: Vec<&str> = desired.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["conflicting", "rpmfusion-free"]);
  }

  #[test]
  fn host_facts_drive_conditionals() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rig.lua");
    fs::write(
      &config_path,
      r#"
        return {
          setup = function()
            if rig.os == "linux" then
              rig.packages({ name = "linux-only", packages = { "perf" } })
            end
            rig.packages({ name = "everywhere", packages = { "git" } })
          end,
        }
      "#,
    )
    .unwrap();

    let desired = evaluate_config(&config_path).unwrap();
    let expected = if cfg!(target_os = "linux") { 2 } else { 1 };
    assert_eq!(desired.len(), expected);
  }

  #[test]
  fn missing_config_fails() {
    let result = evaluate_config(Path::new("/nonexistent/rig.lua"));
    assert!(matches!(result, Err(EvalError::NotFound(_))));
  }

  #[test]
  fn config_not_returning_table_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rig.lua");
    fs::write(&config_path, r#"return "not a table""#).unwrap();

    let result = evaluate_config(&config_path);
    assert!(matches!(result, Err(EvalError::Lua(_))));
  }

  #[test]
  fn config_missing_setup_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rig.lua");
    fs::write(&config_path, "return {}").unwrap();

    let result = evaluate_config(&config_path);
    assert!(matches!(result, Err(EvalError::Lua(_))));
  }

  #[test]
  fn lua_runtime_errors_surface() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("rig.lua");
    fs::write(
      &config_path,
      r#"
        return {
          setup = function()
            error("boom")
          end,
        }
      "#,
    )
    .unwrap();

    let result = evaluate_config(&config_path);
    match result {
      Err(EvalError::Lua(message)) => assert!(message.contains("boom")),
      other => panic!("unexpected result: {other:?}"),
    }
  }
}
