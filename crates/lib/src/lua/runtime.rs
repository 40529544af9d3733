use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use mlua::prelude::*;

use crate::lua::globals;
use crate::manifest::DesiredState;

/// Create a new Lua runtime with the `rig` global registered.
pub fn create_runtime(desired: Rc<RefCell<DesiredState>>) -> LuaResult<Lua> {
  let lua = Lua::new();
  globals::register_globals(&lua, desired)?;
  Ok(lua)
}

/// Load and execute a Lua file at the given path.
///
/// Sets the `rig.dir` global to the directory of the loaded file and
/// returns the result of the chunk.
pub fn load_file(lua: &Lua, path: &Path) -> LuaResult<LuaValue> {
  let canonical_path = path
    .canonicalize()
    .map_err(|e| LuaError::external(format!("cannot canonicalize '{}': {}", path.display(), e)))?;
  let content = std::fs::read_to_string(&canonical_path)
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", canonical_path.display(), e)))?;

  let rig_globals = lua.globals().get::<LuaTable>("rig")?;
  rig_globals.set(
    "dir",
    canonical_path
      .parent()
      .unwrap_or(Path::new(""))
      .to_string_lossy()
      .to_string(),
  )?;

  let result = lua
    .load(&content)
    .set_name(format!("@{}", canonical_path.display()))
    .eval::<LuaValue>()?;
  Ok(result)
}
