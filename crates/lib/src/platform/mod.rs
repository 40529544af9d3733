//! Host facts and path resolution.

pub mod paths;

/// Returns true when the process runs with root privileges.
///
/// Repository, package, mount and group mutations all require elevation;
/// the CLI refuses to apply without it so that failures surface up front
/// instead of halfway through a plan.
#[cfg(unix)]
pub fn is_elevated() -> bool {
  rustix::process::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn is_elevated() -> bool {
  false
}

/// Best-effort hostname of the current machine.
pub fn hostname() -> String {
  whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string())
}

/// Login name of the invoking user.
///
/// When running under sudo the interesting user is the one who invoked
/// sudo, not root: group memberships and dotfiles belong to them.
pub fn invoking_user() -> String {
  match std::env::var("SUDO_USER") {
    Ok(user) if !user.is_empty() => user,
    _ => whoami::username(),
  }
}
