use std::path::PathBuf;

use crate::consts::{APP_NAME, LOCK_FILENAME, RUN_LOG_FILENAME};

/// Returns the user's home directory.
pub fn home_dir() -> PathBuf {
  let home = std::env::var("HOME").expect("HOME not set");
  PathBuf::from(home)
}

/// Returns the directory for configuration files for the application.
pub fn config_dir() -> PathBuf {
  let config_home = std::env::var("XDG_CONFIG_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".config"));
  config_home.join(APP_NAME)
}

/// Returns the directory for state files (run log, lock) for the application.
pub fn state_dir() -> PathBuf {
  let state_home = std::env::var("XDG_STATE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("state"));
  state_home.join(APP_NAME)
}

/// Fixed per-user path of the durable run log.
pub fn run_log_path() -> PathBuf {
  state_dir().join(RUN_LOG_FILENAME)
}

/// Path of the run-level mutual-exclusion lock file.
pub fn lock_path() -> PathBuf {
  state_dir().join(LOCK_FILENAME)
}
