//! Application-wide constants.

/// Application name, used for path resolution (`~/.config/riglua`, etc).
pub const APP_NAME: &str = "riglua";

/// Default configuration file name looked up in the current directory.
pub const DEFAULT_CONFIG: &str = "rig.lua";

/// File name of the durable run log inside the state directory.
pub const RUN_LOG_FILENAME: &str = "run.log";

/// File name of the run lock inside the state directory.
pub const LOCK_FILENAME: &str = "run.lock";
