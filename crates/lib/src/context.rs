//! Per-run context.
//!
//! A [`RunContext`] is built once at startup from [`SystemIdentity`] and
//! passed explicitly to probing and execution, so collaborator calls never
//! reach for ambient environment state mid-run.

use serde::{Deserialize, Serialize};

use crate::system::{SystemError, SystemIdentity};

/// Facts about the host and invoking user, captured once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
  /// The user the run provisions for (the sudo invoker, not root).
  pub user: String,

  /// Home directory of that user.
  pub home: String,

  /// Hostname at run start.
  pub hostname: String,

  /// Whether the process runs with root privileges.
  pub elevated: bool,
}

impl RunContext {
  /// Capture the context from the identity collaborator.
  pub async fn capture(identity: &dyn SystemIdentity) -> Result<Self, SystemError> {
    let user = identity.current_user().await?;
    let home = identity.home_dir(&user).await?;
    let hostname = identity.current_hostname().await?;

    Ok(Self {
      user,
      home,
      hostname,
      elevated: crate::platform::is_elevated(),
    })
  }
}
