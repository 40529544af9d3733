//! Shared process runner for collaborator implementations.
//!
//! Probes use [`run`] and inspect the exit status themselves: a non-zero
//! exit from `rpm -q` just means "not installed". Mutators use
//! [`run_checked`], which turns a non-zero exit into a [`SystemError`].

use std::process::Output;

use tokio::process::Command;
use tracing::debug;

use super::SystemError;

/// Captured result of one external command.
#[derive(Debug, Clone)]
pub struct CmdOutput {
  pub success: bool,
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl CmdOutput {
  fn from_output(output: Output) -> Self {
    Self {
      success: output.status.success(),
      code: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).to_string(),
      stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
  }
}

fn render(bin: &str, args: &[&str]) -> String {
  let mut cmd = String::from(bin);
  for arg in args {
    cmd.push(' ');
    cmd.push_str(arg);
  }
  cmd
}

/// Run a command, capturing output. Exit status is data, not an error.
pub async fn run(bin: &str, args: &[&str]) -> Result<CmdOutput, SystemError> {
  let rendered = render(bin, args);
  debug!(cmd = %rendered, "running command");

  let output = Command::new(bin)
    .args(args)
    .output()
    .await
    .map_err(|source| SystemError::Io {
      cmd: rendered.clone(),
      source,
    })?;

  let captured = CmdOutput::from_output(output);
  debug!(cmd = %rendered, success = captured.success, code = ?captured.code, "command finished");
  Ok(captured)
}

/// Run a command and require a zero exit status.
pub async fn run_checked(bin: &str, args: &[&str]) -> Result<CmdOutput, SystemError> {
  let captured = run(bin, args).await?;
  if !captured.success {
    return Err(SystemError::CmdFailed {
      cmd: render(bin, args),
      code: captured.code,
      stderr: captured.stderr.trim().to_string(),
    });
  }
  Ok(captured)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn run_captures_stdout() {
    let out = run("/bin/sh", &["-c", "echo hello"]).await.unwrap();
    assert!(out.success);
    assert_eq!(out.stdout.trim(), "hello");
  }

  #[tokio::test]
  async fn run_reports_nonzero_exit_as_data() {
    let out = run("/bin/sh", &["-c", "exit 3"]).await.unwrap();
    assert!(!out.success);
    assert_eq!(out.code, Some(3));
  }

  #[tokio::test]
  async fn run_checked_fails_on_nonzero_exit() {
    let err = run_checked("/bin/sh", &["-c", "echo boom >&2; exit 1"]).await.unwrap_err();
    match err {
      SystemError::CmdFailed { code, stderr, .. } => {
        assert_eq!(code, Some(1));
        assert_eq!(stderr, "boom");
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[tokio::test]
  async fn missing_binary_is_an_io_error() {
    let err = run("/nonexistent/definitely-not-a-binary", &[]).await.unwrap_err();
    assert!(matches!(err, SystemError::Io { .. }));
  }
}
