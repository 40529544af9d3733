//! File-based run locking for mutual exclusion.
//!
//! Two reconcilers mutating the same host would race on the package
//! database, fstab and repository list; an exclusive flock on a per-user
//! lock file prevents that. `plan` takes a shared lock so it can run
//! alongside nothing worse than another plan.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::paths::lock_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  Shared,
  Exclusive,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub hostname: String,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error(
    "another rig run is in progress: {command} (PID {pid}, started at unix {started_at_unix})\n\
             If you're sure no rig process is running, remove the lock file:\n  {lock_path}"
  )]
  Contention {
    command: String,
    pid: u32,
    started_at_unix: u64,
    lock_path: PathBuf,
  },

  #[error(
    "the run lock is held (could not read lock metadata)\n\
             If you're sure no rig process is running, remove the lock file:\n  {lock_path}"
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create state directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// Held run lock; released on drop.
#[derive(Debug)]
pub struct RunLock {
  _file: File,
  lock_path: PathBuf,
}

impl RunLock {
  /// Reads the lock metadata from the held file handle.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self._file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn acquire(mode: LockMode, command: &str, hostname: &str) -> Result<Self, LockError> {
    let path = lock_path();

    if let Some(parent) = path.parent()
      && !parent.exists()
    {
      std::fs::create_dir_all(parent).map_err(LockError::CreateDir)?;
    }

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&path)
      .map_err(LockError::OpenFile)?;

    if let Err(err) = try_lock(&file, mode) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(Self::read_contention_error(&path));
      }
      return Err(LockError::LockFailed(err));
    }

    if mode == LockMode::Exclusive {
      Self::write_metadata(&file, command, hostname)?;
    }

    Ok(RunLock { _file: file, lock_path: path })
  }

  fn write_metadata(file: &File, command: &str, hostname: &str) -> Result<(), LockError> {
    let metadata = LockMetadata {
      version: 1,
      pid: std::process::id(),
      started_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
      command: command.to_string(),
      hostname: hostname.to_string(),
    };

    file.set_len(0).map_err(LockError::WriteMetadata)?;
    let mut writer = io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &metadata)
      .map_err(|e| LockError::WriteMetadata(io::Error::other(e)))?;
    writer.flush().map_err(LockError::WriteMetadata)?;

    Ok(())
  }

  fn read_contention_error(lock_path: &std::path::Path) -> LockError {
    if let Ok(mut file) = File::open(lock_path) {
      let mut contents = String::new();
      if file.read_to_string(&mut contents).is_ok()
        && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
      {
        return LockError::Contention {
          command: metadata.command,
          pid: metadata.pid,
          started_at_unix: metadata.started_at_unix,
          lock_path: lock_path.to_path_buf(),
        };
      }
    }

    LockError::ContentionUnknown {
      lock_path: lock_path.to_path_buf(),
    }
  }

  pub fn lock_path(&self) -> &std::path::Path {
    &self.lock_path
  }
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = match mode {
    LockMode::Shared => FlockOperation::NonBlockingLockShared,
    LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(not(unix))]
fn try_lock(_file: &File, _mode: LockMode) -> io::Result<()> {
  Ok(())
}
