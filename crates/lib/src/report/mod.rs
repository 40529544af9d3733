//! Run log sink and summary.
//!
//! The [`Reporter`] is the single writer to the durable run log and to the
//! console; both carry the same content. The log file is append-only, one
//! line per entry: `[<ISO-8601 timestamp>] [<LEVEL>] <message>`. It
//! persists across runs as the durable artifact of each reconciliation.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat};
use thiserror::Error;

/// Errors opening or writing the run log.
#[derive(Debug, Error)]
pub enum ReportError {
  #[error("failed to create log directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to open log file {path}: {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to write log entry: {0}")]
  Write(#[source] std::io::Error),
}

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
  Info,
  Success,
  Warning,
  Error,
}

impl LogLevel {
  pub const fn as_str(&self) -> &'static str {
    match self {
      LogLevel::Info => "INFO",
      LogLevel::Success => "SUCCESS",
      LogLevel::Warning => "WARNING",
      LogLevel::Error => "ERROR",
    }
  }
}

/// One timestamped entry of the run log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
  pub timestamp: DateTime<Local>,
  pub level: LogLevel,
  pub message: String,
}

impl LogEntry {
  pub fn render(&self) -> String {
    format!(
      "[{}] [{}] {}",
      self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, false),
      self.level.as_str(),
      self.message
    )
  }
}

/// End-of-run accounting, itemizing failures by identity and reason.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Summary {
  pub attempted: usize,
  pub succeeded: usize,
  pub skipped: usize,
  pub failed: usize,
  /// (resource identity, reason) per failed action.
  pub failures: Vec<(String, String)>,
}

impl Summary {
  pub fn is_clean(&self) -> bool {
    self.failed == 0
  }
}

/// Append-only sink for the run log.
///
/// Owns the in-memory [`LogEntry`] sequence for the life of one run and
/// mirrors every entry to the console and (when opened with a path) the
/// durable log file.
pub struct Reporter {
  file: Option<File>,
  console: bool,
  entries: Vec<LogEntry>,
}

impl Reporter {
  /// Open the durable log for appending, creating parent directories.
  pub fn open(path: &Path) -> Result<Self, ReportError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|source| ReportError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    let file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(path)
      .map_err(|source| ReportError::Open {
        path: path.to_path_buf(),
        source,
      })?;

    Ok(Self {
      file: Some(file),
      console: true,
      entries: Vec::new(),
    })
  }

  /// Console-only reporter, used by dry runs.
  pub fn console_only() -> Self {
    Self {
      file: None,
      console: true,
      entries: Vec::new(),
    }
  }

  /// Fully quiet reporter for tests.
  pub fn silent() -> Self {
    Self {
      file: None,
      console: false,
      entries: Vec::new(),
    }
  }

  pub fn entries(&self) -> &[LogEntry] {
    &self.entries
  }

  fn log(&mut self, level: LogLevel, message: String) {
    let entry = LogEntry {
      timestamp: Local::now(),
      level,
      message,
    };
    let line = entry.render();

    if let Some(file) = &mut self.file {
      // Log writes must not fail the run; fall back to the console note.
      if let Err(e) = writeln!(file, "{line}") {
        tracing::warn!(error = %e, "failed to append to run log");
      }
    }
    if self.console {
      println!("{line}");
    }

    self.entries.push(entry);
  }

  pub fn info(&mut self, message: impl Into<String>) {
    self.log(LogLevel::Info, message.into());
  }

  pub fn success(&mut self, message: impl Into<String>) {
    self.log(LogLevel::Success, message.into());
  }

  pub fn warning(&mut self, message: impl Into<String>) {
    self.log(LogLevel::Warning, message.into());
  }

  pub fn error(&mut self, message: impl Into<String>) {
    self.log(LogLevel::Error, message.into());
  }

  /// Emit the end-of-run summary into the log.
  pub fn emit_summary(&mut self, summary: &Summary) {
    self.info(format!(
      "run complete: {} attempted, {} succeeded, {} skipped, {} failed",
      summary.attempted, summary.succeeded, summary.skipped, summary.failed
    ));
    for (identity, reason) in &summary.failures {
      self.error(format!("failed: {identity}: {reason}"));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn entry_render_format() {
    let entry = LogEntry {
      timestamp: Local::now(),
      level: LogLevel::Warning,
      message: "group absent".to_string(),
    };
    let line = entry.render();
    assert!(line.starts_with('['));
    assert!(line.contains("] [WARNING] group absent"));
    // ISO-8601: date and time separated by 'T'.
    assert!(line[1..].split(']').next().unwrap().contains('T'));
  }

  #[test]
  fn log_file_is_append_only_across_reporters() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("logs").join("run.log");

    {
      let mut reporter = Reporter::open(&path).unwrap();
      reporter.console = false;
      reporter.info("first run");
    }
    {
      let mut reporter = Reporter::open(&path).unwrap();
      reporter.console = false;
      reporter.error("second run");
    }

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("[INFO] first run"));
    assert!(lines[1].ends_with("[ERROR] second run"));
  }

  #[test]
  fn summary_emission_itemizes_failures() {
    let mut reporter = Reporter::silent();
    let summary = Summary {
      attempted: 5,
      succeeded: 3,
      skipped: 1,
      failed: 1,
      failures: vec![("package-set/tools".to_string(), "dnf exited 1".to_string())],
    };
    reporter.emit_summary(&summary);

    assert_eq!(reporter.entries().len(), 2);
    assert_eq!(reporter.entries()[0].level, LogLevel::Info);
    assert_eq!(reporter.entries()[1].level, LogLevel::Error);
    assert!(reporter.entries()[1].message.contains("package-set/tools"));
  }

  #[test]
  fn summary_is_clean_only_without_failures() {
    assert!(Summary::default().is_clean());
    let failed = Summary {
      failed: 1,
      ..Default::default()
    };
    assert!(!failed.is_clean());
  }
}
