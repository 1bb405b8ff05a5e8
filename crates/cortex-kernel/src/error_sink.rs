//! Error sinks – the logging side channel for coordination failures.
//!
//! Every failure on a dispatch or scheduling path is reported to an injected
//! [`ErrorSink`] keyed by `(component, message)`.  Sinks may fail (a log file
//! on a full disk, say); [`report`] swallows such failures after emitting a
//! `tracing` warning so the caller's original error is never masked.
//!
//! | Sink | Destination |
//! |---|---|
//! | [`TracingSink`] | `tracing::error!` events |
//! | [`FileSink`] | Appends `<timestamp> - ERROR in <component>: <message>` lines to a file |
//! | [`MemorySink`] | In-process vector, mainly for tests |
//! | [`FanoutSink`] | Tees each record to several sinks |

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local, TimeDelta};
use thiserror::Error;
use tracing::{error, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised by a sink while recording.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error on log file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for `(component, message)` error records.
pub trait ErrorSink: Send + Sync {
    fn record(&self, component: &str, message: &str) -> Result<(), SinkError>;
}

/// Record through `sink`, downgrading a sink failure to a warning.
pub fn report(sink: &dyn ErrorSink, component: &str, message: &str) {
    if let Err(e) = sink.record(component, message) {
        warn!(error = %e, component, original = message, "error sink failed to record");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingSink
// ─────────────────────────────────────────────────────────────────────────────

/// Forwards every record to `tracing::error!`.  Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn record(&self, component: &str, message: &str) -> Result<(), SinkError> {
        error!(component, "{message}");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FileSink
// ─────────────────────────────────────────────────────────────────────────────

/// Appends records to a plain-text log file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSink {
    /// Create a sink writing to `path`, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line at the given level (`ERROR`, `WARNING`, `INFO`).
    pub fn record_level(&self, level: &str, component: &str, message: &str) -> Result<(), SinkError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let line = format!(
            "{} - {level} in {component}: {message}\n",
            Local::now().to_rfc3339()
        );
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Move the log into a sibling `archive/` directory when it has not been
    /// written for longer than `retention`.
    ///
    /// Returns the archive path when a move happened, `None` when the log is
    /// missing or still fresh.
    pub fn archive_stale(&self, retention: TimeDelta) -> Result<Option<PathBuf>, SinkError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.path.exists() {
            return Ok(None);
        }
        let modified: DateTime<Local> = fs::metadata(&self.path)?.modified()?.into();
        if Local::now() - modified <= retention {
            return Ok(None);
        }

        let archive_dir = self
            .path
            .parent()
            .map(|p| p.join("archive"))
            .unwrap_or_else(|| PathBuf::from("archive"));
        fs::create_dir_all(&archive_dir)?;
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "log".to_string());
        let target = archive_dir.join(format!("{stem}_{}.txt", modified.format("%Y%m%d")));
        fs::rename(&self.path, &target)?;
        Ok(Some(target))
    }
}

impl ErrorSink for FileSink {
    fn record(&self, component: &str, message: &str) -> Result<(), SinkError> {
        self.record_level("ERROR", component, message)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemorySink / FanoutSink
// ─────────────────────────────────────────────────────────────────────────────

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of `(component, message)` pairs in arrival order.
    pub fn records(&self) -> Vec<(String, String)> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ErrorSink for MemorySink {
    fn record(&self, component: &str, message: &str) -> Result<(), SinkError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((component.to_string(), message.to_string()));
        Ok(())
    }
}

/// Sends each record to every inner sink.
///
/// All sinks are attempted even if an earlier one fails; the first failure
/// is returned.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ErrorSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ErrorSink>>) -> Self {
        Self { sinks }
    }
}

impl ErrorSink for FanoutSink {
    fn record(&self, component: &str, message: &str) -> Result<(), SinkError> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(component, message) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenSink;

    impl ErrorSink for BrokenSink {
        fn record(&self, _: &str, _: &str) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("disk full".into()))
        }
    }

    #[test]
    fn memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.record("dispatcher", "first").unwrap();
        sink.record("scheduler", "second").unwrap();
        assert_eq!(
            sink.records(),
            vec![
                ("dispatcher".to_string(), "first".to_string()),
                ("scheduler".to_string(), "second".to_string()),
            ]
        );
    }

    #[test]
    fn report_swallows_sink_failure() {
        // Must not panic or propagate.
        report(&BrokenSink, "dispatcher", "original failure");
    }

    #[test]
    fn fanout_reaches_every_sink_despite_failure() {
        let memory = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new(vec![Arc::new(BrokenSink), memory.clone()]);
        let result = fanout.record("scheduler", "task dropped");
        assert!(matches!(result, Err(SinkError::Unavailable(_))));
        assert_eq!(memory.records().len(), 1);
    }

    #[test]
    fn file_sink_appends_formatted_lines() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let sink = FileSink::open(dir.path().join("logs").join("system_log.txt")).unwrap();
        sink.record("dispatcher", "unknown region").unwrap();
        sink.record_level("INFO", "coordinator", "started").unwrap();

        let text = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("- ERROR in dispatcher: unknown region"));
        assert!(lines[1].ends_with("- INFO in coordinator: started"));
    }

    #[test]
    fn archive_stale_leaves_fresh_log() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let sink = FileSink::open(dir.path().join("system_log.txt")).unwrap();
        sink.record("dispatcher", "x").unwrap();
        let moved = sink.archive_stale(TimeDelta::days(7)).unwrap();
        assert!(moved.is_none());
        assert!(sink.path().exists());
    }

    #[test]
    fn archive_stale_moves_old_log() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let sink = FileSink::open(dir.path().join("system_log.txt")).unwrap();
        sink.record("dispatcher", "x").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        let moved = sink.archive_stale(TimeDelta::zero()).unwrap().expect("archived");
        assert!(moved.starts_with(dir.path().join("archive")));
        assert!(moved.exists());
        assert!(!sink.path().exists());
    }

    #[test]
    fn archive_stale_without_log_is_noop() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let sink = FileSink::open(dir.path().join("missing.txt")).unwrap();
        assert!(sink.archive_stale(TimeDelta::zero()).unwrap().is_none());
    }
}
