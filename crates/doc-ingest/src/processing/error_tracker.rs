//! Per-run failure log
//!
//! Every failed file becomes one JSON object per line in
//! `errors_<YYYYMMDD_HHMMSS>.json` (UTC) under the error directory. The file
//! is created on the first failure, so a clean run leaves no log behind. A
//! run never appends to an earlier run's log: when the name is taken, a
//! `_<n>` suffix is added.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorCategory, Result};

/// One failed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub file_path: String,
    #[serde(rename = "error_type")]
    pub category: ErrorCategory,
    #[serde(rename = "error_message")]
    pub message: String,
}

/// Failures recorded so far in this run
#[derive(Debug, Clone)]
pub struct ErrorSummary {
    pub total_errors: usize,
    pub error_log: PathBuf,
    pub errors: Vec<ErrorRecord>,
}

/// Collects failures in memory and appends them to the run's log file
#[derive(Debug)]
pub struct ErrorTracker {
    error_dir: PathBuf,
    stem: String,
    log_path: PathBuf,
    log_file: Option<File>,
    errors: Vec<ErrorRecord>,
}

impl ErrorTracker {
    /// Prepare a tracker for a new run; creates the error directory
    pub fn new(error_dir: impl AsRef<Path>) -> Result<Self> {
        let error_dir = error_dir.as_ref();
        std::fs::create_dir_all(error_dir)?;

        let stem = format!("errors_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        let mut tracker = Self {
            error_dir: error_dir.to_path_buf(),
            log_path: PathBuf::new(),
            stem,
            log_file: None,
            errors: Vec::new(),
        };
        tracker.log_path = tracker.candidate(0);
        let mut sequence = 0;
        while tracker.log_path.exists() {
            sequence += 1;
            tracker.log_path = tracker.candidate(sequence);
        }
        Ok(tracker)
    }

    fn candidate(&self, sequence: u32) -> PathBuf {
        match sequence {
            0 => self.error_dir.join(format!("{}.json", self.stem)),
            n => self.error_dir.join(format!("{}_{}.json", self.stem, n)),
        }
    }

    /// Claim a log file no other run has written to
    fn open_log(&mut self) -> Result<&mut File> {
        if self.log_file.is_none() {
            let mut sequence = 0;
            let file = loop {
                match OpenOptions::new().write(true).create_new(true).open(&self.log_path) {
                    Ok(file) => break file,
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                        sequence += 1;
                        self.log_path = self.candidate(sequence);
                    }
                    Err(e) => return Err(e.into()),
                }
            };
            self.log_file = Some(file);
        }
        self.log_file
            .as_mut()
            .ok_or_else(|| Error::internal("error log not open"))
    }

    /// Path of this run's log (may not exist yet, and may change on the
    /// first write if another run claimed the name first)
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Record a failure in memory and append it to the log file
    ///
    /// The record is kept in memory even when the file write fails.
    pub fn log_error(
        &mut self,
        file_path: impl Into<String>,
        category: ErrorCategory,
        message: impl Into<String>,
    ) -> Result<()> {
        let record = ErrorRecord {
            timestamp: Utc::now(),
            file_path: file_path.into(),
            category,
            message: message.into(),
        };
        tracing::error!(
            "[{}] {} error: {}",
            record.file_path,
            record.category,
            record.message
        );

        let line = serde_json::to_string(&record)?;
        self.errors.push(record);

        let file = self.open_log()?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    pub fn get_summary(&self) -> ErrorSummary {
        ErrorSummary {
            total_errors: self.errors.len(),
            error_log: self.log_path.clone(),
            errors: self.errors.clone(),
        }
    }

    /// Most recent `errors_*.json` in a directory, if any
    pub fn latest_log(error_dir: impl AsRef<Path>) -> Result<Option<PathBuf>> {
        let error_dir = error_dir.as_ref();
        if !error_dir.exists() {
            return Ok(None);
        }

        let mut logs: Vec<PathBuf> = std::fs::read_dir(error_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("errors_") && n.ends_with(".json"))
            })
            .collect();

        // Timestamped names sort chronologically, then by collision suffix
        logs.sort_by_key(|path| log_order(path));
        Ok(logs.pop())
    }

    /// Parse a log written by `log_error`
    pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<ErrorRecord>> {
        let raw = std::fs::read_to_string(path)?;
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Error::from))
            .collect()
    }
}

/// Sort key for `errors_<stamp>[_<n>].json`
fn log_order(path: &Path) -> (String, u32) {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .trim_start_matches("errors_");
    // stamp is `YYYYMMDD_HHMMSS`, 15 characters
    match stem.get(15..).and_then(|rest| rest.strip_prefix('_')) {
        Some(n) => (stem[..15].to_string(), n.parse().unwrap_or(0)),
        None => (stem.to_string(), 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_created_on_first_error() {
        let dir = tempfile::tempdir().unwrap();
        let error_dir = dir.path().join("errors");
        let mut tracker = ErrorTracker::new(&error_dir).unwrap();

        assert!(error_dir.is_dir());
        assert!(!tracker.log_path().exists());

        tracker
            .log_error("/in/bad.pdf", ErrorCategory::Extraction, "No content extracted")
            .unwrap();
        tracker
            .log_error("/in/big.docx", ErrorCategory::Storage, "Failed to store vectors")
            .unwrap();

        let raw = std::fs::read_to_string(tracker.log_path()).unwrap();
        assert_eq!(raw.lines().count(), 2);

        let first: serde_json::Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
        assert_eq!(first["file_path"], "/in/bad.pdf");
        assert_eq!(first["error_type"], "extraction");
        assert_eq!(first["error_message"], "No content extracted");
        assert!(first["timestamp"].is_string());
    }

    #[test]
    fn test_summary_keeps_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = ErrorTracker::new(dir.path()).unwrap();
        tracker.log_error("a.txt", ErrorCategory::Exception, "boom").unwrap();
        tracker.log_error("a.txt", ErrorCategory::Exception, "boom").unwrap();

        let summary = tracker.get_summary();
        assert_eq!(summary.total_errors, 2);
        assert_eq!(summary.errors.len(), 2);
        assert_eq!(summary.error_log, tracker.log_path());
    }

    #[test]
    fn test_latest_log_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ErrorTracker::latest_log(dir.path().join("missing")).unwrap().is_none());

        let old = ErrorRecord {
            timestamp: Utc::now(),
            file_path: "old.txt".to_string(),
            category: ErrorCategory::Embedding,
            message: "old".to_string(),
        };
        let new = ErrorRecord {
            file_path: "new.pptx".to_string(),
            category: ErrorCategory::Storage,
            message: "new".to_string(),
            ..old.clone()
        };
        std::fs::write(
            dir.path().join("errors_20240101_000000.json"),
            format!("{}\n", serde_json::to_string(&old).unwrap()),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("errors_20240102_000000.json"),
            format!("{}\n\n", serde_json::to_string(&new).unwrap()),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();

        let latest = ErrorTracker::latest_log(dir.path()).unwrap().unwrap();
        assert!(latest.ends_with("errors_20240102_000000.json"));
        assert_eq!(ErrorTracker::read_log(&latest).unwrap(), vec![new]);

        for suffix in ["_2", "_10"] {
            std::fs::write(dir.path().join(format!("errors_20240102_000000{}.json", suffix)), "")
                .unwrap();
        }
        let latest = ErrorTracker::latest_log(dir.path()).unwrap().unwrap();
        assert!(latest.ends_with("errors_20240102_000000_10.json"));
    }

    #[test]
    fn test_runs_in_same_second_get_separate_logs() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = ErrorTracker::new(dir.path()).unwrap();
        first.log_error("a.txt", ErrorCategory::Extraction, "first run").unwrap();

        let mut second = ErrorTracker::new(dir.path()).unwrap();
        second.log_error("b.txt", ErrorCategory::Extraction, "second run").unwrap();

        assert_ne!(first.log_path(), second.log_path());
        let records = ErrorTracker::read_log(second.log_path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_path, "b.txt");
        assert_eq!(ErrorTracker::read_log(first.log_path()).unwrap().len(), 1);
    }

    #[test]
    fn test_trackers_created_together_do_not_share_a_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = ErrorTracker::new(dir.path()).unwrap();
        let mut second = ErrorTracker::new(dir.path()).unwrap();

        first.log_error("a.txt", ErrorCategory::Storage, "one").unwrap();
        second.log_error("b.txt", ErrorCategory::Storage, "two").unwrap();
        first.log_error("c.txt", ErrorCategory::Storage, "three").unwrap();

        assert_ne!(first.log_path(), second.log_path());
        assert_eq!(ErrorTracker::read_log(first.log_path()).unwrap().len(), 2);
        assert_eq!(ErrorTracker::read_log(second.log_path()).unwrap().len(), 1);
    }

    #[test]
    fn test_log_name_matches_record_clock() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = ErrorTracker::new(dir.path()).unwrap();
        tracker.log_error("a.txt", ErrorCategory::Exception, "boom").unwrap();

        let record = &tracker.get_summary().errors[0];
        let name = tracker.log_path().file_name().unwrap().to_string_lossy().to_string();
        let named_at = chrono::NaiveDateTime::parse_from_str(&name[7..22], "%Y%m%d_%H%M%S")
            .unwrap()
            .and_utc();
        assert!((record.timestamp - named_at).num_seconds().abs() < 5);
    }
}
