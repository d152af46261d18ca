//! Per-device append-only backup log.
//!
//! One log file per device serial number at `<root>/<serial>/log.csv`,
//! one quoted device-relative path per line. Appends are deduplicating,
//! so re-running a backup is idempotent; deletion is logical, done by
//! rewriting the file without the matching line.
//!
//! The store does no internal locking. Within one connection only the
//! arbiter touches it; a future concurrent caller must serialize
//! externally.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name of the per-serial log.
pub const LOG_FILE_NAME: &str = "log.csv";

/// Maximum formatted length of a single log record, newline included.
pub const LOG_ENTRY_MAX_LEN: usize = 512;

/// Errors produced by the backup log store.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log entry too long: {len} bytes (max {LOG_ENTRY_MAX_LEN})")]
    EntryTooLong { len: usize },
}

/// Append-only, deduplicating record store keyed by device serial number.
#[derive(Debug, Clone)]
pub struct BackupLog {
    root: PathBuf,
}

impl BackupLog {
    /// Creates a store rooted at the storage mount point.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the per-serial log file path (`<root>/<serial>/log.csv`).
    pub fn log_path(&self, serial: &str) -> PathBuf {
        self.root.join(serial).join(LOG_FILE_NAME)
    }

    /// Records that `path` has been backed up for `serial`.
    ///
    /// Creates the per-serial directory on first use. Idempotent: if the
    /// path is already logged this is a no-op. A record that would exceed
    /// [`LOG_ENTRY_MAX_LEN`] fails this append without touching the log.
    pub fn append(&self, serial: &str, path: &str) -> Result<(), LogError> {
        let dir = self.root.join(serial);
        fs::create_dir_all(&dir)?;

        if self.is_logged(serial, path) {
            tracing::debug!(serial, path, "already logged, skipping append");
            return Ok(());
        }

        let mut record = quote(path);
        record.push('\n');
        if record.len() > LOG_ENTRY_MAX_LEN {
            return Err(LogError::EntryTooLong { len: record.len() });
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(serial))?;
        file.write_all(record.as_bytes())?;

        tracing::debug!(serial, path, "backup log updated");
        Ok(())
    }

    /// Returns `true` if `path` has an active entry in the log.
    ///
    /// Missing directory or log file means not backed up. Matching is
    /// exact full-line equality against the quoted form, with the line
    /// terminator stripped first.
    pub fn is_logged(&self, serial: &str, path: &str) -> bool {
        let file = match File::open(self.log_path(serial)) {
            Ok(f) => f,
            Err(_) => return false,
        };

        let needle = quote(path);
        for line in BufReader::new(file).lines() {
            let Ok(line) = line else { return false };
            if line.trim_end_matches(['\r', '\n']) == needle {
                return true;
            }
        }
        false
    }

    /// Removes the entry for `path` from the log.
    ///
    /// Rewrites the log into a temporary file without the matching line,
    /// then swaps it in for the original (remove + rename). Returns
    /// `Ok(true)` when an entry was removed. When nothing matches the
    /// rewrite is skipped entirely and the original file is left
    /// untouched, returning `Ok(false)`.
    pub fn delete_entry(&self, serial: &str, path: &str) -> Result<bool, LogError> {
        let log_path = self.log_path(serial);
        let file = File::open(&log_path)?;

        let needle = quote(path);
        let mut kept = Vec::new();
        let mut matched = false;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim_end_matches(['\r', '\n']) == needle {
                matched = true;
            } else {
                kept.push(line);
            }
        }

        if !matched {
            tracing::debug!(serial, path, "no log entry to delete");
            return Ok(false);
        }

        let tmp_path = log_path.with_extension("csv.tmp");
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for line in &kept {
                tmp.write_all(line.as_bytes())?;
                tmp.write_all(b"\n")?;
            }
            tmp.flush()?;
        }

        fs::remove_file(&log_path)?;
        fs::rename(&tmp_path, &log_path)?;

        tracing::debug!(serial, path, "log entry deleted");
        Ok(true)
    }

    /// Returns the byte length of the per-serial log file.
    pub fn file_length(&self, serial: &str) -> Result<u64, LogError> {
        Ok(fs::metadata(self.log_path(serial))?.len())
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Quotes a path for storage, escaping `\` and `"` inside it.
///
/// Paths without those characters serialize exactly as `"path"`.
fn quote(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 2);
    out.push('"');
    for c in path.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
