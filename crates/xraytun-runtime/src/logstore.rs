//! File-backed engine log storage.
//!
//! Appends are synchronous so a line is on disk before any
//! notification about it goes out. The file is truncated from the
//! front when it outgrows its cap, keeping the most recent output.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;
use xraytun_core::ports::LogStore;

/// Cap on the log file size before the oldest half is dropped.
const MAX_LOG_BYTES: u64 = 1024 * 1024;

/// Engine log persisted to a single file in the app-private directory.
pub struct FileLogStore {
    path: PathBuf,
    /// Serializes append/trim/clear; the file itself has no lock.
    guard: Mutex<()>,
}

impl FileLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Entire stored log, empty if the file does not exist yet.
    pub fn read_all(&self) -> String {
        let _guard = self.guard.lock().unwrap();
        std::fs::read_to_string(&self.path).unwrap_or_default()
    }

    /// Drop the oldest half of the file, cutting on a line boundary.
    fn trim(&self) -> std::io::Result<()> {
        let mut content = String::new();
        File::open(&self.path)?.read_to_string(&mut content)?;
        let keep_from = content
            .char_indices()
            .map(|(i, _)| i)
            .find(|&i| i >= content.len() / 2 && content.as_bytes()[i] == b'\n')
            .map_or(0, |i| i + 1);
        std::fs::write(&self.path, &content[keep_from..])
    }
}

impl LogStore for FileLogStore {
    fn append(&self, line: &str) {
        let _guard = self.guard.lock().unwrap();
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| {
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")?;
                file.metadata().map(|m| m.len())
            });
        match result {
            Ok(size) if size > MAX_LOG_BYTES => {
                if let Err(e) = self.trim() {
                    warn!(error = %e, "failed to trim log file");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to append to log file"),
        }
    }

    fn clear(&self) {
        let _guard = self.guard.lock().unwrap();
        if self.path.exists() {
            if let Err(e) = std::fs::write(&self.path, b"") {
                warn!(error = %e, "failed to clear log file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLogStore::new(dir.path().join("app.log"));
        store.append("first");
        store.append("second");
        assert_eq!(store.read_all(), "first\nsecond\n");
    }

    #[test]
    fn clear_empties_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLogStore::new(dir.path().join("app.log"));
        store.append("line");
        store.clear();
        assert_eq!(store.read_all(), "");
    }

    #[test]
    fn clear_without_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLogStore::new(dir.path().join("app.log"));
        store.clear();
        assert_eq!(store.read_all(), "");
    }

    #[test]
    fn oversized_file_keeps_recent_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        // Pre-fill just under the cap so one append tips it over.
        let filler = "x".repeat(1023);
        let mut big = String::new();
        for _ in 0..1024 {
            big.push_str(&filler);
            big.push('\n');
        }
        std::fs::write(&path, &big).unwrap();

        let store = FileLogStore::new(&path);
        store.append("newest");

        let content = store.read_all();
        assert!(content.len() < big.len());
        assert!(content.ends_with("newest\n"));
        // Cut landed on a line boundary.
        assert!(content.starts_with('x') || content.starts_with("newest"));
        assert_eq!(content.lines().last(), Some("newest"));
    }
}
