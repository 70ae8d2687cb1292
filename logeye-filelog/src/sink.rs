// Copyright 2024-Present Logeye, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::level::Level;
use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Subdirectory under the sink root that holds every log file.
const LOG_DIR: &str = "fileLog";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to create log file: {0}")]
    CreateFailed(#[source] std::io::Error),
    #[error("log file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to remove log file: {0}")]
    RemoveFailed(#[source] std::io::Error),
}

/// Maps (level, day) pairs to files under `<root>/fileLog/` and opens them
/// for appending.  The sink is purely about paths and file handles; entry
/// formatting and quota policy live in the logger.
#[derive(Clone, Debug)]
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding all log files.  Not created until the first write.
    pub fn log_dir(&self) -> PathBuf {
        self.root.join(LOG_DIR)
    }

    /// File name for a level and day, e.g. `info-2024-05-17.txt`.
    pub fn file_name(level: Level, day: &str) -> String {
        format!("{}-{}.txt", level.as_str(), day)
    }

    /// Day bucket a timestamp falls into, in the local calendar.
    pub fn day_bucket(timestamp: DateTime<Local>) -> String {
        timestamp.format("%Y-%m-%d").to_string()
    }

    /// Full path of the file a (level, day) pair writes to, whether or not
    /// it exists yet.
    pub fn target_path(&self, level: Level, day: &str) -> PathBuf {
        self.log_dir().join(Self::file_name(level, day))
    }

    /// Path of an existing file for a (level, day) pair.
    pub fn path_for(&self, level: Level, day: &str) -> Result<PathBuf, SinkError> {
        let path = self.target_path(level, day);
        if path.is_file() {
            Ok(path)
        } else {
            Err(SinkError::NotFound(path))
        }
    }

    /// Opens the file for a (level, day) pair in append mode, creating the
    /// directory and file as needed.  The cursor is positioned at the end.
    pub fn open_append(&self, level: Level, day: &str) -> Result<File, SinkError> {
        let dir = self.log_dir();
        std::fs::create_dir_all(&dir).map_err(SinkError::CreateFailed)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.target_path(level, day))
            .map_err(SinkError::CreateFailed)?;
        // Append mode already writes at the end; the explicit seek keeps the
        // reported position honest for callers that inspect it.
        file.seek(SeekFrom::End(0)).map_err(SinkError::CreateFailed)?;
        Ok(file)
    }

    /// Reads the current contents of the file for a (level, day) pair.
    pub fn read(&self, level: Level, day: &str) -> Result<String, SinkError> {
        let path = self.path_for(level, day)?;
        read_to_string(&path)
    }

    /// Deletes the file for a (level, day) pair if it exists.
    pub fn remove(&self, level: Level, day: &str) -> Result<(), SinkError> {
        let path = self.path_for(level, day)?;
        std::fs::remove_file(&path).map_err(SinkError::RemoveFailed)
    }
}

fn read_to_string(path: &Path) -> Result<String, SinkError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(SinkError::NotFound(path.to_path_buf()))
        }
        Err(e) => Err(SinkError::CreateFailed(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_name_combines_level_and_day() {
        assert_eq!(FileSink::file_name(Level::Info, "2024-05-17"), "info-2024-05-17.txt");
        assert_eq!(FileSink::file_name(Level::Error, "2024-12-31"), "error-2024-12-31.txt");
    }

    #[test]
    fn target_path_lives_under_file_log_dir() {
        let sink = FileSink::new("/tmp/app");
        let path = sink.target_path(Level::Debug, "2024-05-17");
        assert_eq!(path, PathBuf::from("/tmp/app/fileLog/debug-2024-05-17.txt"));
    }

    #[test]
    fn path_for_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        match sink.path_for(Level::Info, "2024-05-17") {
            Err(SinkError::NotFound(path)) => {
                assert!(path.ends_with("fileLog/info-2024-05-17.txt"));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn open_append_creates_dir_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        {
            let mut file = sink.open_append(Level::Info, "2024-05-17").unwrap();
            file.write_all(b"first\n").unwrap();
        }
        {
            let mut file = sink.open_append(Level::Info, "2024-05-17").unwrap();
            file.write_all(b"second\n").unwrap();
        }
        let contents = sink.read(Level::Info, "2024-05-17").unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn remove_deletes_and_further_reads_fail() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        let mut file = sink.open_append(Level::Warning, "2024-05-17").unwrap();
        file.write_all(b"x\n").unwrap();
        drop(file);
        sink.remove(Level::Warning, "2024-05-17").unwrap();
        assert!(matches!(
            sink.read(Level::Warning, "2024-05-17"),
            Err(SinkError::NotFound(_))
        ));
        assert!(matches!(
            sink.remove(Level::Warning, "2024-05-17"),
            Err(SinkError::NotFound(_))
        ));
    }
}
