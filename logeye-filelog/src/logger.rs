// Copyright 2024-Present Logeye, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::level::Level;
use crate::sink::{FileSink, SinkError};
use crate::storage::LogStorage;
use chrono::{DateTime, Local};
use logeye_common::{AppMetadata, MutexExt};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Tagged entries tolerated in one file before the next write cues an
/// upload of that file.
pub const DEFAULT_WRITE_QUOTA: usize = 1000;

/// Local time with numeric UTC offset, second resolution.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Leveled file logger with per-day files, a per-file write quota, and a
/// one-per-file session marker.
///
/// Every write re-derives the quota count and marker presence from the
/// target file's current content instead of keeping in-memory counters.
/// That makes both checks stateless across process restarts at the cost of
/// an O(file size) read per call.  Writers to the same (level, day) file
/// serialize on a per-file mutex so the read-then-append window cannot
/// interleave.
///
/// Logging calls are infallible from the caller's perspective.  Filesystem
/// errors are reported on the diagnostic channel and the call degrades: a
/// failed quota read counts as "not exhausted", a failed marker read counts
/// as "marker needed".
pub struct RotatingLogger {
    sink: FileSink,
    quota: usize,
    session_marker: String,
    metadata: Mutex<BTreeMap<String, String>>,
    storage: Option<Arc<dyn LogStorage>>,
    file_locks: Mutex<HashMap<(Level, String), Arc<Mutex<()>>>>,
}

impl RotatingLogger {
    /// Creates a logger rooted at `root` with the default quota and no
    /// upload backend.  The session marker is fixed for the lifetime of
    /// this instance.
    pub fn new(root: impl Into<std::path::PathBuf>, app: &AppMetadata) -> Self {
        Self {
            sink: FileSink::new(root),
            quota: DEFAULT_WRITE_QUOTA,
            session_marker: format!(
                "session: {} || platform: {} || appVersion: {}",
                Uuid::new_v4(),
                app.os_name,
                app.short_version,
            ),
            metadata: Mutex::new(BTreeMap::new()),
            storage: None,
            file_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_quota(mut self, quota: usize) -> Self {
        self.quota = quota;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn LogStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn sink(&self) -> &FileSink {
        &self.sink
    }

    /// Sets a key in the persistent metadata map.  The value is stamped
    /// into every subsequent entry until overwritten.
    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.lock_or_panic().insert(key.into(), value.into());
    }

    /// Writes one entry.  Call-supplied metadata is merged into the
    /// persistent map first, call-supplied keys winning on conflict, and
    /// the merged map is rendered into the entry.
    pub fn log(
        &self,
        level: Level,
        message: &str,
        metadata: &BTreeMap<String, String>,
        timestamp: DateTime<Local>,
    ) {
        let day = FileSink::day_bucket(timestamp);
        let file_lock = self.file_lock(level, &day);
        let _guard = file_lock.lock_or_panic();

        let meta_part = self.merge_metadata(metadata);

        // One read serves both the quota count and the marker check.
        let content = match self.sink.read(level, &day) {
            Ok(content) => Some(content),
            Err(SinkError::NotFound(_)) => None,
            Err(e) => {
                tracing::warn!(level = level.as_str(), day = %day, "log file read failed: {e}");
                None
            }
        };
        let tag_count = content
            .as_deref()
            .map_or(0, |c| c.matches(&level.tag()).count());
        if tag_count >= self.quota {
            self.cue_upload(level, &day);
        }
        let needs_marker = content
            .as_deref()
            .is_none_or(|c| !c.contains(&self.session_marker));

        let mut file = match self.sink.open_append(level, &day) {
            Ok(file) => file,
            Err(e) => {
                tracing::error!(level = level.as_str(), day = %day, "log file open failed: {e}");
                return;
            }
        };
        if needs_marker {
            if let Err(e) = writeln!(file, "{}", self.session_marker) {
                tracing::error!(level = level.as_str(), day = %day, "session marker write failed: {e}");
                return;
            }
        }
        let line = format!(
            "{} [{}]: {}{}\n",
            timestamp.format(TIMESTAMP_FORMAT),
            level,
            meta_part,
            message,
        );
        if let Err(e) = file.write_all(line.as_bytes()) {
            tracing::error!(level = level.as_str(), day = %day, "log entry write failed: {e}");
        }
    }

    pub fn trace(&self, message: &str, metadata: &BTreeMap<String, String>) {
        self.log(Level::Trace, message, metadata, Local::now());
    }

    pub fn debug(&self, message: &str, metadata: &BTreeMap<String, String>) {
        self.log(Level::Debug, message, metadata, Local::now());
    }

    pub fn info(&self, message: &str, metadata: &BTreeMap<String, String>) {
        self.log(Level::Info, message, metadata, Local::now());
    }

    pub fn notice(&self, message: &str, metadata: &BTreeMap<String, String>) {
        self.log(Level::Notice, message, metadata, Local::now());
    }

    pub fn warning(&self, message: &str, metadata: &BTreeMap<String, String>) {
        self.log(Level::Warning, message, metadata, Local::now());
    }

    pub fn error(&self, message: &str, metadata: &BTreeMap<String, String>) {
        self.log(Level::Error, message, metadata, Local::now());
    }

    pub fn critical(&self, message: &str, metadata: &BTreeMap<String, String>) {
        self.log(Level::Critical, message, metadata, Local::now());
    }

    /// Merges `extra` into the persistent map and renders the result as
    /// space-joined `key=value` pairs in key order, with a trailing space,
    /// or an empty string when the map is empty.
    fn merge_metadata(&self, extra: &BTreeMap<String, String>) -> String {
        let mut map = self.metadata.lock_or_panic();
        for (key, value) in extra {
            map.insert(key.clone(), value.clone());
        }
        if map.is_empty() {
            return String::new();
        }
        let mut rendered = map
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        rendered.push(' ');
        rendered
    }

    /// Hands the exhausted file to the upload backend, if any.  Best
    /// effort: the result only feeds the diagnostic channel, and the write
    /// that tripped the quota still lands in the same file.
    fn cue_upload(&self, level: Level, day: &str) {
        let Some(storage) = &self.storage else {
            return;
        };
        let name = format!("{}-{}", level.as_str(), day);
        tracing::info!(file = %name, "log file reached its write quota");
        let done_name = name.clone();
        storage.upload(
            &name,
            self.sink.target_path(level, day),
            Box::new(move |result| {
                if let Err(e) = result {
                    tracing::warn!(file = %done_name, "log file upload failed: {e}");
                }
            }),
        );
    }

    fn file_lock(&self, level: Level, day: &str) -> Arc<Mutex<()>> {
        let mut locks = self.file_locks.lock_or_panic();
        Arc::clone(
            locks
                .entry((level, day.to_string()))
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}
