// Copyright 2024-Present Logeye, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Leveled file logging with daily buckets and a per-file write quota.
//!
//! Entries are appended to `<root>/fileLog/<level>-<YYYY-MM-DD>.txt`, one
//! file per (level, local calendar day) pair.  Each entry carries a
//! local-time ISO-8601 timestamp, a bracketed level tag, and the logger's
//! merged metadata.  The first write of a logger instance into a given file
//! stamps a session marker line identifying the process run.
//!
//! Quota and marker state are never cached: every write re-reads the target
//! file and counts level tags, so a restarted process picks up exactly
//! where the file left off.  When a file's tag count reaches the quota the
//! next write hands the file to the configured [`LogStorage`] backend for
//! upload and keeps appending; uploads are best effort and never block or
//! fail a logging call.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]

mod level;
mod logger;
mod sink;
mod storage;

pub use level::Level;
pub use logger::{RotatingLogger, DEFAULT_WRITE_QUOTA};
pub use sink::{FileSink, SinkError};
pub use storage::{LogStorage, StorageCallback, StorageError};
