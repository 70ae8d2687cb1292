// Copyright 2024-Present Logeye, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error("delete failed: {0}")]
    Delete(String),
}

/// Completion callback for a storage operation.  Invoked exactly once, on
/// whichever thread the storage backend chooses.
pub type StorageCallback<T> = Box<dyn FnOnce(Result<T, StorageError>) + Send>;

/// Remote home for full log files.
///
/// The logger only ever calls `upload` and only as a best-effort hint when a
/// file trips its quota; backends are free to debounce, drop, or defer.
/// `download` and `delete` exist for host applications that manage the
/// remote copies themselves.
pub trait LogStorage: Send + Sync {
    /// Pushes a local file to remote storage under a logical name such as
    /// `info-2024-05-17`.
    fn upload(&self, name: &str, local_path: PathBuf, done: StorageCallback<()>);

    /// Fetches the remote file `name` into `local_path`.
    fn download(&self, name: &str, local_path: PathBuf, done: StorageCallback<PathBuf>);

    /// Removes the remote file `name`.
    fn delete(&self, name: &str, done: StorageCallback<()>);
}
