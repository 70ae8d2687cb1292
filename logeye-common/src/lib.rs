// Copyright 2024-Present Logeye, Inc.
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]

use std::sync::{Mutex, MutexGuard};

pub mod app_metadata;

pub use app_metadata::{AppMetadata, AppMetadataProvider, HostMetadataProvider};

/// Extension trait for `Mutex` that acquires the lock, panicking if it is
/// poisoned.
///
/// A poisoned lock means another thread panicked while holding it; none of
/// the state guarded by the mutexes in this workspace is recoverable in
/// that situation, so unwrapping at every call site would only add noise.
///
/// # Panics
///
/// Panics if the `Mutex` is poisoned.
pub trait MutexExt<T> {
    fn lock_or_panic(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[allow(clippy::unwrap_used)]
    fn lock_or_panic(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap()
    }
}
