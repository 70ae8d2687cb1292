// Copyright 2024-Present Logeye, Inc.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Origin of a captured fault.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    /// A fatal UNIX signal from the watched set.
    Signal,
    /// An unhandled language-level exception (a Rust panic).
    Exception,
}

/// One captured fault, handed to every registered observer.
///
/// Constructed once per fault and never mutated afterwards, so observers
/// may read it concurrently without synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashRecord {
    pub kind: FaultKind,
    /// Signal mnemonic (e.g. "SIGSEGV") or exception type name.
    pub name: String,
    /// Human-readable cause; empty when unavailable.
    pub reason: String,
    /// Opaque application/device description rendered from the metadata
    /// provider, empty when none was supplied before the fault.
    pub app_info: String,
    /// Newline-joined raw frame symbols.  On the signal path the capture
    /// machinery's own leading frames are already stripped.
    pub call_stack: String,
}
