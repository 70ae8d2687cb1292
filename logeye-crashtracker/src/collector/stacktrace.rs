// Copyright 2024-Present Logeye, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Write;

/// Walks the current call stack and appends one line per resolved symbol to
/// `out`, skipping the first `skip` frames.
///
/// SAFETY:
///     Must not run concurrently with any other unsynchronized backtrace
///     operation in this process.
/// SIGNAL SAFETY:
///     Getting a backtrace on Rust is not guaranteed to be signal safe.
///     <https://github.com/rust-lang/backtrace-rs/issues/414>
///     Reading the frame `ip` appears safe in practice; resolving symbol
///     names sometimes crashes.  Callers on the signal path pass a buffer
///     with capacity reserved up front so the writes below do not allocate
///     unless a stack is pathologically deep, and they run behind a
///     one-shot guard so a crash in here still ends in termination.
pub(crate) unsafe fn write_callstack(out: &mut String, skip: usize) {
    let mut index: usize = 0;
    // SAFETY: single-threaded use is guaranteed by the caller.
    unsafe {
        backtrace::trace_unsynchronized(|frame| {
            let current = index;
            index += 1;
            if current < skip {
                return true;
            }
            let ip = frame.ip();
            let mut resolved = false;
            // This can give multiple answers in the case of inlined
            // functions; emit every raw symbol the resolver reports.
            backtrace::resolve_frame_unsynchronized(frame, |symbol| {
                if let Some(name) = symbol.name() {
                    let _ = writeln!(out, "{:<4}{} [{:?}]", current - skip, name, ip);
                    resolved = true;
                }
            });
            if !resolved {
                let _ = writeln!(out, "{:<4}??? [{:?}]", current - skip, ip);
            }
            true
        });
    }
    // Frames are newline-joined, not newline-terminated.
    if out.ends_with('\n') {
        out.pop();
    }
}
