// Copyright 2024-Present Logeye, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-process crash capture based on catching fatal UNIX signals and
//! unhandled panics, and delivering a structured record to registered
//! observers before the process goes down.
//!
//! Architecturally, there are two capture paths:
//! 1. A signal handler, installed for the fixed watched set (SIGABRT,
//!    SIGILL, SIGSEGV, SIGFPE, SIGBUS, SIGPIPE, SIGTRAP).  The handler runs
//!    under a constrained environment where many standard operations are
//!    illegal: <https://man7.org/linux/man-pages/man7/signal-safety.7.html>.
//!    In particular, memory allocation and synchronization such as mutexes
//!    are potentially UB.  The handler therefore reads only lock-free
//!    atomics, writes into buffers pre-allocated at installation time, fans
//!    the record out to the observers, and then forcibly terminates the
//!    process.  A fatal signal is never handled away.
//! 2. A panic hook, which replaces the hook active at installation time and
//!    chains to it: the saved hook is invoked first, before any of our own
//!    work, so that crash reporters installed earlier keep working.  The
//!    panic path does not terminate the process itself; the platform's
//!    normal unhandled-panic teardown runs after the hook returns.
//!
//! Observers are held weakly and notified synchronously on the faulting
//! thread, in registration order.  Capture is installed when the first
//! observer registers and uninstalled (panic hook restored, handler made
//! inert) when the last one unregisters.

#![cfg(unix)]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]

mod collector;
mod crash_info;
mod observers;
mod signals;

pub use collector::crash_handler::{
    is_active, observer_count, register_observer, unregister_observer, update_app_metadata,
    CrashHandlerError,
};
pub use crash_info::{CrashRecord, FaultKind};
pub use observers::{CrashObserver, ObserverRegistry};
pub use signals::{default_signals, signal_name, WATCHED_SIGNALS};
