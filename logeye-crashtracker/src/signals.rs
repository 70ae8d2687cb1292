// Copyright 2024-Present Logeye, Inc.
// SPDX-License-Identifier: Apache-2.0

/// The fixed set of fatal signals watched by the crashtracker.
pub const WATCHED_SIGNALS: [libc::c_int; 7] = [
    libc::SIGABRT,
    libc::SIGILL,
    libc::SIGSEGV,
    libc::SIGFPE,
    libc::SIGBUS,
    libc::SIGPIPE,
    libc::SIGTRAP,
];

pub fn default_signals() -> Vec<libc::c_int> {
    WATCHED_SIGNALS.to_vec()
}

/// Mnemonic for a watched signal number.  Async-signal-safe: returns a
/// static string, no allocation.
pub fn signal_name(signum: libc::c_int) -> &'static str {
    match signum {
        libc::SIGABRT => "SIGABRT",
        libc::SIGILL => "SIGILL",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGFPE => "SIGFPE",
        libc::SIGBUS => "SIGBUS",
        libc::SIGPIPE => "SIGPIPE",
        libc::SIGTRAP => "SIGTRAP",
        _ => "UNKNOWN",
    }
}

/// Converts a signum into a Signal.  Can't use the From trait because we
/// don't own either type.
pub(crate) fn signal_from_signum(
    value: libc::c_int,
) -> anyhow::Result<nix::sys::signal::Signal> {
    let rval = match value {
        libc::SIGABRT => nix::sys::signal::Signal::SIGABRT,
        libc::SIGILL => nix::sys::signal::Signal::SIGILL,
        libc::SIGSEGV => nix::sys::signal::Signal::SIGSEGV,
        libc::SIGFPE => nix::sys::signal::Signal::SIGFPE,
        libc::SIGBUS => nix::sys::signal::Signal::SIGBUS,
        libc::SIGPIPE => nix::sys::signal::Signal::SIGPIPE,
        libc::SIGTRAP => nix::sys::signal::Signal::SIGTRAP,
        _ => anyhow::bail!("unexpected signal number {value}"),
    };
    Ok(rval)
}
