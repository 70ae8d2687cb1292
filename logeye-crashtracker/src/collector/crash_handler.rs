// Copyright 2024-Present Logeye, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Global crash-capture state machine.
//!
//! Fast-path state (is capture active, the published observer snapshot, the
//! rendered app-info block, the pre-allocated signal scratch) lives in
//! lock-free atomics because the signal handler is not allowed to take a
//! mutex.  Slow-path mutation (register/unregister, hook installation) is
//! serialized by [`INSTALL_LOCK`], which the fault paths never touch.

// This file makes use of the following async-signal safe functions in a
// signal handler: <https://man7.org/linux/man-pages/man7/signal-safety.7.html>
// - kill
// - raise (via nix::sys::signal::kill on the own pid)
// - sigaction
// - write

use super::stacktrace::write_callstack;
use crate::crash_info::{CrashRecord, FaultKind};
use crate::observers::{CrashObserver, ObserverRegistry};
use crate::signals::{signal_from_signum, signal_name, WATCHED_SIGNALS};
use logeye_common::{AppMetadata, MutexExt};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;
use std::fmt::Write as _;
use std::panic::{self, PanicHookInfo};
use std::ptr;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64};
use std::sync::{Arc, Mutex};

/// The handler and the frame walker contribute the two leading frames of a
/// signal-path capture; they are machinery, not evidence.
const SIGNAL_FRAMES_TO_SKIP: usize = 2;
const CALL_STACK_CAPACITY: usize = 64 * 1024;
const REASON_CAPACITY: usize = 128;

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static>;

// These should always be either null_mut, or `Box::into_raw()`.  Superseded
// values read by a concurrent fault path are leaked, never freed: observer
// registration happens a handful of times per process lifetime and a
// dangling read inside a crash handler is the one failure mode this module
// exists to avoid.
static OBSERVERS: AtomicPtr<ObserverRegistry> = AtomicPtr::new(ptr::null_mut());
static APP_INFO: AtomicPtr<String> = AtomicPtr::new(ptr::null_mut());
static PREVIOUS_PANIC_HOOK: AtomicPtr<PanicHook> = AtomicPtr::new(ptr::null_mut());
static SIGNAL_SCRATCH: AtomicPtr<SignalScratch> = AtomicPtr::new(ptr::null_mut());

static INSTALLED: AtomicBool = AtomicBool::new(false);
static FAULTS_HANDLED: AtomicU64 = AtomicU64::new(0);
static INSTALL_LOCK: Mutex<()> = Mutex::new(());

/// Buffers the signal handler formats into, allocated ahead of any fault so
/// the handler itself does not need the allocator for the bulky fields.
struct SignalScratch {
    reason: String,
    call_stack: String,
}

impl SignalScratch {
    fn new() -> Self {
        Self {
            reason: String::with_capacity(REASON_CAPACITY),
            call_stack: String::with_capacity(CALL_STACK_CAPACITY),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrashHandlerError {
    #[error("no pre-allocated signal scratch available")]
    MissingScratch,
}

/// Registers a crash observer, installing the capture hooks if this is the
/// first live observer.
///
/// Idempotent per observer instance: registering the same `Arc` twice
/// leaves a single entry.  The observer is held weakly; callers keep
/// ownership and should [`unregister_observer`] before dropping it.
pub fn register_observer(observer: &Arc<dyn CrashObserver>) {
    let _guard = INSTALL_LOCK.lock_or_panic();
    let mut registry = snapshot_registry();
    registry.insert(observer);
    publish_registry(registry);
    if !INSTALLED.load(SeqCst) {
        install_hooks();
    }
}

/// Removes a crash observer.  When the last live observer goes away the
/// panic hook saved at installation time is restored; the watched signal
/// dispositions stay in place (the handler is inert while inactive), since
/// signal handlers are a process-wide resource and only the exception-hook
/// chain needs to be reversible.
pub fn unregister_observer(observer: &Arc<dyn CrashObserver>) {
    let _guard = INSTALL_LOCK.lock_or_panic();
    let mut registry = snapshot_registry();
    registry.remove(observer);
    let now_empty = registry.is_empty();
    publish_registry(registry);
    if now_empty && INSTALLED.load(SeqCst) {
        uninstall_hooks();
    }
}

/// True while the capture hooks are installed and armed.
pub fn is_active() -> bool {
    INSTALLED.load(SeqCst)
}

/// Number of registered observers whose target is still alive.
pub fn observer_count() -> usize {
    let ptr = OBSERVERS.load(SeqCst);
    if ptr.is_null() {
        0
    } else {
        // Safety: published snapshots are never freed.
        unsafe { (*ptr).live_count() }
    }
}

/// Renders and caches the app-info block stamped into crash records.
///
/// Call this ahead of any fault; records built before the first call carry
/// an empty `app_info` rather than failing (a partial crash report beats no
/// report).
pub fn update_app_metadata(metadata: &AppMetadata) {
    let rendered = Box::into_raw(Box::new(metadata.summary()));
    // A fault path may still be reading the superseded block; leak it.
    let _old = APP_INFO.swap(rendered, SeqCst);
}

fn snapshot_registry() -> ObserverRegistry {
    let ptr = OBSERVERS.load(SeqCst);
    if ptr.is_null() {
        ObserverRegistry::new()
    } else {
        // Safety: published snapshots are never freed.
        unsafe { (*ptr).clone() }
    }
}

/// Publishes a new observer snapshot.  The previous snapshot is leaked so a
/// fan-out running concurrently on a faulting thread can finish iterating
/// it safely.
fn publish_registry(registry: ObserverRegistry) {
    let _old = OBSERVERS.swap(Box::into_raw(Box::new(registry)), SeqCst);
}

fn install_hooks() {
    // Arm the scratch before the handlers so a fault racing installation
    // finds its buffers in place.
    let _old = SIGNAL_SCRATCH.swap(Box::into_raw(Box::new(SignalScratch::new())), SeqCst);

    // Save whatever panic hook is active and chain to it from ours.
    let previous = Box::into_raw(Box::new(panic::take_hook()));
    PREVIOUS_PANIC_HOOK.store(previous, SeqCst);
    panic::set_hook(Box::new(exception_hook));

    if let Err(e) = register_signal_handlers() {
        // Installation failure is not surfaced to the caller; capture stays
        // armed for whatever handlers did install.
        tracing::warn!("failed to install crash signal handlers: {e}");
    }
    INSTALLED.store(true, SeqCst);
}

fn uninstall_hooks() {
    INSTALLED.store(false, SeqCst);
    let previous = PREVIOUS_PANIC_HOOK.swap(ptr::null_mut(), SeqCst);
    if !previous.is_null() {
        // Safety: only ever stored from Box::into_raw in install_hooks, and
        // install/uninstall are serialized by INSTALL_LOCK.
        panic::set_hook(*unsafe { Box::from_raw(previous) });
    }
}

fn register_signal_handlers() -> anyhow::Result<()> {
    let mut errors = vec![];
    for signum in WATCHED_SIGNALS {
        // Safety: this function has no documented preconditions.
        if let Err(e) = unsafe { register_signal_handler(signum) } {
            errors.push(format!("{}: {e}", signal_name(signum)));
        }
    }
    anyhow::ensure!(
        errors.is_empty(),
        "errors registering signal handlers {errors:?}"
    );
    Ok(())
}

unsafe fn register_signal_handler(signum: libc::c_int) -> anyhow::Result<()> {
    let signal_type = signal_from_signum(signum)?;
    // SA_ONSTACK is a no-op unless an altstack has been set up, so it is
    // always safe to request.  SA_NODEFER keeps the signal deliverable if
    // the handler itself faults; the one-shot guard in the handler stops
    // that turning into a loop.
    let sig_action = SigAction::new(
        SigHandler::Handler(handle_fatal_signal),
        SaFlags::SA_NODEFER | SaFlags::SA_ONSTACK,
        SigSet::empty(),
    );
    // The previous disposition is discarded: fatal signals are not chained,
    // and a detected fault resets the watched set to default before dying.
    unsafe { signal::sigaction(signal_type, &sig_action)? };
    Ok(())
}

/// The installed panic hook.  Runs in the context of an unhandled panic,
/// before unwinding/abort.
fn exception_hook(panic_info: &PanicHookInfo<'_>) {
    // Chain first, before any of our own work: systems installed before
    // this one see every fault even while capture is inactive.
    let previous = PREVIOUS_PANIC_HOOK.load(SeqCst);
    if !previous.is_null() {
        // Safety: the pointer comes from Box::into_raw and is never freed
        // while our hook is installed; we borrow without taking ownership.
        unsafe {
            let previous_hook = &*previous;
            previous_hook(panic_info);
        }
    }

    if !INSTALLED.load(SeqCst) {
        return;
    }

    let record = build_exception_record(panic_info);
    notify_observers(&record);
    // No explicit termination here: the platform's normal unhandled-panic
    // teardown runs once the hook returns.
}

fn build_exception_record(panic_info: &PanicHookInfo<'_>) -> CrashRecord {
    let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        String::new()
    };
    let reason = match panic_info.location() {
        Some(location) if message.is_empty() => format!("panicked at {location}"),
        Some(location) => format!("{message} (panicked at {location})"),
        None => message,
    };
    let mut call_stack = String::with_capacity(CALL_STACK_CAPACITY);
    // The panic path is not under signal-handler constraints; its own
    // frames are left in place.
    unsafe { write_callstack(&mut call_stack, 0) };
    CrashRecord {
        kind: FaultKind::Exception,
        name: "panic".to_string(),
        reason,
        app_info: current_app_info(),
        call_stack,
    }
}

/// The installed signal handler.  Builds and fans out a crash record, then
/// unconditionally terminates the process: once a fatal signal has fired,
/// continued execution is unsafe and observer fan-out is a notification,
/// not a recovery mechanism.
pub(crate) extern "C" fn handle_fatal_signal(signum: libc::c_int) {
    if !INSTALLED.load(SeqCst) {
        return;
    }
    let _ = handle_fatal_signal_impl(signum);
    terminate();
}

fn handle_fatal_signal_impl(signum: libc::c_int) -> Result<(), CrashHandlerError> {
    // One crash report per process.  A fault inside this function (walking
    // a corrupted stack can itself crash) re-enters through this guard and
    // goes straight to termination.
    if FAULTS_HANDLED.fetch_add(1, SeqCst) > 0 {
        return Ok(());
    }

    let scratch_ptr = SIGNAL_SCRATCH.swap(ptr::null_mut(), SeqCst);
    if scratch_ptr.is_null() {
        return Err(CrashHandlerError::MissingScratch);
    }
    // Safety: the pointer comes from Box::into_raw in install_hooks.  It is
    // deliberately never reboxed: the process dies before cleanup matters.
    let scratch = unsafe { &mut *scratch_ptr };

    let name = signal_name(signum);
    let _ = write!(scratch.reason, "Signal {name}({signum}) was raised.");
    // Safety: nothing else walks the stack concurrently; the faulting
    // thread owns this process from here to termination.
    unsafe { write_callstack(&mut scratch.call_stack, SIGNAL_FRAMES_TO_SKIP) };

    let record = CrashRecord {
        kind: FaultKind::Signal,
        name: name.to_string(),
        reason: std::mem::take(&mut scratch.reason),
        app_info: current_app_info(),
        call_stack: std::mem::take(&mut scratch.call_stack),
    };
    notify_observers(&record);
    Ok(())
}

fn current_app_info() -> String {
    let ptr = APP_INFO.load(SeqCst);
    if ptr.is_null() {
        String::new()
    } else {
        // Safety: published blocks are never freed.  The clone is the one
        // bounded allocation on the signal path that pre-allocation cannot
        // remove.
        unsafe { (*ptr).clone() }
    }
}

fn notify_observers(record: &CrashRecord) {
    let ptr = OBSERVERS.load(SeqCst);
    if !ptr.is_null() {
        // Safety: published snapshots are never freed.
        unsafe { (*ptr).notify_all(record) };
    }
}

/// Disarms capture, resets the watched signals to their default
/// dispositions, and raises an uncatchable kill against this process.
///
/// The panic hook cannot be safely swapped out from a signal context;
/// clearing the installed flag makes it a pure chain to the saved hook,
/// which is equivalent for the instants this process has left.
fn terminate() -> ! {
    INSTALLED.store(false, SeqCst);
    for signum in WATCHED_SIGNALS {
        if let Ok(sig) = signal_from_signum(signum) {
            // Safety: restoring the default disposition has no preconditions.
            let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
        }
    }
    let _ = signal::kill(Pid::this(), Signal::SIGKILL);
    // SIGKILL cannot be blocked; this is unreachable in practice.
    unsafe { libc::_exit(libc::EXIT_FAILURE) }
}

#[cfg(test)]
fn reset_fault_guard() {
    FAULTS_HANDLED.store(0, SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Everything in this module mutates process-global state; serialize.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[derive(Default)]
    struct Collecting {
        records: Mutex<Vec<CrashRecord>>,
        events: Option<Arc<Mutex<Vec<&'static str>>>>,
    }

    impl Collecting {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn with_events(events: &Arc<Mutex<Vec<&'static str>>>) -> Arc<Self> {
            Arc::new(Self {
                records: Mutex::new(vec![]),
                events: Some(Arc::clone(events)),
            })
        }

        fn records(&self) -> Vec<CrashRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl CrashObserver for Collecting {
        fn on_crash(&self, record: &CrashRecord) {
            if let Some(events) = &self.events {
                events.lock().unwrap().push("observer");
            }
            self.records.lock().unwrap().push(record.clone());
        }
    }

    fn as_dyn(observer: &Arc<Collecting>) -> Arc<dyn CrashObserver> {
        Arc::clone(observer) as Arc<dyn CrashObserver>
    }

    #[test]
    fn active_tracks_live_observer_count() {
        let _guard = TEST_LOCK.lock().unwrap();

        let first = Collecting::new();
        let second = Collecting::new();
        register_observer(&as_dyn(&first));
        assert!(is_active());
        assert_eq!(observer_count(), 1);

        // Idempotent registration.
        register_observer(&as_dyn(&first));
        assert_eq!(observer_count(), 1);

        register_observer(&as_dyn(&second));
        assert_eq!(observer_count(), 2);

        unregister_observer(&as_dyn(&first));
        assert!(is_active());
        unregister_observer(&as_dyn(&second));
        assert!(!is_active());
        assert_eq!(observer_count(), 0);
    }

    #[test]
    fn signal_fault_builds_record_and_fans_out() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_fault_guard();

        let observer = Collecting::new();
        register_observer(&as_dyn(&observer));
        update_app_metadata(&AppMetadata {
            display_name: "demo".to_string(),
            short_version: "1.0".to_string(),
            build_version: "1".to_string(),
            device_model: "test".to_string(),
            os_name: "Linux".to_string(),
            os_version: "6.1".to_string(),
        });

        handle_fatal_signal_impl(libc::SIGSEGV).unwrap();

        let records = observer.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.kind, FaultKind::Signal);
        assert_eq!(record.name, "SIGSEGV");
        assert!(record.reason.contains("Signal SIGSEGV(11) was raised."));
        assert!(record.app_info.starts_with("App: demo 1.0(1)"));
        assert!(!record.call_stack.is_empty());

        unregister_observer(&as_dyn(&observer));
    }

    #[test]
    fn second_signal_fault_is_one_shot() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_fault_guard();

        let observer = Collecting::new();
        register_observer(&as_dyn(&observer));

        handle_fatal_signal_impl(libc::SIGBUS).unwrap();
        handle_fatal_signal_impl(libc::SIGBUS).unwrap();
        assert_eq!(observer.records().len(), 1);

        unregister_observer(&as_dyn(&observer));
    }

    #[test]
    fn signal_while_inactive_is_ignored() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_fault_guard();

        let observer = Collecting::new();
        register_observer(&as_dyn(&observer));
        unregister_observer(&as_dyn(&observer));
        assert!(!is_active());

        // The full handler: were capture active this would kill the
        // process, inactive it must return without fan-out.
        handle_fatal_signal(libc::SIGSEGV);
        assert!(observer.records().is_empty());
    }

    #[test]
    fn panic_fault_chains_previous_hook_first_then_notifies() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_fault_guard();

        let events: Arc<Mutex<Vec<&'static str>>> = Default::default();

        // A hook installed before us must run first on every panic.
        let prior_events = Arc::clone(&events);
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(move |_info| {
            prior_events.lock().unwrap().push("previous-hook");
        }));

        let observer = Collecting::with_events(&events);
        register_observer(&as_dyn(&observer));

        let _ = std::panic::catch_unwind(|| panic!("boom"));

        assert_eq!(*events.lock().unwrap(), vec!["previous-hook", "observer"]);
        let records = observer.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, FaultKind::Exception);
        assert_eq!(records[0].name, "panic");
        assert!(records[0].reason.starts_with("boom (panicked at "));
        assert!(!records[0].call_stack.is_empty());

        unregister_observer(&as_dyn(&observer));
        // Uninstall restored our stub; put the harness hook back.
        panic::set_hook(default_hook);
    }

    #[test]
    fn panic_while_inactive_produces_no_record() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_fault_guard();

        let observer = Collecting::new();
        register_observer(&as_dyn(&observer));
        unregister_observer(&as_dyn(&observer));

        let _ = std::panic::catch_unwind(|| panic!("quiet"));
        assert!(observer.records().is_empty());
    }
}
