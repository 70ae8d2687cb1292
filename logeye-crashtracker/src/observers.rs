// Copyright 2024-Present Logeye, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::crash_info::CrashRecord;
use std::sync::{Arc, Weak};

/// Callback notified of each captured fault, synchronously on the faulting
/// thread.  Observers are expected to be fast and non-blocking; a
/// misbehaving observer can stall the fan-out and is not guarded against.
pub trait CrashObserver: Send + Sync {
    fn on_crash(&self, record: &CrashRecord);
}

/// Ordered set of weakly-held observers.
///
/// Registration order is preserved and duplicates (by identity) are
/// suppressed.  Entries whose target has been dropped are purged on every
/// mutation; the fan-out path only skips them, so that delivering a fault
/// never mutates the collection.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    entries: Vec<Weak<dyn CrashObserver>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer unless the same instance is already registered.
    /// Returns true if the observer was inserted.
    pub fn insert(&mut self, observer: &Arc<dyn CrashObserver>) -> bool {
        self.purge();
        if self.entries.iter().any(|entry| is_same(entry, observer)) {
            return false;
        }
        self.entries.push(Arc::downgrade(observer));
        true
    }

    /// Removes an observer by identity.  Returns true if it was present.
    pub fn remove(&mut self, observer: &Arc<dyn CrashObserver>) -> bool {
        self.purge();
        let before = self.entries.len();
        self.entries.retain(|entry| !is_same(entry, observer));
        self.entries.len() != before
    }

    /// Number of observers whose target is still alive.
    pub fn live_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.live_count() == 0
    }

    /// Delivers `record` to every live observer in registration order.
    /// Dead slots are skipped, not removed: this path runs on the faulting
    /// thread and must not reshape the collection.
    pub fn notify_all(&self, record: &CrashRecord) {
        for entry in &self.entries {
            if let Some(observer) = entry.upgrade() {
                observer.on_crash(record);
            }
        }
    }

    fn purge(&mut self) {
        self.entries.retain(|entry| entry.strong_count() > 0);
    }
}

/// Identity comparison on the heap address, ignoring vtable metadata, which
/// can differ between codegen units for the same object.
fn is_same(entry: &Weak<dyn CrashObserver>, observer: &Arc<dyn CrashObserver>) -> bool {
    std::ptr::addr_eq(entry.as_ptr(), Arc::as_ptr(observer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crash_info::FaultKind;
    use std::sync::Mutex;

    struct Recorder {
        label: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl CrashObserver for Recorder {
        fn on_crash(&self, _record: &CrashRecord) {
            self.seen.lock().unwrap().push(self.label);
        }
    }

    fn recorder(
        label: &'static str,
        seen: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Arc<dyn CrashObserver> {
        Arc::new(Recorder {
            label,
            seen: Arc::clone(seen),
        })
    }

    fn test_record() -> CrashRecord {
        CrashRecord {
            kind: FaultKind::Exception,
            name: "panic".to_string(),
            reason: String::new(),
            app_info: String::new(),
            call_stack: String::new(),
        }
    }

    #[test]
    fn insert_is_idempotent_per_instance() {
        let seen = Arc::new(Mutex::new(vec![]));
        let observer = recorder("a", &seen);
        let mut registry = ObserverRegistry::new();
        assert!(registry.insert(&observer));
        assert!(!registry.insert(&observer));
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn distinct_instances_both_register() {
        let seen = Arc::new(Mutex::new(vec![]));
        let first = recorder("a", &seen);
        let second = recorder("b", &seen);
        let mut registry = ObserverRegistry::new();
        registry.insert(&first);
        registry.insert(&second);
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn notify_preserves_registration_order() {
        let seen = Arc::new(Mutex::new(vec![]));
        let first = recorder("first", &seen);
        let second = recorder("second", &seen);
        let mut registry = ObserverRegistry::new();
        registry.insert(&first);
        registry.insert(&second);
        registry.notify_all(&test_record());
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn dead_entries_are_skipped_on_notify() {
        let seen = Arc::new(Mutex::new(vec![]));
        let kept = recorder("kept", &seen);
        let mut registry = ObserverRegistry::new();
        {
            let dropped = recorder("dropped", &seen);
            registry.insert(&dropped);
            registry.insert(&kept);
        }
        assert_eq!(registry.live_count(), 1);
        registry.notify_all(&test_record());
        assert_eq!(*seen.lock().unwrap(), vec!["kept"]);
    }

    #[test]
    fn dead_entries_are_purged_on_mutation() {
        let seen = Arc::new(Mutex::new(vec![]));
        let kept = recorder("kept", &seen);
        let mut registry = ObserverRegistry::new();
        {
            let dropped = recorder("dropped", &seen);
            registry.insert(&dropped);
        }
        assert_eq!(registry.entries.len(), 1);
        registry.insert(&kept);
        // The dead slot is gone, only the live observer remains.
        assert_eq!(registry.entries.len(), 1);
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn remove_reports_presence() {
        let seen = Arc::new(Mutex::new(vec![]));
        let observer = recorder("a", &seen);
        let mut registry = ObserverRegistry::new();
        registry.insert(&observer);
        assert!(registry.remove(&observer));
        assert!(!registry.remove(&observer));
        assert!(registry.is_empty());
    }
}
