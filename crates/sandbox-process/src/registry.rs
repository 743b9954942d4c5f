use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::process::ProcessGroup;

/// Live child processes keyed by run id.
///
/// Each execution touches only its own key, and the lock is never held across
/// an await, so contention is limited to the map operation itself.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    entries: Mutex<HashMap<Uuid, ProcessGroup>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map half-updated, so
    // recover from poisoning instead of propagating it.
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, ProcessGroup>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `group` under `run_id` until the returned guard is dropped.
    pub(crate) fn register(&self, run_id: Uuid, group: ProcessGroup) -> Registration<'_> {
        self.lock().insert(run_id, group);
        Registration {
            registry: self,
            run_id,
        }
    }

    pub fn contains(&self, run_id: Uuid) -> bool {
        self.lock().contains_key(&run_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return every entry.
    pub fn drain(&self) -> Vec<(Uuid, ProcessGroup)> {
        self.lock().drain().collect()
    }
}

/// Removes its registry entry on drop, whichever way the execution ended.
pub(crate) struct Registration<'a> {
    registry: &'a ProcessRegistry,
    run_id: Uuid,
}

impl Registration<'_> {
    /// The entry was drained by a bulk stop while the process was running.
    pub(crate) fn was_stopped(&self) -> bool {
        !self.registry.contains(self.run_id)
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(pid: u32) -> ProcessGroup {
        // Registry tests never signal, so any pid will do.
        ProcessGroup::for_pid(pid)
    }

    #[test]
    fn registration_removes_entry_on_drop() {
        let registry = ProcessRegistry::new();
        let id = Uuid::new_v4();

        let reg = registry.register(id, group(10));
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);

        drop(reg);
        assert!(!registry.contains(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_registrations_are_independent() {
        let registry = ProcessRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let reg_a = registry.register(a, group(10));
        let reg_b = registry.register(b, group(11));
        drop(reg_a);

        assert!(!registry.contains(a));
        assert!(registry.contains(b));
        drop(reg_b);
        assert!(registry.is_empty());
    }

    #[test]
    fn drain_empties_registry_and_marks_stopped() {
        let registry = ProcessRegistry::new();
        let id = Uuid::new_v4();
        let reg = registry.register(id, group(42));
        assert!(!reg.was_stopped());

        let drained = registry.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, id);
        assert_eq!(drained[0].1.pid(), 42);
        assert!(registry.is_empty());
        assert!(reg.was_stopped());

        // Dropping after a drain is a no-op.
        drop(reg);
        assert!(registry.is_empty());
    }

    #[test]
    fn registry_is_usable_from_many_threads() {
        let registry = ProcessRegistry::new();
        std::thread::scope(|s| {
            for pid in 0..8 {
                let registry = &registry;
                s.spawn(move || {
                    for _ in 0..100 {
                        let id = Uuid::new_v4();
                        let reg = registry.register(id, group(pid));
                        assert!(registry.contains(id));
                        drop(reg);
                    }
                });
            }
        });
        assert!(registry.is_empty());
    }
}
