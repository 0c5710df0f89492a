//! In-flight run tracking with an at-most-one-per-target guarantee
//!
//! The guard table is the single piece of state shared between the
//! scheduler loop, the trigger endpoint and every spawned run task.
//! `try_acquire` performs its check and insert under one lock
//! acquisition, so two dispatchers racing on the same target can never
//! both observe "absent" and proceed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

use crate::models::RunHandle;

/// Shared table of currently running targets
///
/// Cheap to clone; all clones share the same table.
#[derive(Clone, Default)]
pub struct ExecutionGuard {
    running: Arc<Mutex<HashMap<String, RunHandle>>>,
}

impl ExecutionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// A panic elsewhere must not poison the table into permanent denial
    fn table(&self) -> MutexGuard<'_, HashMap<String, RunHandle>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically claim the run slot for `target`
    ///
    /// Returns `None` without side effects when the target is already
    /// running. On success the returned [`RunSlot`] owns the slot and
    /// releases it when dropped, so a run task cannot leave a target
    /// permanently wedged regardless of how it exits.
    pub fn try_acquire(&self, target: &str) -> Option<RunSlot> {
        let mut running = self.table();
        if running.contains_key(target) {
            debug!("Run slot for '{}' already held, denying", target);
            return None;
        }

        let handle = RunHandle::new(target);
        running.insert(target.to_string(), handle.clone());
        debug!("Run slot for '{}' granted (run {})", target, handle.run_id);

        Some(RunSlot {
            guard: self.clone(),
            handle,
        })
    }

    /// Remove the entry for `target` unconditionally
    ///
    /// Idempotent: releasing an absent target is a no-op, never an
    /// error, so racing completion paths can both call it safely.
    pub fn release(&self, target: &str) {
        let mut running = self.table();
        if running.remove(target).is_some() {
            debug!("Run slot for '{}' released", target);
        }
    }

    /// Remove the entry for `target` only if it belongs to `run_id`
    ///
    /// Used by [`RunSlot::drop`] so a stale slot from an earlier run can
    /// never evict the entry of a newer run of the same target.
    fn release_run(&self, target: &str, run_id: Uuid) {
        let mut running = self.table();
        if running.get(target).map(|h| h.run_id) == Some(run_id) {
            running.remove(target);
            debug!("Run slot for '{}' released (run {})", target, run_id);
        }
    }

    pub fn is_running(&self, target: &str) -> bool {
        self.table().contains_key(target)
    }

    pub fn running_count(&self) -> usize {
        self.table().len()
    }

    /// Snapshot of all in-flight runs
    pub fn running(&self) -> Vec<RunHandle> {
        self.table().values().cloned().collect()
    }
}

/// Owned claim on a target's run slot
///
/// Dropping the slot releases the claim. The release is keyed on the
/// run id, so a double release (explicit `release` followed by drop)
/// stays harmless even if the target has been re-acquired in between.
pub struct RunSlot {
    guard: ExecutionGuard,
    handle: RunHandle,
}

impl RunSlot {
    pub fn handle(&self) -> &RunHandle {
        &self.handle
    }

    pub fn target(&self) -> &str {
        &self.handle.target
    }
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        self.guard
            .release_run(&self.handle.target, self.handle.run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_then_deny() {
        let guard = ExecutionGuard::new();

        let slot = guard.try_acquire("bullseye_press");
        assert!(slot.is_some());
        assert!(guard.is_running("bullseye_press"));

        // Same target is denied while the slot is held
        assert!(guard.try_acquire("bullseye_press").is_none());

        // A different target is unaffected
        assert!(guard.try_acquire("holy_cow").is_some());
    }

    #[test]
    fn test_drop_releases_slot() {
        let guard = ExecutionGuard::new();

        {
            let _slot = guard.try_acquire("bullseye_press").unwrap();
            assert_eq!(guard.running_count(), 1);
        }

        assert_eq!(guard.running_count(), 0);
        assert!(guard.try_acquire("bullseye_press").is_some());
    }

    #[test]
    fn test_release_is_idempotent() {
        let guard = ExecutionGuard::new();

        // Releasing a target that was never acquired is a no-op
        guard.release("bullseye_press");

        let slot = guard.try_acquire("bullseye_press").unwrap();
        guard.release("bullseye_press");
        guard.release("bullseye_press");
        assert_eq!(guard.running_count(), 0);

        // The stale slot's drop must not disturb a fresh acquisition
        let fresh = guard.try_acquire("bullseye_press").unwrap();
        drop(slot);
        assert!(guard.is_running("bullseye_press"));
        drop(fresh);
        assert!(!guard.is_running("bullseye_press"));
    }

    #[test]
    fn test_concurrent_acquire_grants_exactly_one() {
        let guard = ExecutionGuard::new();
        let barrier = Arc::new(std::sync::Barrier::new(32));
        let mut handles = Vec::new();

        for _ in 0..32 {
            let guard = guard.clone();
            let barrier = barrier.clone();
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                guard.try_acquire("bullseye_press")
            }));
        }

        let slots: Vec<Option<RunSlot>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        let granted = slots.iter().filter(|s| s.is_some()).count();

        assert_eq!(granted, 1);
        assert_eq!(guard.running_count(), 1);

        drop(slots);
        assert_eq!(guard.running_count(), 0);
    }

    #[test]
    fn test_running_snapshot() {
        let guard = ExecutionGuard::new();
        let _a = guard.try_acquire("bullseye_press").unwrap();
        let _b = guard.try_acquire("holy_cow").unwrap();

        let mut targets: Vec<String> =
            guard.running().into_iter().map(|h| h.target).collect();
        targets.sort();
        assert_eq!(targets, vec!["bullseye_press", "holy_cow"]);
    }
}
