//! Cycle Retention
//!
//! Keeps the computation cycle behind the most recently retained full result
//! alive while a merged result referencing it is still pending delivery.
//!
//! # Ownership
//!
//! - `RetainedCycle` is an RAII pin: acquired on construction, released exactly
//!   once on drop.
//! - `CycleRetainer` owns at most one `RetainedCycle`. `replace` pins the new
//!   cycle before the old pin is dropped, so re-retaining the same cycle never
//!   lets its reference count touch zero.

use crate::error::MergeError;
use crate::model::CycleId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Engine-side owner of cycle resources.
pub trait CycleResourceManager: Send + Sync {
    /// Add a reference to `cycle`. Returns false if the cycle no longer exists.
    fn pin(&self, cycle: CycleId) -> bool;

    /// Drop a reference previously added by `pin`.
    fn release(&self, cycle: CycleId);
}

/// A pinned cycle; the pin is released when this guard is dropped.
pub struct RetainedCycle {
    cycle: CycleId,
    manager: Arc<dyn CycleResourceManager>,
}

impl RetainedCycle {
    pub fn acquire(
        manager: &Arc<dyn CycleResourceManager>,
        cycle: CycleId,
    ) -> Result<Self, MergeError> {
        if !manager.pin(cycle) {
            return Err(MergeError::CycleUnavailable(cycle));
        }
        Ok(Self {
            cycle,
            manager: Arc::clone(manager),
        })
    }

    pub fn cycle_id(&self) -> CycleId {
        self.cycle
    }
}

impl Drop for RetainedCycle {
    fn drop(&mut self) {
        self.manager.release(self.cycle);
    }
}

impl std::fmt::Debug for RetainedCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetainedCycle").field("cycle", &self.cycle).finish()
    }
}

/// Holds at most one retained cycle.
pub struct CycleRetainer {
    manager: Arc<dyn CycleResourceManager>,
    retained: Option<RetainedCycle>,
}

impl CycleRetainer {
    pub fn new(manager: Arc<dyn CycleResourceManager>) -> Self {
        Self {
            manager,
            retained: None,
        }
    }

    /// Retain `cycle`, releasing whatever was retained before.
    ///
    /// If `cycle` cannot be pinned the previous pin is still released: it
    /// backs a result that has just been superseded.
    pub fn replace(&mut self, cycle: CycleId) -> Result<(), MergeError> {
        match RetainedCycle::acquire(&self.manager, cycle) {
            Ok(pin) => {
                if let Some(previous) = self.retained.replace(pin) {
                    debug!(previous = %previous.cycle_id(), retained = %cycle, "Replacing retained cycle");
                }
                Ok(())
            }
            Err(e) => {
                self.retained = None;
                Err(e)
            }
        }
    }

    /// Release the retained cycle, if any.
    pub fn release(&mut self) -> Option<CycleId> {
        self.retained.take().map(|pin| pin.cycle_id())
    }

    pub fn retained_cycle(&self) -> Option<CycleId> {
        self.retained.as_ref().map(RetainedCycle::cycle_id)
    }
}

impl std::fmt::Debug for CycleRetainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleRetainer")
            .field("retained", &self.retained_cycle())
            .finish()
    }
}

// =============================================================================
// IN-MEMORY RESOURCE MANAGER
// =============================================================================

/// Reference-counted cycle registry.
///
/// A registered cycle is alive until the release that brings its count back
/// to zero, after which it is reclaimed and can no longer be pinned.
#[derive(Default)]
pub struct InMemoryCycleManager {
    cycles: Mutex<HashMap<CycleId, usize>>,
    invalid_releases: AtomicU64,
}

impl InMemoryCycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a freshly executed cycle available for pinning.
    pub fn register(&self, cycle: CycleId) {
        self.cycles.lock().entry(cycle).or_insert(0);
    }

    pub fn is_alive(&self, cycle: CycleId) -> bool {
        self.cycles.lock().contains_key(&cycle)
    }

    pub fn reference_count(&self, cycle: CycleId) -> usize {
        self.cycles.lock().get(&cycle).copied().unwrap_or(0)
    }

    /// Cycles currently holding at least one reference.
    pub fn pinned_cycles(&self) -> Vec<CycleId> {
        let mut pinned: Vec<CycleId> = self
            .cycles
            .lock()
            .iter()
            .filter(|(_, refs)| **refs > 0)
            .map(|(cycle, _)| *cycle)
            .collect();
        pinned.sort();
        pinned
    }

    /// Releases of unknown or unpinned cycles (double releases).
    pub fn invalid_releases(&self) -> u64 {
        self.invalid_releases.load(Ordering::Relaxed)
    }
}

impl CycleResourceManager for InMemoryCycleManager {
    fn pin(&self, cycle: CycleId) -> bool {
        match self.cycles.lock().get_mut(&cycle) {
            Some(refs) => {
                *refs += 1;
                true
            }
            None => false,
        }
    }

    fn release(&self, cycle: CycleId) {
        let mut cycles = self.cycles.lock();
        match cycles.get_mut(&cycle) {
            Some(refs) if *refs > 0 => {
                *refs -= 1;
                if *refs == 0 {
                    cycles.remove(&cycle);
                    debug!(cycle = %cycle, "Cycle reclaimed");
                }
            }
            _ => {
                self.invalid_releases.fetch_add(1, Ordering::Relaxed);
                warn!(cycle = %cycle, "Release of a cycle that is not pinned");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with(cycles: &[u128]) -> (Arc<InMemoryCycleManager>, Arc<dyn CycleResourceManager>) {
        let manager = Arc::new(InMemoryCycleManager::new());
        for c in cycles {
            manager.register(CycleId::from_u128(*c));
        }
        let dyn_manager: Arc<dyn CycleResourceManager> = manager.clone();
        (manager, dyn_manager)
    }

    #[test]
    fn test_replace_releases_previous_exactly_once() {
        let (manager, dyn_manager) = manager_with(&[1, 2]);
        let mut retainer = CycleRetainer::new(dyn_manager);

        retainer.replace(CycleId::from_u128(1)).unwrap();
        assert_eq!(manager.pinned_cycles(), vec![CycleId::from_u128(1)]);

        retainer.replace(CycleId::from_u128(2)).unwrap();
        assert_eq!(manager.pinned_cycles(), vec![CycleId::from_u128(2)]);
        assert!(!manager.is_alive(CycleId::from_u128(1)));

        assert_eq!(retainer.release(), Some(CycleId::from_u128(2)));
        assert!(manager.pinned_cycles().is_empty());
        assert_eq!(retainer.release(), None);
        assert_eq!(manager.invalid_releases(), 0);
    }

    #[test]
    fn test_re_retaining_same_cycle_keeps_it_alive() {
        let (manager, dyn_manager) = manager_with(&[5]);
        let mut retainer = CycleRetainer::new(dyn_manager);
        retainer.replace(CycleId::from_u128(5)).unwrap();
        retainer.replace(CycleId::from_u128(5)).unwrap();
        assert!(manager.is_alive(CycleId::from_u128(5)));
        assert_eq!(manager.reference_count(CycleId::from_u128(5)), 1);
    }

    #[test]
    fn test_unavailable_cycle_drops_previous_pin() {
        let (manager, dyn_manager) = manager_with(&[1]);
        let mut retainer = CycleRetainer::new(dyn_manager);
        retainer.replace(CycleId::from_u128(1)).unwrap();

        let err = retainer.replace(CycleId::from_u128(99)).unwrap_err();
        assert_eq!(err, MergeError::CycleUnavailable(CycleId::from_u128(99)));
        assert_eq!(retainer.retained_cycle(), None);
        assert!(manager.pinned_cycles().is_empty());
    }

    #[test]
    fn test_retained_cycle_releases_on_drop() {
        let (manager, dyn_manager) = manager_with(&[3]);
        {
            let pin = RetainedCycle::acquire(&dyn_manager, CycleId::from_u128(3)).unwrap();
            assert_eq!(pin.cycle_id(), CycleId::from_u128(3));
            assert_eq!(manager.reference_count(CycleId::from_u128(3)), 1);
        }
        assert!(!manager.is_alive(CycleId::from_u128(3)));
    }

    #[test]
    fn test_double_release_is_counted() {
        let (manager, _) = manager_with(&[4]);
        manager.release(CycleId::from_u128(4));
        assert_eq!(manager.invalid_releases(), 1);
    }
}
