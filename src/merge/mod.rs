//! Incremental Merging
//!
//! The two-operation contract shared by the generic update provider and the
//! coalescing listener adapter, plus the value-level mergers for delta and
//! full cycle results.
//!
//! Mergers are not synchronized themselves; the owning provider/adapter holds
//! its lock around every `merge`/`consume`.

mod delta;
mod full;

pub use delta::DeltaResultMerger;
pub use full::FullResultMerger;

use crate::model::ResultMap;

/// Folds a stream of results into the smallest equivalent result.
pub trait IncrementalMerger<T>: Send {
    /// Fold `result` into the accumulated state.
    fn merge(&mut self, result: T);

    /// Take the accumulated result and reset to "nothing accumulated".
    ///
    /// Returns `None` when there is nothing worth delivering, including a
    /// second `consume` with no `merge` in between.
    fn consume(&mut self) -> Option<T>;
}

/// Keeps only the most recent value.
#[derive(Debug)]
pub struct LatestValueMerger<T> {
    latest: Option<T>,
}

impl<T> LatestValueMerger<T> {
    pub fn new() -> Self {
        Self { latest: None }
    }
}

impl<T> Default for LatestValueMerger<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> IncrementalMerger<T> for LatestValueMerger<T> {
    fn merge(&mut self, result: T) {
        self.latest = Some(result);
    }

    fn consume(&mut self) -> Option<T> {
        self.latest.take()
    }
}

/// Copy every value of `from` into `into`, overwriting on key collision.
pub(crate) fn overwrite_values(into: &mut ResultMap, from: ResultMap) {
    for (calc_config, targets) in from {
        let config_entry = into.entry(calc_config).or_default();
        for (target, values) in targets {
            config_entry.entry(target).or_default().extend(values);
        }
    }
}
