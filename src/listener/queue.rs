//! Call queue with coalescing cursors
//!
//! Calls are kept in arrival order, except that a mergeable call moves to the
//! tail each time it absorbs a newer event. Two cursors track the position of
//! the outstanding cycle-completed and fragment-completed calls.
//!
//! # Invariants
//!
//! - At most one outstanding call of each mergeable kind.
//! - A cursor, when set, indexes a call of its own kind.
//!
//! Moving index `i` to the tail shifts every later call down by one, so any
//! cursor above `i` is decremented and a cursor equal to `i` follows the
//! moved call to the new tail.

use super::call::{CallKind, CycleCall, MergeableKind, MergedCall};
use crate::model::{DeltaResult, FullResult};
use tracing::error;

/// Outcome of queueing an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// A new call was appended at `index`.
    Appended { index: usize },
    /// The event folded into the outstanding call, which moved `from` -> `to`.
    Coalesced { from: usize, to: usize },
}

#[derive(Debug, Default)]
pub struct CallQueue {
    calls: Vec<MergedCall>,
    cycle_completed: Option<usize>,
    cycle_fragment_completed: Option<usize>,
}

impl CallQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Kinds of the queued calls, in delivery order.
    pub fn kinds(&self) -> Vec<CallKind> {
        self.calls.iter().map(MergedCall::kind).collect()
    }

    pub fn cycle_completed_index(&self) -> Option<usize> {
        self.cycle_completed
    }

    pub fn cycle_fragment_completed_index(&self) -> Option<usize> {
        self.cycle_fragment_completed
    }

    /// Append a call. A mergeable call becomes the outstanding call of its kind.
    pub fn push(&mut self, call: MergedCall) -> Enqueued {
        let index = self.calls.len();
        match call.kind() {
            CallKind::CycleCompleted => self.cycle_completed = Some(index),
            CallKind::CycleFragmentCompleted => self.cycle_fragment_completed = Some(index),
            _ => {}
        }
        self.calls.push(call);
        Enqueued::Appended { index }
    }

    /// Queue a cycle or fragment completion, folding it into the outstanding
    /// call of the same kind when there is one.
    pub fn enqueue_cycle(
        &mut self,
        kind: MergeableKind,
        full: Option<&FullResult>,
        delta: Option<&DeltaResult>,
    ) -> Enqueued {
        let cursor = match kind {
            MergeableKind::CycleCompleted => self.cycle_completed,
            MergeableKind::CycleFragmentCompleted => self.cycle_fragment_completed,
        };

        if let Some(from) = cursor {
            if let Some(call) = self.calls.get_mut(from).and_then(MergedCall::cycle_call_mut) {
                call.update(full, delta);
                let to = self.move_to_tail(from);
                return Enqueued::Coalesced { from, to };
            }
            error!(kind = %CallKind::from(kind), index = from, "Cursor does not reference a cycle call; appending");
        }

        let call = CycleCall::new(full, delta);
        match kind {
            MergeableKind::CycleCompleted => self.push(MergedCall::CycleCompleted(call)),
            MergeableKind::CycleFragmentCompleted => {
                self.push(MergedCall::CycleFragmentCompleted(call))
            }
        }
    }

    /// Move the call at `index` to the tail, re-pointing both cursors.
    /// Returns the new index.
    pub fn move_to_tail(&mut self, index: usize) -> usize {
        let last = self.calls.len().saturating_sub(1);
        if index >= last {
            return last;
        }
        let call = self.calls.remove(index);
        self.calls.push(call);
        for cursor in [&mut self.cycle_completed, &mut self.cycle_fragment_completed] {
            match *cursor {
                Some(c) if c > index => *cursor = Some(c - 1),
                Some(c) if c == index => *cursor = Some(last),
                _ => {}
            }
        }
        last
    }

    /// Remove every call for delivery, resetting both cursors.
    pub fn take(&mut self) -> Vec<MergedCall> {
        self.cycle_completed = None;
        self.cycle_fragment_completed = None;
        std::mem::take(&mut self.calls)
    }

    /// Discard every call.
    pub fn clear(&mut self) -> usize {
        let discarded = self.calls.len();
        self.take();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn delta(v: f64) -> DeltaResult {
        DeltaResult::new(ts(1), ts(2)).add_value("Default", "IRS-1", "PV01", v)
    }

    fn assert_cursors_valid(queue: &CallQueue) {
        let kinds = queue.kinds();
        if let Some(i) = queue.cycle_completed_index() {
            assert_eq!(kinds[i], CallKind::CycleCompleted);
        }
        if let Some(i) = queue.cycle_fragment_completed_index() {
            assert_eq!(kinds[i], CallKind::CycleFragmentCompleted);
        }
        let completed = kinds.iter().filter(|k| **k == CallKind::CycleCompleted).count();
        let fragments = kinds.iter().filter(|k| **k == CallKind::CycleFragmentCompleted).count();
        assert!(completed <= 1 && fragments <= 1);
    }

    #[test]
    fn test_coalesced_call_moves_to_tail() {
        let mut queue = CallQueue::new();
        assert_eq!(
            queue.enqueue_cycle(MergeableKind::CycleCompleted, None, Some(&delta(1.0))),
            Enqueued::Appended { index: 0 }
        );
        queue.push(MergedCall::ProcessCompleted);
        assert_eq!(
            queue.enqueue_cycle(MergeableKind::CycleCompleted, None, Some(&delta(2.0))),
            Enqueued::Coalesced { from: 0, to: 1 }
        );
        assert_eq!(
            queue.kinds(),
            vec![CallKind::ProcessCompleted, CallKind::CycleCompleted]
        );
        assert_eq!(queue.cycle_completed_index(), Some(1));
        assert_cursors_valid(&queue);
    }

    #[test]
    fn test_other_cursor_is_reindexed() {
        let mut queue = CallQueue::new();
        queue.enqueue_cycle(MergeableKind::CycleFragmentCompleted, None, Some(&delta(1.0)));
        queue.enqueue_cycle(MergeableKind::CycleCompleted, None, Some(&delta(2.0)));
        queue.enqueue_cycle(MergeableKind::CycleFragmentCompleted, None, Some(&delta(3.0)));

        assert_eq!(
            queue.kinds(),
            vec![CallKind::CycleCompleted, CallKind::CycleFragmentCompleted]
        );
        assert_eq!(queue.cycle_completed_index(), Some(0));
        assert_eq!(queue.cycle_fragment_completed_index(), Some(1));
        assert_cursors_valid(&queue);
    }

    #[test]
    fn test_update_at_tail_does_not_move() {
        let mut queue = CallQueue::new();
        queue.push(MergedCall::ProcessCompleted);
        queue.enqueue_cycle(MergeableKind::CycleCompleted, None, Some(&delta(1.0)));
        assert_eq!(
            queue.enqueue_cycle(MergeableKind::CycleCompleted, None, Some(&delta(2.0))),
            Enqueued::Coalesced { from: 1, to: 1 }
        );
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_interleaved_sequence_keeps_invariants() {
        let mut queue = CallQueue::new();
        for step in 0..40 {
            match step % 5 {
                0 => {
                    queue.enqueue_cycle(MergeableKind::CycleFragmentCompleted, None, Some(&delta(step as f64)));
                }
                1 => {
                    queue.push(MergedCall::ProcessCompleted);
                }
                2 => {
                    queue.enqueue_cycle(MergeableKind::CycleCompleted, None, Some(&delta(step as f64)));
                }
                3 => {
                    queue.enqueue_cycle(MergeableKind::CycleFragmentCompleted, None, Some(&delta(step as f64)));
                }
                _ => {
                    queue.push(MergedCall::ProcessTerminated {
                        execution_interrupted: false,
                    });
                }
            }
            assert_cursors_valid(&queue);
        }
    }

    #[test]
    fn test_take_resets_cursors() {
        let mut queue = CallQueue::new();
        queue.enqueue_cycle(MergeableKind::CycleCompleted, None, Some(&delta(1.0)));
        queue.enqueue_cycle(MergeableKind::CycleFragmentCompleted, None, Some(&delta(1.0)));
        assert_eq!(queue.take().len(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.cycle_completed_index(), None);
        assert_eq!(queue.cycle_fragment_completed_index(), None);
        assert_eq!(
            queue.enqueue_cycle(MergeableKind::CycleCompleted, None, Some(&delta(2.0))),
            Enqueued::Appended { index: 0 }
        );
    }
}
