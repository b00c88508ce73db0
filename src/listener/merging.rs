//! Merging View Process Listener
//!
//! Sits in front of a (possibly slow) consumer and implements the same
//! `ViewResultListener` interface. In pass-through mode every callback is
//! forwarded immediately. In merge mode callbacks are queued in arrival
//! order, cycle and fragment completions coalesce into a single up-to-date
//! call, and nothing reaches the consumer until `drain`.
//!
//! # Ordering
//!
//! Distinct event kinds keep their relative order. A coalesced call is
//! delivered at the position of its most recent event, so
//! `[completed, process_completed, completed]` drains as
//! `[process_completed, completed]`.
//!
//! # Locking
//!
//! One re-entrant lock per listener. Queued calls are taken out of the state
//! before replay and replayed with the lock still held: delivery order is
//! total across threads, and a consumer calling back into this listener from
//! a callback neither deadlocks nor observes a half-updated queue. A slow
//! consumer does block producers for the duration of a drain.

use super::call::{CallKind, MergeableKind, MergedCall};
use super::queue::{CallQueue, Enqueued};
use super::stats::{ListenerStats, ListenerStatsSnapshot};
use super::ViewResultListener;
use crate::config::{FailurePolicy, ListenerConfig};
use crate::model::{
    CompiledViewDefinition, CycleExecutionOptions, CycleId, CycleMetadata, DeltaResult,
    FullResult, SharedError,
};
use crate::retention::{CycleResourceManager, CycleRetainer};
use chrono::{DateTime, Utc};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

struct ListenerState {
    pass_through: bool,
    queue: CallQueue,
    retain_latest: bool,
    retainer: CycleRetainer,
    last_update: Option<DateTime<Utc>>,
}

pub struct MergingViewProcessListener {
    underlying: Arc<dyn ViewResultListener>,
    inner: ReentrantMutex<RefCell<ListenerState>>,
    replay_policy: FailurePolicy,
    stats: ListenerStats,
}

impl MergingViewProcessListener {
    pub fn new(
        underlying: Arc<dyn ViewResultListener>,
        cycle_manager: Arc<dyn CycleResourceManager>,
    ) -> Self {
        Self::with_config(underlying, cycle_manager, &ListenerConfig::default())
    }

    pub fn with_config(
        underlying: Arc<dyn ViewResultListener>,
        cycle_manager: Arc<dyn CycleResourceManager>,
        config: &ListenerConfig,
    ) -> Self {
        Self {
            underlying,
            inner: ReentrantMutex::new(RefCell::new(ListenerState {
                pass_through: config.start_in_pass_through,
                queue: CallQueue::new(),
                retain_latest: config.retain_latest_cycle,
                retainer: CycleRetainer::new(cycle_manager),
                last_update: None,
            })),
            replay_policy: config.replay_failure_policy,
            stats: ListenerStats::default(),
        }
    }

    // =========================================================================
    // CONTROL SURFACE
    // =========================================================================

    pub fn is_pass_through(&self) -> bool {
        self.inner.lock().borrow().pass_through
    }

    /// Switch delivery mode. Turning pass-through on drains the queue first,
    /// including calls the consumer queues back into this listener while
    /// being drained; the flag flips only once the queue is empty.
    pub fn set_pass_through(&self, enable: bool) {
        let guard = self.inner.lock();
        let was = guard.borrow().pass_through;
        if enable && !was {
            loop {
                self.drain();
                if guard.borrow().queue.is_empty() {
                    break;
                }
            }
        }
        guard.borrow_mut().pass_through = enable;
        if was != enable {
            info!(pass_through = enable, "Merging listener mode changed");
        }
    }

    pub fn is_latest_result_cycle_retained(&self) -> bool {
        self.inner.lock().borrow().retain_latest
    }

    /// Enable/disable retention of the cycle behind the latest full result.
    /// Disabling releases whatever is currently retained.
    pub fn set_latest_result_cycle_retained(&self, retain: bool) {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        state.retain_latest = retain;
        if !retain {
            if let Some(cycle) = state.retainer.release() {
                debug!(cycle = %cycle, "Released retained cycle");
            }
        }
    }

    /// Cycle currently retained, if any.
    pub fn retained_cycle(&self) -> Option<CycleId> {
        self.inner.lock().borrow().retainer.retained_cycle()
    }

    /// Replay every queued call to the consumer, in order, then clear the
    /// queue. Returns the number of calls delivered.
    pub fn drain(&self) -> usize {
        let guard = self.inner.lock();
        let calls = guard.borrow_mut().queue.take();
        ListenerStats::incr(&self.stats.drains);
        if calls.is_empty() {
            return 0;
        }
        debug!(calls = calls.len(), "Draining merged calls");
        self.replay(calls)
    }

    /// Discard queued calls without delivering them and release the retained
    /// cycle (subscription abandoned).
    pub fn reset(&self) {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        let discarded = state.queue.clear();
        let released = state.retainer.release();
        ListenerStats::incr(&self.stats.resets);
        ListenerStats::add(&self.stats.calls_discarded, discarded as u64);
        debug!(discarded, released = ?released, "Merging listener reset");
    }

    pub fn queued_call_count(&self) -> usize {
        self.inner.lock().borrow().queue.len()
    }

    /// Kinds of the queued calls, in delivery order.
    pub fn queued_kinds(&self) -> Vec<CallKind> {
        self.inner.lock().borrow().queue.kinds()
    }

    /// Time of the last event received, in either mode.
    pub fn last_update_time(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().borrow().last_update
    }

    pub fn stats(&self) -> ListenerStatsSnapshot {
        self.stats.snapshot()
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Forward in pass-through mode, otherwise queue via `enqueue`.
    fn dispatch<F, Q>(&self, kind: CallKind, forward: F, enqueue: Q)
    where
        F: FnOnce(&dyn ViewResultListener),
        Q: FnOnce(&mut CallQueue) -> Enqueued,
    {
        let guard = self.inner.lock();
        ListenerStats::incr(&self.stats.events_received);
        let pass_through = {
            let mut state = guard.borrow_mut();
            state.last_update = Some(Utc::now());
            if !state.pass_through {
                match enqueue(&mut state.queue) {
                    Enqueued::Appended { index } => {
                        ListenerStats::incr(&self.stats.calls_queued);
                        debug!(kind = %kind, index, "Queued call");
                    }
                    Enqueued::Coalesced { from, to } => {
                        ListenerStats::incr(&self.stats.events_coalesced);
                        debug!(kind = %kind, from, to, "Coalesced call");
                    }
                }
            }
            state.pass_through
        };
        if pass_through {
            ListenerStats::incr(&self.stats.events_forwarded);
            forward(self.underlying.as_ref());
        }
    }

    fn replay(&self, calls: Vec<MergedCall>) -> usize {
        let total = calls.len();
        let mut delivered = 0;
        for (position, call) in calls.into_iter().enumerate() {
            let kind = call.kind();
            let underlying = self.underlying.as_ref();
            match catch_unwind(AssertUnwindSafe(|| call.replay(underlying))) {
                Ok(true) => {
                    delivered += 1;
                    ListenerStats::incr(&self.stats.calls_replayed);
                }
                Ok(false) => {
                    ListenerStats::incr(&self.stats.empty_calls_skipped);
                    debug!(kind = %kind, "Skipped cycle call with nothing to deliver");
                }
                Err(panic) => {
                    ListenerStats::incr(&self.stats.replay_failures);
                    match self.replay_policy {
                        FailurePolicy::Isolate => {
                            error!(kind = %kind, position, "Consumer panicked during replay; continuing");
                        }
                        FailurePolicy::Abort => {
                            let dropped = total - position - 1;
                            ListenerStats::add(&self.stats.calls_discarded, dropped as u64);
                            error!(kind = %kind, position, dropped, "Consumer panicked during replay; aborting drain");
                            resume_unwind(panic);
                        }
                    }
                }
            }
        }
        delivered
    }

    fn retain_cycle_of(&self, full: Option<&FullResult>) {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        if !state.retain_latest {
            return;
        }
        let Some(full) = full else {
            return;
        };
        if let Err(e) = state.retainer.replace(full.cycle_id) {
            ListenerStats::incr(&self.stats.retention_failures);
            warn!(cycle = %full.cycle_id, "Unable to retain cycle: {}", e);
        }
    }
}

impl ViewResultListener for MergingViewProcessListener {
    fn view_definition_compiled(
        &self,
        compiled: &CompiledViewDefinition,
        has_market_data_permissions: bool,
    ) {
        self.dispatch(
            CallKind::ViewDefinitionCompiled,
            |l| l.view_definition_compiled(compiled, has_market_data_permissions),
            |q| {
                q.push(MergedCall::ViewDefinitionCompiled {
                    compiled: compiled.clone(),
                    has_market_data_permissions,
                })
            },
        );
    }

    fn view_definition_compilation_failed(&self, valuation_time: DateTime<Utc>, error: &SharedError) {
        self.dispatch(
            CallKind::ViewDefinitionCompilationFailed,
            |l| l.view_definition_compilation_failed(valuation_time, error),
            |q| {
                q.push(MergedCall::ViewDefinitionCompilationFailed {
                    valuation_time,
                    error: Arc::clone(error),
                })
            },
        );
    }

    fn cycle_started(&self, metadata: &CycleMetadata) {
        self.dispatch(
            CallKind::CycleStarted,
            |l| l.cycle_started(metadata),
            |q| {
                q.push(MergedCall::CycleStarted {
                    metadata: metadata.clone(),
                })
            },
        );
    }

    fn cycle_completed(&self, full: Option<&FullResult>, delta: Option<&DeltaResult>) {
        let _guard = self.inner.lock();
        self.retain_cycle_of(full);
        self.dispatch(
            CallKind::CycleCompleted,
            |l| l.cycle_completed(full, delta),
            |q| q.enqueue_cycle(MergeableKind::CycleCompleted, full, delta),
        );
    }

    fn cycle_fragment_completed(&self, full: Option<&FullResult>, delta: Option<&DeltaResult>) {
        self.dispatch(
            CallKind::CycleFragmentCompleted,
            |l| l.cycle_fragment_completed(full, delta),
            |q| q.enqueue_cycle(MergeableKind::CycleFragmentCompleted, full, delta),
        );
    }

    fn cycle_execution_failed(&self, options: &CycleExecutionOptions, error: &SharedError) {
        self.dispatch(
            CallKind::CycleExecutionFailed,
            |l| l.cycle_execution_failed(options, error),
            |q| {
                q.push(MergedCall::CycleExecutionFailed {
                    options: options.clone(),
                    error: Arc::clone(error),
                })
            },
        );
    }

    fn process_completed(&self) {
        self.dispatch(
            CallKind::ProcessCompleted,
            |l| l.process_completed(),
            |q| q.push(MergedCall::ProcessCompleted),
        );
    }

    fn process_terminated(&self, execution_interrupted: bool) {
        let guard = self.inner.lock();
        if let Some(cycle) = guard.borrow_mut().retainer.release() {
            debug!(cycle = %cycle, "Released retained cycle on process termination");
        }
        self.dispatch(
            CallKind::ProcessTerminated,
            |l| l.process_terminated(execution_interrupted),
            |q| {
                q.push(MergedCall::ProcessTerminated {
                    execution_interrupted,
                })
            },
        );
    }

    fn error(&self, error: &SharedError) {
        self.dispatch(
            CallKind::Error,
            |l| l.error(error),
            |q| {
                q.push(MergedCall::Error {
                    error: Arc::clone(error),
                })
            },
        );
    }

    fn client_shutdown(&self, error: Option<&SharedError>) {
        self.dispatch(
            CallKind::ClientShutdown,
            |l| l.client_shutdown(error),
            |q| {
                q.push(MergedCall::ClientShutdown {
                    error: error.cloned(),
                })
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{CallRecorder, RecordedCall};
    use crate::retention::InMemoryCycleManager;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn setup() -> (Arc<CallRecorder>, Arc<InMemoryCycleManager>, MergingViewProcessListener) {
        let recorder = Arc::new(CallRecorder::new());
        let manager = Arc::new(InMemoryCycleManager::new());
        let listener = MergingViewProcessListener::new(recorder.clone(), manager.clone());
        (recorder, manager, listener)
    }

    #[test]
    fn test_defaults() {
        let (_, _, listener) = setup();
        assert!(listener.is_pass_through());
        assert!(!listener.is_latest_result_cycle_retained());
        assert!(listener.last_update_time().is_none());
    }

    #[test]
    fn test_pass_through_forwards_immediately() {
        let (recorder, _, listener) = setup();
        listener.process_completed();
        assert_eq!(recorder.kinds(), vec![CallKind::ProcessCompleted]);
        assert!(listener.last_update_time().is_some());
        assert_eq!(listener.queued_call_count(), 0);
    }

    #[test]
    fn test_queued_until_drain() {
        let (recorder, _, listener) = setup();
        listener.set_pass_through(false);
        listener.view_definition_compiled(&CompiledViewDefinition::new("VD-1"), true);
        assert!(recorder.is_empty());
        assert!(listener.last_update_time().is_some());

        assert_eq!(listener.drain(), 1);
        match recorder.take().as_slice() {
            [RecordedCall::ViewDefinitionCompiled {
                view_definition_id,
                has_market_data_permissions,
            }] => {
                assert_eq!(view_definition_id, "VD-1");
                assert!(*has_market_data_permissions);
            }
            other => panic!("unexpected calls: {:?}", other),
        }
        assert_eq!(listener.drain(), 0);
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_reset_discards_without_delivery() {
        let (recorder, _, listener) = setup();
        listener.set_pass_through(false);
        listener.process_completed();
        listener.cycle_completed(None, Some(&DeltaResult::new(ts(1), ts(2)).add_value("D", "T", "V", 1.0)));
        listener.reset();
        assert_eq!(listener.queued_call_count(), 0);
        assert_eq!(listener.drain(), 0);
        assert!(recorder.is_empty());
        assert_eq!(listener.stats().calls_discarded, 2);
    }

    #[test]
    fn test_retention_tracks_latest_full_result() {
        let (_, manager, listener) = setup();
        for c in 1..=3 {
            manager.register(CycleId::from_u128(c));
        }
        listener.set_latest_result_cycle_retained(true);
        listener.set_pass_through(false);
        for c in 1..=3 {
            let full = FullResult::new(CycleId::from_u128(c), ts(c as i64), ts(c as i64));
            listener.cycle_completed(Some(&full), None);
            assert_eq!(manager.pinned_cycles(), vec![CycleId::from_u128(c)]);
        }
        assert_eq!(listener.retained_cycle(), Some(CycleId::from_u128(3)));

        listener.process_terminated(false);
        assert!(manager.pinned_cycles().is_empty());
        assert_eq!(manager.invalid_releases(), 0);
    }

    #[test]
    fn test_disabling_retention_releases() {
        let (_, manager, listener) = setup();
        manager.register(CycleId::from_u128(1));
        listener.set_latest_result_cycle_retained(true);
        listener.cycle_completed(Some(&FullResult::new(CycleId::from_u128(1), ts(1), ts(1))), None);
        assert_eq!(manager.pinned_cycles().len(), 1);
        listener.set_latest_result_cycle_retained(false);
        assert!(manager.pinned_cycles().is_empty());
    }

    #[test]
    fn test_unavailable_cycle_is_counted() {
        let (_, _, listener) = setup();
        listener.set_latest_result_cycle_retained(true);
        listener.cycle_completed(Some(&FullResult::new(CycleId::from_u128(42), ts(1), ts(1))), None);
        assert_eq!(listener.retained_cycle(), None);
        assert_eq!(listener.stats().retention_failures, 1);
    }
}
