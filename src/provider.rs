//! Merging Update Provider
//!
//! Wraps one `IncrementalMerger` for a single-typed update stream and fans
//! updates out to a set of listeners, either live (pass-through) or merged
//! until `trigger_update` flushes them.
//!
//! # Locking
//!
//! One re-entrant lock per provider. Mutable state sits in a `RefCell` that is
//! only borrowed for short critical sections; fan-out runs with the lock held
//! but the state released, so delivery order is total across threads while a
//! listener may still call back into the provider from its callback.

use crate::config::{FailurePolicy, ProviderConfig};
use crate::error::MergeError;
use crate::merge::IncrementalMerger;
use chrono::{DateTime, Utc};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Receives updates from a `MergingUpdateProvider`.
pub trait UpdateListener<T>: Send + Sync {
    fn on_update(&self, update: &T);
}

impl<T, F> UpdateListener<T> for F
where
    F: Fn(&T) + Send + Sync,
{
    fn on_update(&self, update: &T) {
        self(update)
    }
}

struct ProviderState<T> {
    pass_through: bool,
    shut_down: bool,
    merger: Box<dyn IncrementalMerger<T>>,
    listeners: Vec<Arc<dyn UpdateListener<T>>>,
    last_update: Option<DateTime<Utc>>,
}

pub struct MergingUpdateProvider<T> {
    inner: ReentrantMutex<RefCell<ProviderState<T>>>,
    failure_policy: FailurePolicy,
}

impl<T: 'static> MergingUpdateProvider<T> {
    pub fn new(merger: impl IncrementalMerger<T> + 'static) -> Self {
        Self::with_config(merger, &ProviderConfig::default())
    }

    pub fn with_config(merger: impl IncrementalMerger<T> + 'static, config: &ProviderConfig) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(ProviderState {
                pass_through: config.start_in_pass_through,
                shut_down: false,
                merger: Box::new(merger),
                listeners: Vec::new(),
                last_update: None,
            })),
            failure_policy: config.listener_failure_policy,
        }
    }

    /// Accept a new result: deliver it now in pass-through mode, merge it
    /// otherwise.
    pub fn new_result(&self, value: T) -> Result<(), MergeError> {
        let guard = self.inner.lock();
        let listeners = {
            let mut state = guard.borrow_mut();
            if state.shut_down {
                return Err(MergeError::ShutDown);
            }
            state.last_update = Some(Utc::now());
            if !state.pass_through {
                state.merger.merge(value);
                return Ok(());
            }
            state.listeners.clone()
        };
        self.deliver(&listeners, &value);
        Ok(())
    }

    /// Flush the merged result to every listener. Returns whether anything
    /// was delivered.
    pub fn trigger_update(&self) -> Result<bool, MergeError> {
        let guard = self.inner.lock();
        if guard.borrow().shut_down {
            return Err(MergeError::ShutDown);
        }
        Ok(self.flush(&guard))
    }

    /// Drop whatever has been merged so far without delivering it.
    pub fn reset_merger(&self) {
        let guard = self.inner.lock();
        let discarded = guard.borrow_mut().merger.consume();
        if discarded.is_some() {
            debug!("Discarded pending merged update");
        }
    }

    /// Switch delivery mode. Turning pass-through on flushes the pending
    /// update first, so nothing merged is lost or delivered twice. Results a
    /// listener feeds back in during the flush are flushed too before the
    /// flag flips.
    pub fn set_pass_through(&self, enable: bool) {
        let guard = self.inner.lock();
        if enable && !guard.borrow().pass_through {
            while self.flush(&guard) {}
        }
        guard.borrow_mut().pass_through = enable;
        debug!(pass_through = enable, "Update provider mode changed");
    }

    pub fn is_pass_through(&self) -> bool {
        self.inner.lock().borrow().pass_through
    }

    /// Register a listener. Returns false if it was already registered.
    pub fn add_listener(&self, listener: Arc<dyn UpdateListener<T>>) -> bool {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        if state.listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        state.listeners.push(listener);
        true
    }

    /// Unregister a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn UpdateListener<T>>) -> bool {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        let before = state.listeners.len();
        state.listeners.retain(|l| !Arc::ptr_eq(l, listener));
        state.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().borrow().listeners.len()
    }

    /// Time of the last `new_result`, if any.
    pub fn last_update_time(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().borrow().last_update
    }

    /// Discard pending state and listeners; later results are rejected.
    pub fn shutdown(&self) {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        state.merger.consume();
        state.listeners.clear();
        state.shut_down = true;
        debug!("Update provider shut down");
    }

    fn flush(&self, guard: &RefCell<ProviderState<T>>) -> bool {
        let (update, listeners) = {
            let mut state = guard.borrow_mut();
            let update = state.merger.consume();
            (update, state.listeners.clone())
        };
        match update {
            Some(update) => {
                self.deliver(&listeners, &update);
                true
            }
            None => false,
        }
    }

    fn deliver(&self, listeners: &[Arc<dyn UpdateListener<T>>], update: &T) {
        for (index, listener) in listeners.iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_update(update)));
            if let Err(panic) = outcome {
                match self.failure_policy {
                    FailurePolicy::Isolate => {
                        error!(listener = index, "Update listener panicked; continuing fan-out");
                    }
                    FailurePolicy::Abort => {
                        error!(listener = index, "Update listener panicked; aborting fan-out");
                        resume_unwind(panic);
                    }
                }
            }
        }
    }
}
