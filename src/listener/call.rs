//! Reified listener calls
//!
//! One variant per callback. Only cycle completion and fragment completion
//! are mergeable: later events of the same kind fold into the queued call in
//! place. Everything else replays exactly once, as received.

use super::ViewResultListener;
use crate::merge::{DeltaResultMerger, FullResultMerger, IncrementalMerger};
use crate::model::{
    CompiledViewDefinition, CycleExecutionOptions, CycleMetadata, DeltaResult, FullResult,
    SharedError,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Callback kind, for logging, stats and ordering assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    ViewDefinitionCompiled,
    ViewDefinitionCompilationFailed,
    CycleStarted,
    CycleCompleted,
    CycleFragmentCompleted,
    CycleExecutionFailed,
    ProcessCompleted,
    ProcessTerminated,
    Error,
    ClientShutdown,
}

impl CallKind {
    pub fn is_mergeable(self) -> bool {
        self.mergeable().is_some()
    }

    pub fn mergeable(self) -> Option<MergeableKind> {
        match self {
            Self::CycleCompleted => Some(MergeableKind::CycleCompleted),
            Self::CycleFragmentCompleted => Some(MergeableKind::CycleFragmentCompleted),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ViewDefinitionCompiled => "view_definition_compiled",
            Self::ViewDefinitionCompilationFailed => "view_definition_compilation_failed",
            Self::CycleStarted => "cycle_started",
            Self::CycleCompleted => "cycle_completed",
            Self::CycleFragmentCompleted => "cycle_fragment_completed",
            Self::CycleExecutionFailed => "cycle_execution_failed",
            Self::ProcessCompleted => "process_completed",
            Self::ProcessTerminated => "process_terminated",
            Self::Error => "error",
            Self::ClientShutdown => "client_shutdown",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two callback kinds whose repeated events coalesce into one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeableKind {
    CycleCompleted,
    CycleFragmentCompleted,
}

impl From<MergeableKind> for CallKind {
    fn from(kind: MergeableKind) -> Self {
        match kind {
            MergeableKind::CycleCompleted => CallKind::CycleCompleted,
            MergeableKind::CycleFragmentCompleted => CallKind::CycleFragmentCompleted,
        }
    }
}

/// Accumulated (full, delta) payload of a mergeable cycle call.
#[derive(Debug, Default)]
pub struct CycleCall {
    full: FullResultMerger,
    delta: DeltaResultMerger,
}

impl CycleCall {
    pub fn new(full: Option<&FullResult>, delta: Option<&DeltaResult>) -> Self {
        Self {
            full: full.cloned().map(FullResultMerger::seeded).unwrap_or_default(),
            delta: delta.cloned().map(DeltaResultMerger::seeded).unwrap_or_default(),
        }
    }

    /// Fold a newer event of the same kind into this call.
    pub fn update(&mut self, full: Option<&FullResult>, delta: Option<&DeltaResult>) {
        if let Some(full) = full {
            self.full.merge(full.clone());
        }
        if let Some(delta) = delta {
            self.delta.merge(delta.clone());
        }
    }

    /// True if replaying would deliver anything.
    pub fn has_content(&self) -> bool {
        self.full.has_result() || self.delta.has_changes()
    }

    fn consume(&mut self) -> (Option<FullResult>, Option<DeltaResult>) {
        (self.full.consume(), self.delta.consume())
    }
}

/// A deferred invocation of one `ViewResultListener` method.
#[derive(Debug)]
pub enum MergedCall {
    ViewDefinitionCompiled {
        compiled: CompiledViewDefinition,
        has_market_data_permissions: bool,
    },
    ViewDefinitionCompilationFailed {
        valuation_time: DateTime<Utc>,
        error: SharedError,
    },
    CycleStarted {
        metadata: CycleMetadata,
    },
    CycleCompleted(CycleCall),
    CycleFragmentCompleted(CycleCall),
    CycleExecutionFailed {
        options: CycleExecutionOptions,
        error: SharedError,
    },
    ProcessCompleted,
    ProcessTerminated {
        execution_interrupted: bool,
    },
    Error {
        error: SharedError,
    },
    ClientShutdown {
        error: Option<SharedError>,
    },
}

impl MergedCall {
    pub fn kind(&self) -> CallKind {
        match self {
            Self::ViewDefinitionCompiled { .. } => CallKind::ViewDefinitionCompiled,
            Self::ViewDefinitionCompilationFailed { .. } => CallKind::ViewDefinitionCompilationFailed,
            Self::CycleStarted { .. } => CallKind::CycleStarted,
            Self::CycleCompleted(_) => CallKind::CycleCompleted,
            Self::CycleFragmentCompleted(_) => CallKind::CycleFragmentCompleted,
            Self::CycleExecutionFailed { .. } => CallKind::CycleExecutionFailed,
            Self::ProcessCompleted => CallKind::ProcessCompleted,
            Self::ProcessTerminated { .. } => CallKind::ProcessTerminated,
            Self::Error { .. } => CallKind::Error,
            Self::ClientShutdown { .. } => CallKind::ClientShutdown,
        }
    }

    /// Mergeable payload, if this is a cycle or fragment completion.
    pub fn cycle_call_mut(&mut self) -> Option<&mut CycleCall> {
        match self {
            Self::CycleCompleted(call) | Self::CycleFragmentCompleted(call) => Some(call),
            _ => None,
        }
    }

    /// Invoke the call on `listener`.
    ///
    /// Returns false when a cycle call merged down to nothing (no full result
    /// and no delta touching any target) and was skipped.
    pub fn replay(self, listener: &dyn ViewResultListener) -> bool {
        match self {
            Self::ViewDefinitionCompiled {
                compiled,
                has_market_data_permissions,
            } => listener.view_definition_compiled(&compiled, has_market_data_permissions),
            Self::ViewDefinitionCompilationFailed {
                valuation_time,
                error,
            } => listener.view_definition_compilation_failed(valuation_time, &error),
            Self::CycleStarted { metadata } => listener.cycle_started(&metadata),
            Self::CycleCompleted(mut call) => match call.consume() {
                (None, None) => return false,
                (full, delta) => listener.cycle_completed(full.as_ref(), delta.as_ref()),
            },
            Self::CycleFragmentCompleted(mut call) => match call.consume() {
                (None, None) => return false,
                (full, delta) => listener.cycle_fragment_completed(full.as_ref(), delta.as_ref()),
            },
            Self::CycleExecutionFailed { options, error } => {
                listener.cycle_execution_failed(&options, &error)
            }
            Self::ProcessCompleted => listener.process_completed(),
            Self::ProcessTerminated {
                execution_interrupted,
            } => listener.process_terminated(execution_interrupted),
            Self::Error { error } => listener.error(&error),
            Self::ClientShutdown { error } => listener.client_shutdown(error.as_ref()),
        }
        true
    }
}
