//! Recording consumer
//!
//! A `ViewResultListener` that captures every call it receives as an owned,
//! serializable record. Used by the replay tool and by tests to observe what
//! reached the consumer, and in what order.

use super::call::CallKind;
use super::ViewResultListener;
use crate::model::{
    CompiledViewDefinition, CycleExecutionOptions, CycleId, CycleMetadata, DeltaResult,
    FullResult, SharedError,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum RecordedCall {
    ViewDefinitionCompiled {
        view_definition_id: String,
        has_market_data_permissions: bool,
    },
    ViewDefinitionCompilationFailed {
        valuation_time: DateTime<Utc>,
        message: String,
    },
    CycleStarted {
        cycle_id: CycleId,
    },
    CycleCompleted {
        full: Option<FullResult>,
        delta: Option<DeltaResult>,
    },
    CycleFragmentCompleted {
        full: Option<FullResult>,
        delta: Option<DeltaResult>,
    },
    CycleExecutionFailed {
        options: CycleExecutionOptions,
        message: String,
    },
    ProcessCompleted,
    ProcessTerminated {
        execution_interrupted: bool,
    },
    Error {
        message: String,
    },
    ClientShutdown {
        message: Option<String>,
    },
}

impl RecordedCall {
    pub fn kind(&self) -> CallKind {
        match self {
            Self::ViewDefinitionCompiled { .. } => CallKind::ViewDefinitionCompiled,
            Self::ViewDefinitionCompilationFailed { .. } => CallKind::ViewDefinitionCompilationFailed,
            Self::CycleStarted { .. } => CallKind::CycleStarted,
            Self::CycleCompleted { .. } => CallKind::CycleCompleted,
            Self::CycleFragmentCompleted { .. } => CallKind::CycleFragmentCompleted,
            Self::CycleExecutionFailed { .. } => CallKind::CycleExecutionFailed,
            Self::ProcessCompleted => CallKind::ProcessCompleted,
            Self::ProcessTerminated { .. } => CallKind::ProcessTerminated,
            Self::Error { .. } => CallKind::Error,
            Self::ClientShutdown { .. } => CallKind::ClientShutdown,
        }
    }
}

#[derive(Debug, Default)]
pub struct CallRecorder {
    calls: Mutex<Vec<RecordedCall>>,
}

impl CallRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<RecordedCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn kinds(&self) -> Vec<CallKind> {
        self.calls.lock().iter().map(RecordedCall::kind).collect()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().push(call);
    }
}

impl ViewResultListener for CallRecorder {
    fn view_definition_compiled(
        &self,
        compiled: &CompiledViewDefinition,
        has_market_data_permissions: bool,
    ) {
        self.record(RecordedCall::ViewDefinitionCompiled {
            view_definition_id: compiled.view_definition_id.clone(),
            has_market_data_permissions,
        });
    }

    fn view_definition_compilation_failed(&self, valuation_time: DateTime<Utc>, error: &SharedError) {
        self.record(RecordedCall::ViewDefinitionCompilationFailed {
            valuation_time,
            message: error.to_string(),
        });
    }

    fn cycle_started(&self, metadata: &CycleMetadata) {
        self.record(RecordedCall::CycleStarted {
            cycle_id: metadata.cycle_id,
        });
    }

    fn cycle_completed(&self, full: Option<&FullResult>, delta: Option<&DeltaResult>) {
        self.record(RecordedCall::CycleCompleted {
            full: full.cloned(),
            delta: delta.cloned(),
        });
    }

    fn cycle_fragment_completed(&self, full: Option<&FullResult>, delta: Option<&DeltaResult>) {
        self.record(RecordedCall::CycleFragmentCompleted {
            full: full.cloned(),
            delta: delta.cloned(),
        });
    }

    fn cycle_execution_failed(&self, options: &CycleExecutionOptions, error: &SharedError) {
        self.record(RecordedCall::CycleExecutionFailed {
            options: options.clone(),
            message: error.to_string(),
        });
    }

    fn process_completed(&self) {
        self.record(RecordedCall::ProcessCompleted);
    }

    fn process_terminated(&self, execution_interrupted: bool) {
        self.record(RecordedCall::ProcessTerminated {
            execution_interrupted,
        });
    }

    fn error(&self, error: &SharedError) {
        self.record(RecordedCall::Error {
            message: error.to_string(),
        });
    }

    fn client_shutdown(&self, error: Option<&SharedError>) {
        self.record(RecordedCall::ClientShutdown {
            message: error.map(|e| e.to_string()),
        });
    }
}
