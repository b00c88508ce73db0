//! View Result Listeners
//!
//! The multi-method callback interface between the computation engine and
//! its consumers, and the call-coalescing adapter that sits in front of a
//! slow consumer.

mod call;
mod merging;
mod queue;
mod recorder;
mod stats;

pub use call::{CallKind, CycleCall, MergeableKind, MergedCall};
pub use merging::MergingViewProcessListener;
pub use queue::{CallQueue, Enqueued};
pub use recorder::{CallRecorder, RecordedCall};
pub use stats::{ListenerStats, ListenerStatsSnapshot};

use crate::model::{
    CompiledViewDefinition, CycleExecutionOptions, CycleMetadata, DeltaResult, FullResult,
    SharedError,
};
use chrono::{DateTime, Utc};

/// Callbacks emitted by a view process; implemented by consumers and by the
/// merging adapter that forwards to them.
pub trait ViewResultListener: Send + Sync {
    fn view_definition_compiled(
        &self,
        compiled: &CompiledViewDefinition,
        has_market_data_permissions: bool,
    );

    fn view_definition_compilation_failed(&self, valuation_time: DateTime<Utc>, error: &SharedError);

    fn cycle_started(&self, metadata: &CycleMetadata);

    fn cycle_completed(&self, full: Option<&FullResult>, delta: Option<&DeltaResult>);

    fn cycle_fragment_completed(&self, full: Option<&FullResult>, delta: Option<&DeltaResult>);

    fn cycle_execution_failed(&self, options: &CycleExecutionOptions, error: &SharedError);

    fn process_completed(&self);

    fn process_terminated(&self, execution_interrupted: bool);

    /// Failure outside any cycle (e.g. lost connection to the engine).
    fn error(&self, error: &SharedError);

    fn client_shutdown(&self, error: Option<&SharedError>);
}
