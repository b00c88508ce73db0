//! Result Merge Library
//!
//! Incremental merging of computation results for consumers that cannot keep
//! up with the engine: value-level mergers for delta and full cycle results,
//! a generic merging update provider, and a call-coalescing listener adapter
//! with optional cycle retention.

pub mod config;
pub mod error;
pub mod listener;
pub mod merge;
pub mod model;
pub mod provider;
pub mod retention;

pub use config::{FailurePolicy, ListenerConfig, MergeConfig, ProviderConfig};
pub use error::MergeError;
pub use listener::{MergingViewProcessListener, ViewResultListener};
pub use merge::{DeltaResultMerger, FullResultMerger, IncrementalMerger, LatestValueMerger};
pub use provider::{MergingUpdateProvider, UpdateListener};
pub use retention::{CycleResourceManager, InMemoryCycleManager};
