//! Merge layer errors.

use crate::model::CycleId;

/// Errors surfaced by the merge layer's control surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// The provider was shut down; no further results are accepted.
    ShutDown,
    /// The cycle backing a result was already reclaimed and cannot be retained.
    CycleUnavailable(CycleId),
}

impl std::fmt::Display for MergeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShutDown => write!(f, "update provider has been shut down"),
            Self::CycleUnavailable(cycle) => {
                write!(f, "cycle {} is no longer available for retention", cycle)
            }
        }
    }
}

impl std::error::Error for MergeError {}
