//! Result Model
//!
//! Value types flowing from the computation engine through the merge layer:
//! cycle identifiers, computed values, delta/full cycle results and the
//! opaque payloads of the non-mergeable listener events.

mod events;
mod results;
mod value;

pub use events::{CompiledViewDefinition, CycleExecutionOptions, CycleMetadata, SharedError};
pub use results::{DeltaResult, FullResult, ResultMap, TargetResults, ValueMap};
pub use value::{MarketDataValue, ResultValue};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one execution of the computation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(Uuid);

impl CycleId {
    /// Fresh random cycle id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic cycle id (replay scenarios, tests).
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
