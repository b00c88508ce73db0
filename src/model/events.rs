//! Payloads of the non-mergeable listener events.

use super::CycleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Engine failure carried inside an event; shared so queued calls stay `Clone`.
pub type SharedError = Arc<anyhow::Error>;

/// Result of compiling a view definition into an executable plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledViewDefinition {
    pub view_definition_id: String,
    #[serde(default)]
    pub calc_config_names: BTreeSet<String>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
}

impl CompiledViewDefinition {
    pub fn new(view_definition_id: impl Into<String>) -> Self {
        Self {
            view_definition_id: view_definition_id.into(),
            calc_config_names: BTreeSet::new(),
            valid_from: None,
            valid_to: None,
        }
    }
}

/// Announcement of a cycle about to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleMetadata {
    pub cycle_id: CycleId,
    pub view_definition_id: String,
    pub valuation_time: DateTime<Utc>,
    #[serde(default)]
    pub market_data_snapshot_id: Option<String>,
}

/// Options a failed cycle was executed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleExecutionOptions {
    #[serde(default)]
    pub valuation_time: Option<DateTime<Utc>>,
    pub market_data_specification: String,
}
