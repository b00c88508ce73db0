//! Full result merger
//!
//! Values are copied wholesale from every snapshot (a full result is always
//! the complete latest state); market data is accumulated by union so a
//! consumer that missed several cycles still sees everything they observed.

use super::{overwrite_values, IncrementalMerger};
use crate::model::FullResult;

#[derive(Debug, Default)]
pub struct FullResultMerger {
    current: Option<FullResult>,
}

impl FullResultMerger {
    pub fn new() -> Self {
        Self { current: None }
    }

    pub fn seeded(full: FullResult) -> Self {
        Self {
            current: Some(full),
        }
    }

    pub fn has_result(&self) -> bool {
        self.current.is_some()
    }
}

impl IncrementalMerger<FullResult> for FullResultMerger {
    fn merge(&mut self, full: FullResult) {
        let Some(current) = self.current.as_mut() else {
            self.current = Some(full);
            return;
        };

        current.cycle_id = full.cycle_id;
        current.valuation_time = full.valuation_time;
        current.result_timestamp = full.result_timestamp;
        current.calc_config_names.extend(full.calc_config_names);
        overwrite_values(&mut current.values, full.values);
        current.market_data.extend(full.market_data);
    }

    fn consume(&mut self) -> Option<FullResult> {
        self.current.take()
    }
}
