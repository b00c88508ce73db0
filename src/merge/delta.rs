//! Delta result merger
//!
//! Repeated deltas collapse into the net change since the last consume:
//! values overwrite key by key, metadata follows the latest delta except the
//! previous-result timestamp, which stays pinned to the first delta merged.

use super::{overwrite_values, IncrementalMerger};
use crate::model::DeltaResult;

#[derive(Debug, Default)]
pub struct DeltaResultMerger {
    current: Option<DeltaResult>,
}

impl DeltaResultMerger {
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Merger seeded with a first delta.
    pub fn seeded(delta: DeltaResult) -> Self {
        Self {
            current: Some(delta),
        }
    }

    /// True when `consume` would return a delta.
    pub fn has_changes(&self) -> bool {
        self.current.as_ref().is_some_and(|d| !d.is_empty())
    }
}

impl IncrementalMerger<DeltaResult> for DeltaResultMerger {
    fn merge(&mut self, delta: DeltaResult) {
        let current = match self.current.as_mut() {
            Some(current) => current,
            None => {
                // First delta since the last consume: its previous timestamp
                // and calc config set become the baseline.
                self.current = Some(delta);
                return;
            }
        };

        current.valuation_time = delta.valuation_time;
        current.result_timestamp = delta.result_timestamp;
        if delta.cycle_id.is_some() {
            current.cycle_id = delta.cycle_id;
        }
        current.calc_config_names.extend(delta.calc_config_names);
        overwrite_values(&mut current.values, delta.values);
    }

    fn consume(&mut self) -> Option<DeltaResult> {
        self.current.take().filter(|d| !d.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CycleId, ResultValue};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_consume_without_merge_is_none() {
        let mut merger = DeltaResultMerger::new();
        assert!(merger.consume().is_none());
        assert!(!merger.has_changes());
    }

    #[test]
    fn test_deltas_collapse_to_net_change() {
        let mut merger = DeltaResultMerger::new();
        merger.merge(
            DeltaResult::new(ts(100), ts(101))
                .with_previous_result_timestamp(ts(90))
                .add_value("Default", "SWAP-1", "PV", 1.0)
                .add_value("Default", "SWAP-2", "PV", 5.0),
        );
        merger.merge(
            DeltaResult::new(ts(110), ts(111))
                .with_previous_result_timestamp(ts(101))
                .add_value("Default", "SWAP-1", "PV", 2.0)
                .add_value("Stress", "SWAP-1", "PV", -4.0),
        );

        let merged = merger.consume().unwrap();
        assert_eq!(merged.valuation_time, ts(110));
        assert_eq!(merged.result_timestamp, ts(111));
        assert_eq!(merged.previous_result_timestamp, Some(ts(90)));
        assert_eq!(merged.calc_config_names.len(), 2);
        assert_eq!(merged.value("Default", "SWAP-1", "PV"), Some(&ResultValue::Number(2.0)));
        assert_eq!(merged.value("Default", "SWAP-2", "PV"), Some(&ResultValue::Number(5.0)));
        assert_eq!(merged.value("Stress", "SWAP-1", "PV"), Some(&ResultValue::Number(-4.0)));
        assert!(merger.consume().is_none());
    }

    #[test]
    fn test_empty_deltas_carry_no_information() {
        let mut merger = DeltaResultMerger::new();
        merger.merge(DeltaResult::new(ts(1), ts(2)));
        merger.merge(DeltaResult::new(ts(3), ts(4)));
        assert!(!merger.has_changes());
        assert!(merger.consume().is_none());
    }

    #[test]
    fn test_latest_cycle_id_wins() {
        let mut merger = DeltaResultMerger::new();
        merger.merge(DeltaResult::new(ts(1), ts(2)).with_cycle(CycleId::from_u128(1)).add_value("D", "T", "V", 1.0));
        merger.merge(DeltaResult::new(ts(3), ts(4)).with_cycle(CycleId::from_u128(2)));
        assert_eq!(merger.consume().unwrap().cycle_id, Some(CycleId::from_u128(2)));
    }
}
