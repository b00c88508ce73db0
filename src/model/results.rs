//! Delta and full cycle results.

use super::{CycleId, MarketDataValue, ResultValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Value name -> computed value.
pub type ValueMap = BTreeMap<String, ResultValue>;

/// Computation target -> values computed for it.
pub type TargetResults = BTreeMap<String, ValueMap>;

/// Calculation configuration -> per-target values.
pub type ResultMap = BTreeMap<String, TargetResults>;

/// Values that changed since the previously delivered result.
///
/// A delta that touches no targets carries no information and is never
/// delivered by the merge layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaResult {
    #[serde(default)]
    pub cycle_id: Option<CycleId>,
    pub valuation_time: DateTime<Utc>,
    pub result_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub previous_result_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub calc_config_names: BTreeSet<String>,
    #[serde(default)]
    pub values: ResultMap,
}

impl DeltaResult {
    pub fn new(valuation_time: DateTime<Utc>, result_timestamp: DateTime<Utc>) -> Self {
        Self {
            cycle_id: None,
            valuation_time,
            result_timestamp,
            previous_result_timestamp: None,
            calc_config_names: BTreeSet::new(),
            values: ResultMap::new(),
        }
    }

    pub fn with_cycle(mut self, cycle_id: CycleId) -> Self {
        self.cycle_id = Some(cycle_id);
        self
    }

    pub fn with_previous_result_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.previous_result_timestamp = Some(timestamp);
        self
    }

    /// Record a changed value (registers the calc config name too).
    pub fn add_value(
        mut self,
        calc_config: &str,
        target: &str,
        value_name: &str,
        value: impl Into<ResultValue>,
    ) -> Self {
        insert_value(&mut self.values, calc_config, target, value_name, value.into());
        self.calc_config_names.insert(calc_config.to_string());
        self
    }

    pub fn value(&self, calc_config: &str, target: &str, value_name: &str) -> Option<&ResultValue> {
        lookup(&self.values, calc_config, target, value_name)
    }

    /// Number of (calc config, target) pairs carrying at least one value.
    pub fn target_count(&self) -> usize {
        count_targets(&self.values)
    }

    pub fn is_empty(&self) -> bool {
        self.target_count() == 0
    }

    /// All values in key order: (calc config, target, value name, value).
    pub fn all_results(&self) -> impl Iterator<Item = (&str, &str, &str, &ResultValue)> {
        iter_values(&self.values)
    }
}

/// Complete snapshot of every value computed by a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullResult {
    /// Cycle backing this snapshot (retained while the result is pending).
    pub cycle_id: CycleId,
    pub valuation_time: DateTime<Utc>,
    pub result_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub calc_config_names: BTreeSet<String>,
    #[serde(default)]
    pub values: ResultMap,
    /// Distinct market data observed by the cycle(s) folded into this result.
    #[serde(default)]
    pub market_data: HashSet<MarketDataValue>,
}

impl FullResult {
    pub fn new(
        cycle_id: CycleId,
        valuation_time: DateTime<Utc>,
        result_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            cycle_id,
            valuation_time,
            result_timestamp,
            calc_config_names: BTreeSet::new(),
            values: ResultMap::new(),
            market_data: HashSet::new(),
        }
    }

    pub fn add_value(
        mut self,
        calc_config: &str,
        target: &str,
        value_name: &str,
        value: impl Into<ResultValue>,
    ) -> Self {
        insert_value(&mut self.values, calc_config, target, value_name, value.into());
        self.calc_config_names.insert(calc_config.to_string());
        self
    }

    pub fn add_market_data(mut self, requirement: &str, value: impl Into<ResultValue>) -> Self {
        self.market_data.insert(MarketDataValue::new(requirement, value));
        self
    }

    pub fn value(&self, calc_config: &str, target: &str, value_name: &str) -> Option<&ResultValue> {
        lookup(&self.values, calc_config, target, value_name)
    }

    pub fn target_count(&self) -> usize {
        count_targets(&self.values)
    }

    pub fn all_results(&self) -> impl Iterator<Item = (&str, &str, &str, &ResultValue)> {
        iter_values(&self.values)
    }
}

fn insert_value(
    values: &mut ResultMap,
    calc_config: &str,
    target: &str,
    value_name: &str,
    value: ResultValue,
) {
    values
        .entry(calc_config.to_string())
        .or_default()
        .entry(target.to_string())
        .or_default()
        .insert(value_name.to_string(), value);
}

fn lookup<'a>(
    values: &'a ResultMap,
    calc_config: &str,
    target: &str,
    value_name: &str,
) -> Option<&'a ResultValue> {
    values.get(calc_config)?.get(target)?.get(value_name)
}

fn count_targets(values: &ResultMap) -> usize {
    values
        .values()
        .flat_map(|targets| targets.values())
        .filter(|v| !v.is_empty())
        .count()
}

fn iter_values(values: &ResultMap) -> impl Iterator<Item = (&str, &str, &str, &ResultValue)> {
    values.iter().flat_map(|(config, targets)| {
        targets.iter().flat_map(move |(target, named)| {
            named
                .iter()
                .map(move |(name, value)| (config.as_str(), target.as_str(), name.as_str(), value))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_empty_delta_touches_no_targets() {
        let delta = DeltaResult::new(ts(1), ts(2));
        assert!(delta.is_empty());
        assert_eq!(delta.target_count(), 0);
    }

    #[test]
    fn test_target_count_is_per_config_and_target() {
        let delta = DeltaResult::new(ts(1), ts(2))
            .add_value("Default", "SWAP-1", "PV", 10.0)
            .add_value("Default", "SWAP-1", "Delta", 0.4)
            .add_value("Stress", "SWAP-1", "PV", 8.0)
            .add_value("Default", "SWAP-2", "PV", 3.0);
        assert_eq!(delta.target_count(), 3);
        assert_eq!(
            delta.calc_config_names.iter().cloned().collect::<Vec<_>>(),
            vec!["Default".to_string(), "Stress".to_string()]
        );
        assert_eq!(delta.value("Stress", "SWAP-1", "PV"), Some(&ResultValue::Number(8.0)));
        assert_eq!(delta.all_results().count(), 4);
    }

    #[test]
    fn test_full_result_json_roundtrip_preserves_market_data() {
        let full = FullResult::new(CycleId::from_u128(7), ts(10), ts(11))
            .add_value("Default", "BOND-1", "YieldToMaturity", 0.0425)
            .add_market_data("BOND-1.price", 99.5);
        let json = serde_json::to_string(&full).unwrap();
        let back: FullResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, full);
    }
}
