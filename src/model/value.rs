//! Computed values and market data items.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A single computed value.
///
/// Floating point payloads compare and hash by bit pattern so values can live
/// in hash sets (market data accumulation relies on this).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultValue {
    Flag(bool),
    Number(f64),
    Vector(Vec<f64>),
    Text(String),
}

impl ResultValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for ResultValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Flag(a), Self::Flag(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a.to_bits() == b.to_bits(),
            (Self::Vector(a), Self::Vector(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ResultValue {}

impl Hash for ResultValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Flag(v) => v.hash(state),
            Self::Number(v) => v.to_bits().hash(state),
            Self::Vector(values) => {
                values.len().hash(state);
                for v in values {
                    v.to_bits().hash(state);
                }
            }
            Self::Text(s) => s.hash(state),
        }
    }
}

impl From<f64> for ResultValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for ResultValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<&str> for ResultValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ResultValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<f64>> for ResultValue {
    fn from(value: Vec<f64>) -> Self {
        Self::Vector(value)
    }
}

/// One observed market data item (requirement + observed value).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketDataValue {
    pub requirement: String,
    pub value: ResultValue,
}

impl MarketDataValue {
    pub fn new(requirement: impl Into<String>, value: impl Into<ResultValue>) -> Self {
        Self {
            requirement: requirement.into(),
            value: value.into(),
        }
    }
}
