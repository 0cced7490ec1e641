//! Forecast signals consumed by strategies.

use crate::domain::error::FoldtraderError;
use crate::domain::price::Timestamp;
use crate::domain::splitter::TimeRange;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Standardized directional forecast emitted by an external model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: Timestamp,
    pub asset: String,
    /// -1.0 (short) to 1.0 (long).
    pub direction: f64,
    /// Confidence in [0, 1].
    pub probability: f64,
    /// Forecast horizon in sampling periods.
    pub horizon: u32,
    pub source: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Signal {
    pub fn new(
        timestamp: Timestamp,
        asset: &str,
        direction: f64,
        probability: f64,
        horizon: u32,
        source: &str,
    ) -> Result<Self, FoldtraderError> {
        if !(-1.0..=1.0).contains(&direction) {
            return Err(FoldtraderError::config_invalid(
                "signal",
                "direction",
                format!("direction {direction} outside [-1, 1]"),
            ));
        }
        if !(0.0..=1.0).contains(&probability) {
            return Err(FoldtraderError::config_invalid(
                "signal",
                "probability",
                format!("probability {probability} outside [0, 1]"),
            ));
        }
        if horizon == 0 {
            return Err(FoldtraderError::config_invalid(
                "signal",
                "horizon",
                "horizon must be positive",
            ));
        }
        Ok(Signal {
            timestamp,
            asset: asset.to_string(),
            direction,
            probability,
            horizon,
            source: source.to_string(),
            metadata: BTreeMap::new(),
        })
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Signals whose timestamp lies inside `range`, in input order.
pub fn signals_in_range(signals: &[Signal], range: &TimeRange) -> Vec<Signal> {
    signals
        .iter()
        .filter(|s| range.contains(s.timestamp))
        .cloned()
        .collect()
}
