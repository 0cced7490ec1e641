//! Target allocations produced by strategies.

use crate::domain::price::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Signed target fraction of total equity for one asset at one timestamp.
///
/// Allocations are rebalancing instructions: a position persists until a
/// later allocation for the same asset changes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub timestamp: Timestamp,
    pub asset: String,
    pub weight: f64,
}

impl Allocation {
    pub fn new(timestamp: Timestamp, asset: &str, weight: f64) -> Self {
        Allocation {
            timestamp,
            asset: asset.to_string(),
            weight,
        }
    }
}

/// Group allocations by timestamp, keeping input order within a timestamp.
pub fn schedule(allocations: &[Allocation]) -> BTreeMap<Timestamp, Vec<(String, f64)>> {
    let mut by_time: BTreeMap<Timestamp, Vec<(String, f64)>> = BTreeMap::new();
    for a in allocations {
        by_time
            .entry(a.timestamp)
            .or_default()
            .push((a.asset.clone(), a.weight));
    }
    by_time
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 2, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn schedule_groups_and_orders() {
        let allocations = vec![
            Allocation::new(ts(3), "OIL", -0.2),
            Allocation::new(ts(1), "GOLD", 0.5),
            Allocation::new(ts(3), "GOLD", 0.1),
        ];
        let grouped = schedule(&allocations);

        let keys: Vec<Timestamp> = grouped.keys().copied().collect();
        assert_eq!(keys, vec![ts(1), ts(3)]);
        assert_eq!(
            grouped[&ts(3)],
            vec![("OIL".to_string(), -0.2), ("GOLD".to_string(), 0.1)]
        );
    }

    #[test]
    fn schedule_empty() {
        assert!(schedule(&[]).is_empty());
    }
}
