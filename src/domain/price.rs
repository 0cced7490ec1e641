//! Close-price table and unified timeline.

use crate::domain::error::FoldtraderError;
use crate::domain::splitter::TimeRange;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};

/// Point in time of a price or signal observation. Daily data uses midnight.
pub type Timestamp = NaiveDateTime;

/// Parse `%Y-%m-%d %H:%M:%S`, `%Y-%m-%dT%H:%M:%S` or a bare `%Y-%m-%d` (midnight).
pub fn parse_timestamp(value: &str) -> Option<Timestamp> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// One close observation for one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub timestamp: Timestamp,
    pub asset: String,
    pub close: f64,
}

/// Close prices keyed by (timestamp, asset) on a unified ascending timeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    timestamps: Vec<Timestamp>,
    rows: Vec<HashMap<String, f64>>,
}

impl PriceTable {
    /// Build a table from bars.
    ///
    /// Bars of one asset must appear in strictly ascending timestamp order and
    /// carry a finite positive close; anything else is structurally invalid.
    pub fn from_bars(bars: Vec<PriceBar>) -> Result<Self, FoldtraderError> {
        let mut last_seen: HashMap<String, Timestamp> = HashMap::new();
        let mut grid: BTreeMap<Timestamp, HashMap<String, f64>> = BTreeMap::new();

        for bar in bars {
            if !bar.close.is_finite() || bar.close <= 0.0 {
                return Err(FoldtraderError::invalid_input(format!(
                    "non-positive close {} for {} at {}",
                    bar.close, bar.asset, bar.timestamp
                )));
            }
            if let Some(prev) = last_seen.get(&bar.asset) {
                if bar.timestamp <= *prev {
                    return Err(FoldtraderError::invalid_input(format!(
                        "timestamps for {} are not strictly ascending ({} after {})",
                        bar.asset, bar.timestamp, prev
                    )));
                }
            }
            last_seen.insert(bar.asset.clone(), bar.timestamp);
            grid.entry(bar.timestamp)
                .or_default()
                .insert(bar.asset, bar.close);
        }

        let (timestamps, rows) = grid.into_iter().unzip();
        Ok(PriceTable { timestamps, rows })
    }

    /// Single-asset convenience constructor.
    pub fn from_series(asset: &str, series: &[(Timestamp, f64)]) -> Result<Self, FoldtraderError> {
        let bars = series
            .iter()
            .map(|&(timestamp, close)| PriceBar {
                timestamp,
                asset: asset.to_string(),
                close,
            })
            .collect();
        Self::from_bars(bars)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.last().copied()
    }

    /// Prices available at the `index`-th timestamp.
    pub fn row(&self, index: usize) -> &HashMap<String, f64> {
        &self.rows[index]
    }

    pub fn price(&self, timestamp: Timestamp, asset: &str) -> Option<f64> {
        let i = self.timestamps.binary_search(&timestamp).ok()?;
        self.rows[i].get(asset).copied()
    }

    pub fn assets(&self) -> Vec<String> {
        let mut assets: Vec<String> = self
            .rows
            .iter()
            .flat_map(|row| row.keys().cloned())
            .collect();
        assets.sort();
        assets.dedup();
        assets
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, &HashMap<String, f64>)> {
        self.timestamps.iter().copied().zip(self.rows.iter())
    }

    /// Rows whose timestamp falls inside the half-open `range`.
    pub fn slice(&self, range: &TimeRange) -> PriceTable {
        let lo = self.timestamps.partition_point(|t| *t < range.start);
        let hi = self.timestamps.partition_point(|t| *t < range.end);
        PriceTable {
            timestamps: self.timestamps[lo..hi].to_vec(),
            rows: self.rows[lo..hi].to_vec(),
        }
    }

    /// Copy of the table with one close replaced; missing timestamps are ignored.
    pub fn with_price(&self, timestamp: Timestamp, asset: &str, close: f64) -> PriceTable {
        let mut table = self.clone();
        if let Ok(i) = table.timestamps.binary_search(&timestamp) {
            table.rows[i].insert(asset.to_string(), close);
        }
        table
    }
}
