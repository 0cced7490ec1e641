//! CSV file data adapter.
//!
//! Reads long-format tables: one row per (timestamp, asset) observation.

use crate::domain::allocation::Allocation;
use crate::domain::error::FoldtraderError;
use crate::domain::price::{PriceBar, PriceTable, Timestamp, parse_timestamp};
use crate::domain::signal::Signal;
use crate::ports::data_port::DataPort;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct PriceRow {
    timestamp: String,
    asset: String,
    close: f64,
}

#[derive(Debug, Deserialize)]
struct SignalRow {
    timestamp: String,
    asset: String,
    direction: f64,
    probability: f64,
    horizon: u32,
    #[serde(default)]
    source: String,
}

#[derive(Debug, Deserialize)]
struct AllocationRow {
    timestamp: String,
    asset: String,
    weight: f64,
}

/// Resolves sources relative to `base_path`; absolute sources are used as is.
#[derive(Debug, Clone, Default)]
pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, source: &str) -> PathBuf {
        self.base_path.join(source)
    }

    fn read_rows<T: DeserializeOwned>(&self, source: &str) -> Result<Vec<(usize, T)>, FoldtraderError> {
        let path = self.csv_path(source);
        let content = fs::read_to_string(&path).map_err(|e| FoldtraderError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut rows = Vec::new();
        for (i, result) in rdr.deserialize::<T>().enumerate() {
            // Header is line 1.
            let line = i + 2;
            let row = result.map_err(|e| FoldtraderError::Data {
                reason: format!("{} line {}: {}", path.display(), line, e),
            })?;
            rows.push((line, row));
        }
        Ok(rows)
    }
}

fn timestamp_at(path: &Path, line: usize, raw: &str) -> Result<Timestamp, FoldtraderError> {
    parse_timestamp(raw).ok_or_else(|| FoldtraderError::Data {
        reason: format!("{} line {}: invalid timestamp '{}'", path.display(), line, raw),
    })
}

impl DataPort for CsvAdapter {
    fn fetch_prices(&self, source: &str) -> Result<PriceTable, FoldtraderError> {
        let path = self.csv_path(source);
        let bars = self
            .read_rows::<PriceRow>(source)?
            .into_iter()
            .map(|(line, row)| {
                Ok(PriceBar {
                    timestamp: timestamp_at(&path, line, &row.timestamp)?,
                    asset: row.asset,
                    close: row.close,
                })
            })
            .collect::<Result<Vec<_>, FoldtraderError>>()?;
        PriceTable::from_bars(bars)
    }

    fn fetch_signals(&self, source: &str) -> Result<Vec<Signal>, FoldtraderError> {
        let path = self.csv_path(source);
        self.read_rows::<SignalRow>(source)?
            .into_iter()
            .map(|(line, row)| {
                let timestamp = timestamp_at(&path, line, &row.timestamp)?;
                Signal::new(
                    timestamp,
                    &row.asset,
                    row.direction,
                    row.probability,
                    row.horizon,
                    &row.source,
                )
                .map_err(|e| FoldtraderError::Data {
                    reason: format!("{} line {}: {}", path.display(), line, e),
                })
            })
            .collect()
    }

    fn fetch_allocations(&self, source: &str) -> Result<Vec<Allocation>, FoldtraderError> {
        let path = self.csv_path(source);
        self.read_rows::<AllocationRow>(source)?
            .into_iter()
            .map(|(line, row)| {
                if !row.weight.is_finite() {
                    return Err(FoldtraderError::Data {
                        reason: format!("{} line {}: non-finite weight", path.display(), line),
                    });
                }
                let timestamp = timestamp_at(&path, line, &row.timestamp)?;
                Ok(Allocation::new(timestamp, &row.asset, row.weight))
            })
            .collect()
    }
}
