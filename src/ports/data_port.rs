//! Data access port trait.

use crate::domain::allocation::Allocation;
use crate::domain::error::FoldtraderError;
use crate::domain::price::PriceTable;
use crate::domain::signal::Signal;

/// Source of the read-only inputs of a run. `source` names a table the
/// adapter knows how to locate (a file name for file-backed adapters).
pub trait DataPort {
    fn fetch_prices(&self, source: &str) -> Result<PriceTable, FoldtraderError>;

    fn fetch_signals(&self, source: &str) -> Result<Vec<Signal>, FoldtraderError>;

    fn fetch_allocations(&self, source: &str) -> Result<Vec<Allocation>, FoldtraderError>;
}
