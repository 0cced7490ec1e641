//! Report output port trait.

use crate::domain::aggregate::WfoSummary;
use crate::domain::error::FoldtraderError;
use crate::domain::params::ParamSet;
use crate::domain::portfolio::{PortfolioState, Trade};
use crate::domain::walk_forward::FoldResult;
use std::path::Path;

/// Port for persisting run results.
pub trait ReportPort {
    fn write_states(&self, states: &[PortfolioState], path: &Path) -> Result<(), FoldtraderError>;

    fn write_trades(&self, trades: &[Trade], path: &Path) -> Result<(), FoldtraderError>;

    fn write_folds(&self, folds: &[FoldResult], path: &Path) -> Result<(), FoldtraderError>;

    /// `params` is the parameter set carried forward from the latest fold.
    fn write_summary(
        &self,
        summary: &WfoSummary,
        params: Option<&ParamSet>,
        path: &Path,
    ) -> Result<(), FoldtraderError>;
}
