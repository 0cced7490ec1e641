//! Cross-fold summary of walk-forward results.

use crate::domain::objective::sample_std;
use crate::domain::params::ParamSet;
use crate::domain::walk_forward::FoldResult;
use serde::{Deserialize, Serialize};

/// Added to the deviation so a perfectly stable Sharpe does not divide by zero.
pub const ROBUSTNESS_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WfoSummary {
    pub fold_count: usize,
    pub completed_folds: usize,
    pub mean_oos_sharpe: f64,
    pub median_oos_sharpe: f64,
    pub min_oos_sharpe: f64,
    pub std_oos_sharpe: f64,
    pub mean_oos_return: f64,
    /// Sum of per-fold returns.
    pub total_oos_return: f64,
    pub robustness_score: f64,
    pub total_trades: usize,
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Summarize every fold, skipped ones included at zero performance.
///
/// Returns `None` for an empty input.
pub fn aggregate(folds: &[FoldResult]) -> Option<WfoSummary> {
    if folds.is_empty() {
        return None;
    }
    let n = folds.len() as f64;
    let sharpes: Vec<f64> = folds.iter().map(|f| f.oos_sharpe).collect();
    let returns: Vec<f64> = folds.iter().map(|f| f.oos_return).collect();

    let mean_oos_sharpe = sharpes.iter().sum::<f64>() / n;
    let std_oos_sharpe = sample_std(&sharpes);
    let total_oos_return: f64 = returns.iter().sum();

    Some(WfoSummary {
        fold_count: folds.len(),
        completed_folds: folds.iter().filter(|f| f.is_completed()).count(),
        mean_oos_sharpe,
        median_oos_sharpe: median(&sharpes),
        min_oos_sharpe: sharpes.iter().copied().fold(f64::INFINITY, f64::min),
        std_oos_sharpe,
        mean_oos_return: total_oos_return / n,
        total_oos_return,
        robustness_score: mean_oos_sharpe / (std_oos_sharpe + ROBUSTNESS_EPSILON),
        total_trades: folds.iter().map(|f| f.trade_count).sum(),
    })
}

/// Parameters of the most recent fold that produced any.
pub fn best_params_across_folds(folds: &[FoldResult]) -> Option<ParamSet> {
    folds
        .iter()
        .filter(|f| f.is_completed() && !f.best_params.is_empty())
        .max_by_key(|f| f.fold_index)
        .map(|f| f.best_params.clone())
}
