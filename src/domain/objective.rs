//! Objective functions over periodic return series.
//!
//! Every function is total: empty or degenerate input returns 0 rather than
//! NaN. Profit factor is the one deliberate exception and returns `+∞` when
//! there are profits and no losses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Annualization and benchmark settings shared by the ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveConfig {
    pub periods_per_year: f64,
    /// Annual risk-free rate.
    pub risk_free_rate: f64,
    /// Sortino downside threshold per period.
    pub target_return: f64,
    /// Rolling peak window for the Calmar drawdown.
    pub calmar_window: usize,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        ObjectiveConfig {
            periods_per_year: TRADING_DAYS_PER_YEAR,
            risk_free_rate: 0.0,
            target_return: 0.0,
            calmar_window: 252,
        }
    }
}

/// Quantity the hyperparameter search maximizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Objective {
    #[default]
    Sharpe,
    Sortino,
    Calmar,
    ProfitFactor,
    TotalReturn,
}

impl Objective {
    pub fn score(self, returns: &[f64], config: &ObjectiveConfig) -> f64 {
        match self {
            Objective::Sharpe => sharpe_ratio(returns, config.risk_free_rate, config.periods_per_year),
            Objective::Sortino => sortino_ratio(
                returns,
                config.risk_free_rate,
                config.target_return,
                config.periods_per_year,
            ),
            Objective::Calmar => calmar_ratio(returns, config.calmar_window, config.periods_per_year),
            Objective::ProfitFactor => profit_factor(returns),
            Objective::TotalReturn => total_return(returns),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Objective::Sharpe => "sharpe",
            Objective::Sortino => "sortino",
            Objective::Calmar => "calmar",
            Objective::ProfitFactor => "profit_factor",
            Objective::TotalReturn => "total_return",
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Objective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sharpe" => Ok(Objective::Sharpe),
            "sortino" => Ok(Objective::Sortino),
            "calmar" => Ok(Objective::Calmar),
            "profit_factor" | "profit-factor" => Ok(Objective::ProfitFactor),
            "total_return" | "return" => Ok(Objective::TotalReturn),
            other => Err(format!("unknown objective '{other}'")),
        }
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; 0 for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    let std = sample_std(returns);
    if returns.is_empty() || std == 0.0 {
        return 0.0;
    }
    let excess = mean(returns) - risk_free_rate / periods_per_year;
    finite_or_zero(periods_per_year.sqrt() * excess / std)
}

pub fn sortino_ratio(
    returns: &[f64],
    risk_free_rate: f64,
    target_return: f64,
    periods_per_year: f64,
) -> f64 {
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < target_return).collect();
    let downside_std = sample_std(&downside);
    if downside_std == 0.0 {
        return 0.0;
    }
    let excess = mean(returns) - risk_free_rate / periods_per_year;
    finite_or_zero(periods_per_year.sqrt() * excess / downside_std)
}

/// Largest fractional drop of the compounded curve below its rolling peak
/// over the trailing `window` periods (the peak includes the current point).
pub fn max_drawdown(returns: &[f64], window: usize) -> f64 {
    let window = window.max(1);
    let mut curve = Vec::with_capacity(returns.len());
    let mut level = 1.0;
    for r in returns {
        level *= 1.0 + r;
        curve.push(level);
    }

    let mut worst = 0.0_f64;
    for i in 0..curve.len() {
        let from = (i + 1).saturating_sub(window);
        let peak = curve[from..=i].iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if peak > 0.0 {
            worst = worst.max((peak - curve[i]) / peak);
        }
    }
    finite_or_zero(worst)
}

pub fn calmar_ratio(returns: &[f64], window: usize, periods_per_year: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let dd = max_drawdown(returns, window);
    if dd == 0.0 {
        return 0.0;
    }
    finite_or_zero(mean(returns) * periods_per_year / dd)
}

/// Gross profit over gross loss.
pub fn profit_factor(returns: &[f64]) -> f64 {
    let gross_profit: f64 = returns.iter().filter(|r| **r > 0.0).sum();
    let gross_loss: f64 = returns.iter().filter(|r| **r < 0.0).sum::<f64>().abs();
    if gross_loss == 0.0 {
        return if gross_profit > 0.0 { f64::INFINITY } else { 0.0 };
    }
    finite_or_zero(gross_profit / gross_loss)
}

/// Compounded return of the series.
pub fn total_return(returns: &[f64]) -> f64 {
    finite_or_zero(returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sharpe_of_zero_returns_is_zero() {
        assert_eq!(sharpe_ratio(&[0.0; 50], 0.0, 252.0), 0.0);
    }

    #[test]
    fn sharpe_of_empty_and_single_is_zero() {
        assert_eq!(sharpe_ratio(&[], 0.0, 252.0), 0.0);
        assert_eq!(sharpe_ratio(&[0.01], 0.0, 252.0), 0.0);
    }

    #[test]
    fn sharpe_matches_formula() {
        let r = [0.01, -0.005, 0.02, 0.0, 0.003];
        let m = r.iter().sum::<f64>() / 5.0;
        let sd = (r.iter().map(|x| (x - m).powi(2)).sum::<f64>() / 4.0).sqrt();
        assert_relative_eq!(sharpe_ratio(&r, 0.0, 252.0), 252f64.sqrt() * m / sd, epsilon = 1e-12);
    }

    #[test]
    fn sharpe_subtracts_risk_free_per_period() {
        let r = [0.01, 0.02, 0.015, 0.005];
        assert!(sharpe_ratio(&r, 0.5, 252.0) < sharpe_ratio(&r, 0.0, 252.0));
    }

    #[test]
    fn sortino_without_downside_is_zero() {
        assert_eq!(sortino_ratio(&[0.01, 0.02, 0.03], 0.0, 0.0, 252.0), 0.0);
        // A single downside sample has no sample deviation.
        assert_eq!(sortino_ratio(&[0.01, -0.02, 0.03], 0.0, 0.0, 252.0), 0.0);
    }

    #[test]
    fn sortino_uses_downside_deviation() {
        let r = [0.02, -0.01, 0.03, -0.03, 0.01];
        let downside = [-0.01, -0.03];
        let expected = 252f64.sqrt() * (0.02 / 5.0) / sample_std(&downside);
        assert_relative_eq!(sortino_ratio(&r, 0.0, 0.0, 252.0), expected, epsilon = 1e-12);
    }

    #[test]
    fn max_drawdown_of_compounded_curve() {
        // Curve: 1.1, 0.88, 0.968
        let dd = max_drawdown(&[0.1, -0.2, 0.1], 252);
        assert_relative_eq!(dd, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn max_drawdown_rolling_window_forgets_old_peaks() {
        // Peak at 1.5 then a slow grind down; a window of one sees no drawdown.
        let r = [0.5, -0.1, -0.1];
        assert_eq!(max_drawdown(&r, 1), 0.0);
        assert!(max_drawdown(&r, 3) > 0.18);
    }

    #[test]
    fn calmar_zero_without_drawdown() {
        assert_eq!(calmar_ratio(&[0.01, 0.02], 252, 252.0), 0.0);
        assert_eq!(calmar_ratio(&[], 252, 252.0), 0.0);
    }

    #[test]
    fn calmar_matches_formula() {
        let r = [0.05, -0.02, 0.03];
        let expected = (0.06 / 3.0) * 252.0 / 0.02;
        assert_relative_eq!(calmar_ratio(&r, 252, 252.0), expected, epsilon = 1e-9);
    }

    #[test]
    fn profit_factor_degenerate_cases() {
        assert_eq!(profit_factor(&[0.01, 0.02]), f64::INFINITY);
        assert_eq!(profit_factor(&[0.0, 0.0]), 0.0);
        assert_eq!(profit_factor(&[]), 0.0);
        assert_eq!(profit_factor(&[-0.01]), 0.0);
    }

    #[test]
    fn profit_factor_ratio() {
        assert_relative_eq!(profit_factor(&[0.03, -0.01, 0.03, -0.02]), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn total_return_compounds() {
        assert_relative_eq!(total_return(&[0.1, 0.1]), 0.21, epsilon = 1e-12);
        assert_eq!(total_return(&[]), 0.0);
    }

    #[test]
    fn objective_dispatch_and_parse() {
        let r = [0.01, -0.01, 0.02];
        let config = ObjectiveConfig::default();
        assert_eq!(Objective::ProfitFactor.score(&r, &config), profit_factor(&r));
        assert_eq!("Calmar".parse::<Objective>(), Ok(Objective::Calmar));
        assert_eq!("profit-factor".parse::<Objective>(), Ok(Objective::ProfitFactor));
        assert!("omega".parse::<Objective>().is_err());
        assert_eq!(Objective::TotalReturn.to_string(), "total_return");
    }

    #[test]
    fn results_are_never_nan() {
        let cases: [&[f64]; 4] = [&[], &[0.0], &[f64::NAN, 0.01], &[1e308, 1e308]];
        let config = ObjectiveConfig::default();
        for r in cases {
            for obj in [
                Objective::Sharpe,
                Objective::Sortino,
                Objective::Calmar,
                Objective::ProfitFactor,
                Objective::TotalReturn,
            ] {
                assert!(!obj.score(r, &config).is_nan(), "{obj} on {r:?}");
            }
        }
    }
}
