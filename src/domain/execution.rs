//! Trade execution and fill simulation.
//!
//! Rebalances move one asset towards a target notional at the same
//! timestamp's close, adjusted by slippage, and charge a proportional
//! commission.

use crate::domain::error::FoldtraderError;
use crate::domain::portfolio::{Portfolio, Trade};
use crate::domain::price::Timestamp;

/// Quantities below this magnitude are applied but not logged as trades.
pub const DEFAULT_DUST_THRESHOLD: f64 = 1e-4;

/// Execution frictions. Rates are fractions (10 bps = 0.001).
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub commission_rate: f64,
    pub slippage_rate: f64,
    pub dust_threshold: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig::frictionless()
    }
}

impl ExecutionConfig {
    /// Convert integer basis points to rates.
    pub fn from_bps(commission_bps: u32, slippage_bps: u32) -> Self {
        ExecutionConfig {
            commission_rate: commission_bps as f64 / 10_000.0,
            slippage_rate: slippage_bps as f64 / 10_000.0,
            dust_threshold: DEFAULT_DUST_THRESHOLD,
        }
    }

    pub fn frictionless() -> Self {
        ExecutionConfig {
            commission_rate: 0.0,
            slippage_rate: 0.0,
            dust_threshold: DEFAULT_DUST_THRESHOLD,
        }
    }

    pub fn with_dust_threshold(mut self, dust_threshold: f64) -> Self {
        self.dust_threshold = dust_threshold;
        self
    }

    pub fn validate(&self) -> Result<(), FoldtraderError> {
        if !(self.commission_rate >= 0.0 && self.commission_rate.is_finite()) {
            return Err(FoldtraderError::config_invalid(
                "backtest",
                "commission_bps",
                "commission must be non-negative",
            ));
        }
        if !(self.slippage_rate >= 0.0 && self.slippage_rate < 1.0) {
            return Err(FoldtraderError::config_invalid(
                "backtest",
                "slippage_bps",
                "slippage must be in [0, 10000) bps",
            ));
        }
        if !(self.dust_threshold >= 0.0 && self.dust_threshold.is_finite()) {
            return Err(FoldtraderError::config_invalid(
                "backtest",
                "dust_threshold",
                "dust_threshold must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Commission on a traded notional.
pub fn calculate_commission(notional: f64, config: &ExecutionConfig) -> f64 {
    notional.abs() * config.commission_rate
}

/// Buying fills above the market, selling below it.
pub fn apply_slippage(market_price: f64, diff_value: f64, slippage_rate: f64) -> f64 {
    if diff_value > 0.0 {
        market_price * (1.0 + slippage_rate)
    } else if diff_value < 0.0 {
        market_price * (1.0 - slippage_rate)
    } else {
        market_price
    }
}

/// Move `asset` to `target_value` at `market_price`.
///
/// Cash is debited by the notional difference plus commission and the
/// position grows by `diff / execution_price`. Returns the trade record when
/// the traded quantity is at least the dust threshold.
pub fn rebalance_asset(
    portfolio: &mut Portfolio,
    timestamp: Timestamp,
    asset: &str,
    target_value: f64,
    market_price: f64,
    config: &ExecutionConfig,
) -> Option<Trade> {
    let current_value = portfolio.quantity(asset) * market_price;
    let diff = target_value - current_value;
    if diff == 0.0 {
        return None;
    }

    let execution_price = apply_slippage(market_price, diff, config.slippage_rate);
    let quantity = diff / execution_price;
    let commission = calculate_commission(diff, config);

    portfolio.cash -= diff + commission;
    portfolio.adjust_position(asset, quantity);

    if quantity.abs() < config.dust_threshold {
        return None;
    }

    Some(Trade {
        timestamp,
        asset: asset.to_string(),
        quantity,
        execution_price,
        cost: commission,
        direction: if quantity > 0.0 { 1 } else { -1 },
    })
}
