//! Backtest engine and event loop.
//!
//! One pass over the price timeline: mark to market, record the pre-trade
//! state, then rebalance towards any allocations scheduled for that timestamp.
//! Every fill uses the same timestamp's close, never a later one.

use crate::domain::allocation::{self, Allocation};
use crate::domain::error::FoldtraderError;
use crate::domain::execution::{self, ExecutionConfig};
use crate::domain::objective;
use crate::domain::portfolio::{Portfolio, PortfolioState, Trade};
use crate::domain::price::PriceTable;
use crate::domain::risk::RiskGovernor;
use log::warn;
use serde::{Deserialize, Serialize};

/// States and trades of one run; owned by the caller, never shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub initial_capital: f64,
    pub states: Vec<PortfolioState>,
    pub trades: Vec<Trade>,
    /// Allocation entries skipped because the asset had no price.
    pub skipped_rebalances: usize,
    /// Allocation timestamps with no price row, never executed.
    pub unpriced_timestamps: usize,
    /// Rebalances forced flat by the risk governor.
    pub risk_freezes: usize,
}

impl BacktestResult {
    pub fn equity_curve(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.equity).collect()
    }

    /// Simple returns between consecutive states.
    pub fn returns(&self) -> Vec<f64> {
        self.states
            .windows(2)
            .map(|w| {
                let prev = w[0].equity;
                if prev > 0.0 {
                    w[1].equity / prev - 1.0
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Equity of the last recorded state, or the initial capital.
    pub fn final_equity(&self) -> f64 {
        self.states
            .last()
            .map(|s| s.equity)
            .unwrap_or(self.initial_capital)
    }

    pub fn total_return(&self) -> f64 {
        objective::total_return(&self.returns())
    }
}

#[derive(Debug, Clone)]
pub struct BacktestEngine {
    initial_capital: f64,
    execution: ExecutionConfig,
    risk: Option<RiskGovernor>,
}

impl BacktestEngine {
    pub fn new(initial_capital: f64, execution: ExecutionConfig) -> Result<Self, FoldtraderError> {
        if !(initial_capital > 0.0 && initial_capital.is_finite()) {
            return Err(FoldtraderError::config_invalid(
                "backtest",
                "initial_capital",
                "initial_capital must be positive",
            ));
        }
        execution.validate()?;
        Ok(BacktestEngine {
            initial_capital,
            execution,
            risk: None,
        })
    }

    /// Route every rebalance through `governor`; each run starts from a fresh copy.
    pub fn with_risk(mut self, governor: RiskGovernor) -> Self {
        self.risk = Some(governor);
        self
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn execution(&self) -> &ExecutionConfig {
        &self.execution
    }

    pub fn run(&self, prices: &PriceTable, allocations: &[Allocation]) -> BacktestResult {
        let schedule = allocation::schedule(allocations);
        let mut portfolio = Portfolio::new(self.initial_capital);
        let mut governor = self.risk.clone();
        let mut states = Vec::with_capacity(prices.len());
        let mut trades = Vec::new();
        let mut skipped_rebalances = 0usize;

        for (timestamp, price_map) in prices.iter() {
            portfolio.update_marks(price_map);
            let state = portfolio.snapshot(timestamp);
            if let Some(g) = governor.as_mut() {
                g.observe(state.equity);
            }
            let equity = state.equity;
            states.push(state);

            let Some(targets) = schedule.get(&timestamp) else {
                continue;
            };

            let target_values: Vec<(String, f64)> = match governor.as_mut() {
                Some(g) => g.govern(&portfolio, targets),
                None => targets
                    .iter()
                    .map(|(asset, weight)| (asset.clone(), equity * weight))
                    .collect(),
            };

            for (asset, target_value) in target_values {
                let Some(&price) = price_map.get(&asset) else {
                    warn!("no price for {} at {}; skipping rebalance", asset, timestamp);
                    skipped_rebalances += 1;
                    continue;
                };
                if let Some(trade) = execution::rebalance_asset(
                    &mut portfolio,
                    timestamp,
                    &asset,
                    target_value,
                    price,
                    &self.execution,
                ) {
                    trades.push(trade);
                }
            }
        }

        let unpriced: Vec<_> = schedule
            .keys()
            .filter(|t| prices.timestamps().binary_search(t).is_err())
            .collect();
        if let Some(first) = unpriced.first() {
            warn!(
                "{} allocation timestamps have no matching price row and were ignored (first {})",
                unpriced.len(),
                first
            );
        }

        BacktestResult {
            initial_capital: self.initial_capital,
            states,
            trades,
            skipped_rebalances,
            unpriced_timestamps: unpriced.len(),
            risk_freezes: governor.map(|g| g.freezes()).unwrap_or(0),
        }
    }
}
