//! Portfolio ledger, state snapshots and trade records.

use crate::domain::price::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Pre-trade snapshot at one timestamp.
///
/// `equity == cash + Σ quantity * price` using that timestamp's marks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub timestamp: Timestamp,
    pub cash: f64,
    pub positions: BTreeMap<String, f64>,
    pub equity: f64,
}

/// A position change executed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: Timestamp,
    pub asset: String,
    /// Signed quantity: positive buys, negative sells.
    pub quantity: f64,
    pub execution_price: f64,
    /// Commission paid.
    pub cost: f64,
    /// +1 for buys, -1 for sells.
    pub direction: i8,
}

/// Mutable cash/position ledger owned by a single backtest run.
#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: BTreeMap<String, f64>,
    last_marks: HashMap<String, f64>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            positions: BTreeMap::new(),
            last_marks: HashMap::new(),
        }
    }

    pub fn quantity(&self, asset: &str) -> f64 {
        self.positions.get(asset).copied().unwrap_or(0.0)
    }

    pub fn adjust_position(&mut self, asset: &str, delta: f64) {
        *self.positions.entry(asset.to_string()).or_insert(0.0) += delta;
    }

    /// Latest known price for `asset`, if it has ever been marked.
    pub fn mark(&self, asset: &str) -> Option<f64> {
        self.last_marks.get(asset).copied()
    }

    /// Record the prices available now; unpriced holdings keep their last mark.
    pub fn update_marks(&mut self, price_map: &HashMap<String, f64>) {
        for (asset, &price) in price_map {
            self.last_marks.insert(asset.clone(), price);
        }
    }

    pub fn position_value(&self, asset: &str) -> f64 {
        match self.mark(asset) {
            Some(price) => self.quantity(asset) * price,
            None => 0.0,
        }
    }

    /// Sum of absolute position values at the latest marks.
    pub fn gross_exposure(&self) -> f64 {
        self.positions
            .keys()
            .map(|asset| self.position_value(asset).abs())
            .sum()
    }

    pub fn total_equity(&self) -> f64 {
        let position_value: f64 = self
            .positions
            .keys()
            .map(|asset| self.position_value(asset))
            .sum();
        self.cash + position_value
    }

    pub fn snapshot(&self, timestamp: Timestamp) -> PortfolioState {
        PortfolioState {
            timestamp,
            cash: self.cash,
            positions: self.positions.clone(),
            equity: self.total_equity(),
        }
    }
}
