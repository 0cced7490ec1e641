//! Walk-forward optimization across sequential folds.
//!
//! For every fold the optimizer only sees the training slice of prices and
//! signals. The winning parameters are then run once over the test slice
//! with realistic frictions, and the out-of-sample record is emitted.

use crate::domain::backtest::BacktestEngine;
use crate::domain::error::FoldtraderError;
use crate::domain::objective::{self, ObjectiveConfig};
use crate::domain::optimizer::{SearchBudget, StrategyOptimizer};
use crate::domain::params::{ParamSet, ParamSpace, format_params};
use crate::domain::price::PriceTable;
use crate::domain::signal::{Signal, signals_in_range};
use crate::domain::splitter::{Fold, TimeRange, TimeSplitter};
use crate::domain::strategy::StrategyKind;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoldStatus {
    Completed,
    Skipped(String),
}

impl fmt::Display for FoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FoldStatus::Completed => f.write_str("completed"),
            FoldStatus::Skipped(reason) => write!(f, "skipped: {reason}"),
        }
    }
}

/// Out-of-sample record of one fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold_index: usize,
    pub train_window: TimeRange,
    pub test_window: TimeRange,
    pub oos_sharpe: f64,
    /// Compounded return over the test window.
    pub oos_return: f64,
    pub best_params: ParamSet,
    /// Best training objective value.
    pub in_sample_score: f64,
    pub trade_count: usize,
    pub status: FoldStatus,
}

impl FoldResult {
    fn skipped(fold: &Fold, reason: String) -> Self {
        warn!("fold {} skipped: {}", fold.index, reason);
        FoldResult {
            fold_index: fold.index,
            train_window: fold.train,
            test_window: fold.test,
            oos_sharpe: 0.0,
            oos_return: 0.0,
            best_params: ParamSet::new(),
            in_sample_score: 0.0,
            trade_count: 0,
            status: FoldStatus::Skipped(reason),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == FoldStatus::Completed
    }
}

#[derive(Debug, Clone)]
pub struct WalkForwardOptimizer {
    splitter: TimeSplitter,
    strategy: StrategyKind,
    optimizer: StrategyOptimizer,
    test_engine: BacktestEngine,
    oos_config: ObjectiveConfig,
    seed: u64,
    parallel: bool,
    min_train_points: usize,
    min_test_points: usize,
    time_limit: Option<Duration>,
    cancel: Option<Arc<AtomicBool>>,
}

impl WalkForwardOptimizer {
    /// `test_engine` carries the realistic execution costs (and risk
    /// governance) used out of sample; `optimizer` runs frictionless.
    pub fn new(
        splitter: TimeSplitter,
        strategy: StrategyKind,
        optimizer: StrategyOptimizer,
        test_engine: BacktestEngine,
    ) -> Self {
        let oos_config = *optimizer.objective_config();
        WalkForwardOptimizer {
            splitter,
            strategy,
            optimizer,
            test_engine,
            oos_config,
            seed: 0,
            parallel: false,
            min_train_points: 2,
            min_test_points: 2,
            time_limit: None,
            cancel: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_min_points(mut self, train: usize, test: usize) -> Self {
        self.min_train_points = train;
        self.min_test_points = test;
        self
    }

    /// Wall-clock limit for each fold's search.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Flag checked before every trial of every fold.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn splitter(&self) -> &TimeSplitter {
        &self.splitter
    }

    /// Optimize and validate every fold, returned in chronological order.
    ///
    /// Fails only on a structurally invalid price index.
    pub fn run(
        &self,
        prices: &PriceTable,
        signals: &[Signal],
        space: &ParamSpace,
        n_trials: usize,
    ) -> Result<Vec<FoldResult>, FoldtraderError> {
        let folds: Vec<Fold> = self.splitter.split(prices.timestamps())?.collect();
        info!(
            "walk-forward: {} folds, {} trials each, strategy {}",
            folds.len(),
            n_trials,
            self.strategy
        );

        let results: Vec<FoldResult> = if self.parallel {
            folds
                .par_iter()
                .map(|fold| self.run_fold(fold, prices, signals, space, n_trials))
                .collect()
        } else {
            folds
                .iter()
                .map(|fold| self.run_fold(fold, prices, signals, space, n_trials))
                .collect()
        };
        Ok(results)
    }

    fn budget(&self, n_trials: usize) -> SearchBudget {
        let mut budget = SearchBudget::trials(n_trials);
        if let Some(limit) = self.time_limit {
            budget = budget.with_time_limit(limit);
        }
        if let Some(cancel) = &self.cancel {
            budget = budget.with_cancel(Arc::clone(cancel));
        }
        budget
    }

    fn run_fold(
        &self,
        fold: &Fold,
        prices: &PriceTable,
        signals: &[Signal],
        space: &ParamSpace,
        n_trials: usize,
    ) -> FoldResult {
        let train_prices = prices.slice(&fold.train);
        let test_prices = prices.slice(&fold.test);
        if train_prices.len() < self.min_train_points {
            return FoldResult::skipped(
                fold,
                format!(
                    "{} train points, need {}",
                    train_prices.len(),
                    self.min_train_points
                ),
            );
        }
        if test_prices.len() < self.min_test_points {
            return FoldResult::skipped(
                fold,
                format!(
                    "{} test points, need {}",
                    test_prices.len(),
                    self.min_test_points
                ),
            );
        }

        let train_signals = signals_in_range(signals, &fold.train);
        if train_signals.is_empty() {
            return FoldResult::skipped(fold, "no train signals".to_string());
        }

        let seed = self.seed.wrapping_add(fold.index as u64);
        let Some(outcome) = self.optimizer.optimize(
            self.strategy,
            space,
            &self.budget(n_trials),
            seed,
            &train_prices,
            &train_signals,
        ) else {
            return FoldResult::skipped(fold, "no trial ran".to_string());
        };
        if !outcome.has_completed_trial() {
            return FoldResult::skipped(
                fold,
                format!("all {} trials failed", outcome.trials.len()),
            );
        }

        let strategy = match self
            .strategy
            .build(&self.optimizer.merged_params(&outcome.best_params))
        {
            Ok(strategy) => strategy,
            Err(e) => return FoldResult::skipped(fold, e.to_string()),
        };
        let test_signals = signals_in_range(signals, &fold.test);
        let allocations = strategy.generate_allocations(&test_signals);
        let result = self.test_engine.run(&test_prices, &allocations);

        let returns = result.returns();
        let oos_sharpe = objective::sharpe_ratio(
            &returns,
            self.oos_config.risk_free_rate,
            self.oos_config.periods_per_year,
        );
        let oos_return = objective::total_return(&returns);

        info!(
            "fold {} train {} test {}: best [{}] in-sample {:.4}, oos sharpe {:.4}, oos return {:.4}",
            fold.index,
            fold.train,
            fold.test,
            format_params(&outcome.best_params),
            outcome.best_score,
            oos_sharpe,
            oos_return
        );

        FoldResult {
            fold_index: fold.index,
            train_window: fold.train,
            test_window: fold.test,
            oos_sharpe,
            oos_return,
            best_params: outcome.best_params,
            in_sample_score: outcome.best_score,
            trade_count: result.trades.len(),
            status: FoldStatus::Completed,
        }
    }
}
