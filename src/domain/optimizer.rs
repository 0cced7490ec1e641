//! Per-window hyperparameter optimization.
//!
//! Every trial builds a strategy from suggested parameters, backtests it on
//! the training slice with frictionless execution and scores the returns.
//! A failed trial scores `-inf` and never aborts the search.

use crate::domain::backtest::BacktestEngine;
use crate::domain::error::{FoldtraderError, TrialFailure};
use crate::domain::execution::ExecutionConfig;
use crate::domain::objective::{Objective, ObjectiveConfig};
use crate::domain::params::{ParamSet, ParamSpace, format_params};
use crate::domain::price::PriceTable;
use crate::domain::risk::RiskGovernor;
use crate::domain::search::SearchKind;
use crate::domain::signal::Signal;
use crate::domain::strategy::StrategyKind;
use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub type TrialOutcome = Result<f64, TrialFailure>;

/// Limits on one search: trial count, wall-clock deadline, external cancel.
#[derive(Debug, Clone, Default)]
pub struct SearchBudget {
    pub max_trials: usize,
    pub deadline: Option<Instant>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl SearchBudget {
    pub fn trials(max_trials: usize) -> Self {
        SearchBudget {
            max_trials,
            deadline: None,
            cancel: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_time_limit(self, limit: Duration) -> Self {
        self.with_deadline(Instant::now() + limit)
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn stop_reason(&self, trials_run: usize) -> Option<&'static str> {
        if trials_run >= self.max_trials {
            return Some("trial budget reached");
        }
        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            return Some("cancelled");
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some("deadline passed");
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    pub index: usize,
    pub params: ParamSet,
    pub outcome: TrialOutcome,
}

impl TrialRecord {
    /// Score used for ranking; failures rank as `-inf`.
    pub fn score(&self) -> f64 {
        self.outcome.as_ref().copied().unwrap_or(f64::NEG_INFINITY)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOutcome {
    pub best_params: ParamSet,
    pub best_score: f64,
    pub trials: Vec<TrialRecord>,
}

impl OptimizationOutcome {
    pub fn completed_trials(&self) -> usize {
        self.trials.iter().filter(|t| t.outcome.is_ok()).count()
    }

    pub fn failed_trials(&self) -> usize {
        self.trials.len() - self.completed_trials()
    }

    /// True when at least one trial produced a score.
    pub fn has_completed_trial(&self) -> bool {
        self.trials.iter().any(|t| t.outcome.is_ok())
    }
}

#[derive(Debug, Clone)]
pub struct StrategyOptimizer {
    engine: BacktestEngine,
    objective: Objective,
    objective_config: ObjectiveConfig,
    search: SearchKind,
    fixed_params: ParamSet,
}

impl StrategyOptimizer {
    pub fn new(
        initial_capital: f64,
        objective: Objective,
        objective_config: ObjectiveConfig,
    ) -> Result<Self, FoldtraderError> {
        Ok(StrategyOptimizer {
            engine: BacktestEngine::new(initial_capital, ExecutionConfig::frictionless())?,
            objective,
            objective_config,
            search: SearchKind::default(),
            fixed_params: ParamSet::new(),
        })
    }

    pub fn with_search(mut self, search: SearchKind) -> Self {
        self.search = search;
        self
    }

    /// Apply the same risk governance used out of sample.
    pub fn with_risk(mut self, governor: RiskGovernor) -> Self {
        self.engine = self.engine.with_risk(governor);
        self
    }

    /// Parameters passed to every trial; sampled values override them.
    pub fn with_fixed_params(mut self, fixed_params: ParamSet) -> Self {
        self.fixed_params = fixed_params;
        self
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn objective_config(&self) -> &ObjectiveConfig {
        &self.objective_config
    }

    pub fn fixed_params(&self) -> &ParamSet {
        &self.fixed_params
    }

    /// Fixed parameters overlaid with `params`.
    pub fn merged_params(&self, params: &ParamSet) -> ParamSet {
        let mut merged = self.fixed_params.clone();
        merged.extend(params.iter().map(|(k, v)| (k.clone(), *v)));
        merged
    }

    /// Score one parameter set on `prices` and `signals`.
    ///
    /// A strategy that abstains runs a flat, cash-only curve.
    pub fn evaluate(
        &self,
        kind: StrategyKind,
        params: &ParamSet,
        prices: &PriceTable,
        signals: &[Signal],
    ) -> TrialOutcome {
        let strategy = kind.build(&self.merged_params(params))?;
        let allocations = strategy.generate_allocations(signals);
        let result = self.engine.run(prices, &allocations);
        if result.states.len() < 2 {
            return Err(TrialFailure::EmptyEquityCurve);
        }

        let score = self.objective.score(&result.returns(), &self.objective_config);
        if score.is_nan() || score == f64::NEG_INFINITY {
            return Err(TrialFailure::NonFiniteScore);
        }
        Ok(score)
    }

    /// Search `space` within `budget`; `None` when no trial ran.
    ///
    /// The best trial is the highest score, the earliest one on ties. If
    /// every trial failed the first trial is reported with a `-inf` score.
    pub fn optimize(
        &self,
        kind: StrategyKind,
        space: &ParamSpace,
        budget: &SearchBudget,
        seed: u64,
        prices: &PriceTable,
        signals: &[Signal],
    ) -> Option<OptimizationOutcome> {
        let mut search = self.search.build(seed);
        let mut trials: Vec<TrialRecord> = Vec::new();
        let mut best: Option<usize> = None;

        loop {
            if let Some(reason) = budget.stop_reason(trials.len()) {
                if trials.len() < budget.max_trials {
                    debug!("search stopped after {} trials: {}", trials.len(), reason);
                }
                break;
            }
            let Some(params) = search.suggest(space) else {
                debug!("search space exhausted after {} trials", trials.len());
                break;
            };

            let index = trials.len();
            let outcome = self.evaluate(kind, &params, prices, signals);
            match &outcome {
                Ok(score) => debug!("trial {index} [{}] -> {score:.4}", format_params(&params)),
                Err(e) => warn!("trial {index} [{}] failed: {e}", format_params(&params)),
            }

            let record = TrialRecord {
                index,
                params,
                outcome,
            };
            search.observe(&record.params, record.score());
            let improves = match best {
                None => true,
                Some(b) => record.score() > trials[b].score(),
            };
            if improves {
                best = Some(index);
            }
            trials.push(record);
        }

        let best = trials.get(best?)?;
        let (best_params, best_score) = (best.params.clone(), best.score());
        Some(OptimizationOutcome {
            best_params,
            best_score,
            trials,
        })
    }
}
