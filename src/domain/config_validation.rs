//! Configuration validation.
//!
//! Reads every section through a [`ConfigPort`], checks each field and builds
//! the typed settings the domain runs on. Missing optional keys take their
//! defaults; a present but malformed value is always an error.

use crate::domain::backtest::BacktestEngine;
use crate::domain::error::FoldtraderError;
use crate::domain::execution::{DEFAULT_DUST_THRESHOLD, ExecutionConfig};
use crate::domain::objective::{Objective, ObjectiveConfig, TRADING_DAYS_PER_YEAR};
use crate::domain::optimizer::StrategyOptimizer;
use crate::domain::params::{ParamSet, ParamSpace, ParamSpec};
use crate::domain::risk::{ClampMode, RiskGovernor, RiskProfile};
use crate::domain::search::SearchKind;
use crate::domain::splitter::{SamplingUnit, TimeSplitter};
use crate::domain::strategy::StrategyKind;
use crate::domain::walk_forward::WalkForwardOptimizer;
use crate::ports::config_port::ConfigPort;
use std::str::FromStr;
use std::time::Duration;

const PARAM_PREFIX: &str = "param.";
const FIXED_PREFIX: &str = "fixed.";

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSettings {
    pub initial_capital: f64,
    pub execution: ExecutionConfig,
    pub objective: ObjectiveConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalkForwardSettings {
    pub unit: SamplingUnit,
    pub train_window: i64,
    pub test_window: i64,
    pub step: i64,
    pub embargo: i64,
    pub n_trials: usize,
    pub objective: Objective,
    pub search: SearchKind,
    pub seed: u64,
    pub parallel: bool,
    pub min_train_points: usize,
    pub min_test_points: usize,
    pub time_limit: Option<Duration>,
}

impl WalkForwardSettings {
    pub fn splitter(&self) -> Result<TimeSplitter, FoldtraderError> {
        TimeSplitter::from_units(
            self.unit,
            self.train_window,
            self.test_window,
            self.step,
            self.embargo,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategySettings {
    pub kind: StrategyKind,
    pub space: ParamSpace,
    pub fixed: ParamSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskSettings {
    pub profile: RiskProfile,
    pub vol_lookback: usize,
}

impl RiskSettings {
    pub fn governor(&self, periods_per_year: f64) -> RiskGovernor {
        RiskGovernor::new(self.profile, self.vol_lookback, periods_per_year)
    }
}

impl BacktestSettings {
    /// Engine with these frictions, governed by `risk` when enabled.
    pub fn engine(&self, risk: Option<&RiskSettings>) -> Result<BacktestEngine, FoldtraderError> {
        let engine = BacktestEngine::new(self.initial_capital, self.execution.clone())?;
        Ok(match risk {
            Some(r) => engine.with_risk(r.governor(self.objective.periods_per_year)),
            None => engine,
        })
    }
}

/// Everything a walk-forward or backtest run is configured with.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub backtest: BacktestSettings,
    pub walk_forward: WalkForwardSettings,
    pub strategy: StrategySettings,
    pub risk: Option<RiskSettings>,
}

impl RunConfig {
    pub fn risk_governor(&self) -> Option<RiskGovernor> {
        self.risk
            .as_ref()
            .map(|r| r.governor(self.backtest.objective.periods_per_year))
    }

    /// Engine with the configured frictions and risk governance.
    pub fn backtest_engine(&self) -> Result<BacktestEngine, FoldtraderError> {
        self.backtest.engine(self.risk.as_ref())
    }

    pub fn strategy_optimizer(&self) -> Result<StrategyOptimizer, FoldtraderError> {
        let optimizer = StrategyOptimizer::new(
            self.backtest.initial_capital,
            self.walk_forward.objective,
            self.backtest.objective,
        )?
        .with_search(self.walk_forward.search)
        .with_fixed_params(self.strategy.fixed.clone());
        Ok(match self.risk_governor() {
            Some(governor) => optimizer.with_risk(governor),
            None => optimizer,
        })
    }

    pub fn walk_forward_optimizer(&self) -> Result<WalkForwardOptimizer, FoldtraderError> {
        let wf = &self.walk_forward;
        let mut optimizer = WalkForwardOptimizer::new(
            wf.splitter()?,
            self.strategy.kind,
            self.strategy_optimizer()?,
            self.backtest_engine()?,
        )
        .with_seed(wf.seed)
        .with_parallel(wf.parallel)
        .with_min_points(wf.min_train_points, wf.min_test_points);
        if let Some(limit) = wf.time_limit {
            optimizer = optimizer.with_time_limit(limit);
        }
        Ok(optimizer)
    }
}

pub fn load_run_config(config: &dyn ConfigPort) -> Result<RunConfig, FoldtraderError> {
    Ok(RunConfig {
        backtest: load_backtest_settings(config)?,
        walk_forward: load_walk_forward_settings(config)?,
        strategy: load_strategy_settings(config)?,
        risk: load_risk_settings(config)?,
    })
}

/// Parse `section.key`, falling back to `default` only when the key is absent.
fn parse_or<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, FoldtraderError>
where
    T::Err: std::fmt::Display,
{
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            FoldtraderError::config_invalid(section, key, format!("'{}': {e}", raw.trim()))
        }),
    }
}

fn require<T: FromStr>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<T, FoldtraderError>
where
    T::Err: std::fmt::Display,
{
    let raw = config
        .get_string(section, key)
        .ok_or_else(|| FoldtraderError::config_missing(section, key))?;
    raw.trim().parse::<T>().map_err(|e| {
        FoldtraderError::config_invalid(section, key, format!("'{}': {e}", raw.trim()))
    })
}

fn parse_bool_or(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, FoldtraderError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            other => Err(FoldtraderError::config_invalid(
                section,
                key,
                format!("'{other}' is not a boolean"),
            )),
        },
    }
}

pub fn load_backtest_settings(config: &dyn ConfigPort) -> Result<BacktestSettings, FoldtraderError> {
    let initial_capital: f64 = parse_or(config, "backtest", "initial_capital", 0.0)?;
    if !(initial_capital > 0.0 && initial_capital.is_finite()) {
        return Err(FoldtraderError::config_invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }

    let commission_bps: u32 = parse_or(config, "backtest", "commission_bps", 0)?;
    let slippage_bps: u32 = parse_or(config, "backtest", "slippage_bps", 0)?;
    let dust_threshold: f64 =
        parse_or(config, "backtest", "dust_threshold", DEFAULT_DUST_THRESHOLD)?;
    let execution =
        ExecutionConfig::from_bps(commission_bps, slippage_bps).with_dust_threshold(dust_threshold);
    execution.validate()?;

    let periods_per_year: f64 =
        parse_or(config, "backtest", "periods_per_year", TRADING_DAYS_PER_YEAR)?;
    if !(periods_per_year > 0.0 && periods_per_year.is_finite()) {
        return Err(FoldtraderError::config_invalid(
            "backtest",
            "periods_per_year",
            "periods_per_year must be positive",
        ));
    }
    let risk_free_rate: f64 = parse_or(config, "backtest", "risk_free_rate", 0.0)?;
    if !(0.0..1.0).contains(&risk_free_rate) {
        return Err(FoldtraderError::config_invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    let calmar_window: usize = parse_or(
        config,
        "backtest",
        "calmar_window",
        periods_per_year.round() as usize,
    )?;

    Ok(BacktestSettings {
        initial_capital,
        execution,
        objective: ObjectiveConfig {
            periods_per_year,
            risk_free_rate,
            target_return: parse_or(config, "backtest", "target_return", 0.0)?,
            calmar_window: calmar_window.max(1),
        },
    })
}

pub fn load_walk_forward_settings(
    config: &dyn ConfigPort,
) -> Result<WalkForwardSettings, FoldtraderError> {
    const S: &str = "walk_forward";

    let unit: SamplingUnit = parse_or(config, S, "unit", SamplingUnit::Day)?;
    let train_window: i64 = require(config, S, "train_window")?;
    let test_window: i64 = require(config, S, "test_window")?;
    let step: i64 = parse_or(config, S, "step", test_window)?;
    let embargo: i64 = parse_or(config, S, "embargo", 0)?;

    let n_trials: usize = parse_or(config, S, "n_trials", 20)?;
    if n_trials == 0 {
        return Err(FoldtraderError::config_invalid(
            S,
            "n_trials",
            "n_trials must be at least 1",
        ));
    }
    let time_limit_secs: u64 = parse_or(config, S, "time_limit_secs", 0)?;

    let settings = WalkForwardSettings {
        unit,
        train_window,
        test_window,
        step,
        embargo,
        n_trials,
        objective: parse_or(config, S, "objective", Objective::Sharpe)?,
        search: parse_or(config, S, "search", SearchKind::Tpe)?,
        seed: parse_or(config, S, "seed", 42)?,
        parallel: parse_bool_or(config, S, "parallel", false)?,
        min_train_points: parse_or(config, S, "min_train_points", 2)?,
        min_test_points: parse_or(config, S, "min_test_points", 2)?,
        time_limit: (time_limit_secs > 0).then(|| Duration::from_secs(time_limit_secs)),
    };
    // Window sizes are checked by the splitter itself.
    settings.splitter()?;
    Ok(settings)
}

pub fn load_strategy_settings(config: &dyn ConfigPort) -> Result<StrategySettings, FoldtraderError> {
    let kind: StrategyKind = parse_or(config, "strategy", "kind", StrategyKind::ProbabilisticTrend)?;

    let mut specs = Vec::new();
    let mut fixed = ParamSet::new();
    for key in config.keys("strategy") {
        let (name, is_fixed) = if let Some(name) = key.strip_prefix(PARAM_PREFIX) {
            (name, false)
        } else if let Some(name) = key.strip_prefix(FIXED_PREFIX) {
            (name, true)
        } else {
            continue;
        };
        if !kind.param_names().contains(&name) {
            return Err(FoldtraderError::config_invalid(
                "strategy",
                &key,
                format!("{kind} has no parameter '{name}'"),
            ));
        }
        if is_fixed {
            fixed.insert(name.to_string(), require(config, "strategy", &key)?);
        } else {
            let raw = config.get_string("strategy", &key).unwrap_or_default();
            specs.push(ParamSpec::parse(name, &raw)?);
        }
    }

    Ok(StrategySettings {
        kind,
        space: ParamSpace::new(specs)?,
        fixed,
    })
}

/// `None` unless `[risk] enabled = true`.
pub fn load_risk_settings(config: &dyn ConfigPort) -> Result<Option<RiskSettings>, FoldtraderError> {
    if !parse_bool_or(config, "risk", "enabled", false)? {
        return Ok(None);
    }
    let profile = RiskProfile::new(
        parse_or(config, "risk", "max_drawdown", 0.2)?,
        parse_or(config, "risk", "vol_target", 0.15)?,
        parse_or(config, "risk", "max_leverage", 1.0)?,
        parse_or(config, "risk", "position_limit_pct", 0.5)?,
        parse_or(config, "risk", "clamp_mode", ClampMode::Total)?,
    )?;
    let vol_lookback: usize = parse_or(config, "risk", "vol_lookback", 20)?;
    if vol_lookback < 2 {
        return Err(FoldtraderError::config_invalid(
            "risk",
            "vol_lookback",
            "vol_lookback must be at least 2",
        ));
    }
    Ok(Some(RiskSettings {
        profile,
        vol_lookback,
    }))
}
