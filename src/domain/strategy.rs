//! Signal-driven strategies that turn forecasts into target allocations.
//!
//! Strategies are a closed set ([`StrategyKind`]) built from a [`ParamSet`].
//! Each one emits allocations only for signals it acts on; a position is
//! left untouched until a later allocation for the same asset changes it.

use crate::domain::allocation::Allocation;
use crate::domain::error::TrialFailure;
use crate::domain::params::ParamSet;
use crate::domain::signal::Signal;
use std::fmt;
use std::str::FromStr;

pub trait Strategy: fmt::Debug + Send + Sync {
    fn generate_allocations(&self, signals: &[Signal]) -> Vec<Allocation>;
}

/// Trade only when the forecast probability clears a threshold, sized by
/// `direction * probability` and capped per asset.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilisticTrend {
    pub confidence_threshold: f64,
    pub max_cap: f64,
}

impl ProbabilisticTrend {
    pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;
    pub const DEFAULT_MAX_CAP: f64 = 0.2;

    pub fn new(confidence_threshold: f64, max_cap: f64) -> Result<Self, TrialFailure> {
        check_threshold(confidence_threshold)?;
        check_cap(max_cap)?;
        Ok(ProbabilisticTrend {
            confidence_threshold,
            max_cap,
        })
    }
}

impl Strategy for ProbabilisticTrend {
    fn generate_allocations(&self, signals: &[Signal]) -> Vec<Allocation> {
        signals
            .iter()
            .filter(|s| s.probability >= self.confidence_threshold)
            .map(|s| {
                let weight = (s.direction * s.probability).clamp(-self.max_cap, self.max_cap);
                Allocation::new(s.timestamp, &s.asset, weight)
            })
            .collect()
    }
}

/// Kelly-criterion sizing: `f = p - (1 - p) / win_loss_ratio`, floored at
/// zero, scaled by `kelly_fraction` and the signal direction.
#[derive(Debug, Clone, PartialEq)]
pub struct KellySized {
    pub confidence_threshold: f64,
    pub win_loss_ratio: f64,
    pub kelly_fraction: f64,
    pub max_cap: f64,
}

impl KellySized {
    pub const DEFAULT_WIN_LOSS_RATIO: f64 = 1.0;
    pub const DEFAULT_KELLY_FRACTION: f64 = 0.5;

    pub fn new(
        confidence_threshold: f64,
        win_loss_ratio: f64,
        kelly_fraction: f64,
        max_cap: f64,
    ) -> Result<Self, TrialFailure> {
        check_threshold(confidence_threshold)?;
        check_cap(max_cap)?;
        if !(win_loss_ratio > 0.0 && win_loss_ratio.is_finite()) {
            return Err(TrialFailure::InvalidParams(format!(
                "win_loss_ratio {win_loss_ratio} must be positive"
            )));
        }
        if !(kelly_fraction > 0.0 && kelly_fraction <= 1.0) {
            return Err(TrialFailure::InvalidParams(format!(
                "kelly_fraction {kelly_fraction} outside (0, 1]"
            )));
        }
        Ok(KellySized {
            confidence_threshold,
            win_loss_ratio,
            kelly_fraction,
            max_cap,
        })
    }

    pub fn kelly_fraction_for(&self, probability: f64) -> f64 {
        kelly_criterion(probability, self.win_loss_ratio)
    }
}

impl Strategy for KellySized {
    fn generate_allocations(&self, signals: &[Signal]) -> Vec<Allocation> {
        signals
            .iter()
            .filter(|s| s.probability >= self.confidence_threshold)
            .map(|s| {
                let f = self.kelly_fraction_for(s.probability) * self.kelly_fraction;
                let weight = (s.direction * f).clamp(-self.max_cap, self.max_cap);
                Allocation::new(s.timestamp, &s.asset, weight)
            })
            .collect()
    }
}

/// Optimal betting fraction; never negative.
pub fn kelly_criterion(win_probability: f64, win_loss_ratio: f64) -> f64 {
    if win_loss_ratio <= 0.0 {
        return 0.0;
    }
    (win_probability - (1.0 - win_probability) / win_loss_ratio).max(0.0)
}

fn check_threshold(value: f64) -> Result<(), TrialFailure> {
    if !(0.0..=1.0).contains(&value) {
        return Err(TrialFailure::InvalidParams(format!(
            "confidence_threshold {value} outside [0, 1]"
        )));
    }
    Ok(())
}

fn check_cap(value: f64) -> Result<(), TrialFailure> {
    if !(value > 0.0 && value.is_finite()) {
        return Err(TrialFailure::InvalidParams(format!(
            "max_cap {value} must be positive"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    ProbabilisticTrend,
    KellySized,
}

impl StrategyKind {
    pub fn label(self) -> &'static str {
        match self {
            StrategyKind::ProbabilisticTrend => "probabilistic_trend",
            StrategyKind::KellySized => "kelly_sized",
        }
    }

    /// Parameter names the variant understands.
    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            StrategyKind::ProbabilisticTrend => &["confidence_threshold", "max_cap"],
            StrategyKind::KellySized => &[
                "confidence_threshold",
                "win_loss_ratio",
                "kelly_fraction",
                "max_cap",
            ],
        }
    }

    /// Build a strategy from `params`; absent parameters take their defaults.
    pub fn build(self, params: &ParamSet) -> Result<Box<dyn Strategy>, TrialFailure> {
        if let Some(unknown) = params
            .keys()
            .find(|k| !self.param_names().contains(&k.as_str()))
        {
            return Err(TrialFailure::InvalidParams(format!(
                "{} has no parameter '{unknown}'",
                self.label()
            )));
        }
        let get = |name: &str, default: f64| params.get(name).copied().unwrap_or(default);
        let threshold = get(
            "confidence_threshold",
            ProbabilisticTrend::DEFAULT_CONFIDENCE_THRESHOLD,
        );
        let max_cap = get("max_cap", ProbabilisticTrend::DEFAULT_MAX_CAP);

        Ok(match self {
            StrategyKind::ProbabilisticTrend => {
                Box::new(ProbabilisticTrend::new(threshold, max_cap)?)
            }
            StrategyKind::KellySized => Box::new(KellySized::new(
                threshold,
                get("win_loss_ratio", KellySized::DEFAULT_WIN_LOSS_RATIO),
                get("kelly_fraction", KellySized::DEFAULT_KELLY_FRACTION),
                max_cap,
            )?),
        })
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "probabilistic_trend" | "trend" => Ok(StrategyKind::ProbabilisticTrend),
            "kelly_sized" | "kelly" => Ok(StrategyKind::KellySized),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::Timestamp;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn ts(day: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn make_signal(day: u32, direction: f64, probability: f64) -> Signal {
        Signal::new(ts(day), "GOLD", direction, probability, 5, "test").unwrap()
    }

    fn params(pairs: &[(&str, f64)]) -> ParamSet {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn trend_filters_below_threshold() {
        let strategy = ProbabilisticTrend::new(0.6, 1.0).unwrap();
        let signals = vec![
            make_signal(1, 1.0, 0.55),
            make_signal(2, 1.0, 0.6),
            make_signal(3, -1.0, 0.8),
        ];
        let allocations = strategy.generate_allocations(&signals);
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].timestamp, ts(2));
        assert_relative_eq!(allocations[0].weight, 0.6);
        assert_relative_eq!(allocations[1].weight, -0.8);
    }

    #[test]
    fn trend_caps_weight_symmetrically() {
        let strategy = ProbabilisticTrend::new(0.5, 0.3).unwrap();
        let allocations =
            strategy.generate_allocations(&[make_signal(1, 1.0, 0.9), make_signal(2, -1.0, 0.9)]);
        assert_relative_eq!(allocations[0].weight, 0.3);
        assert_relative_eq!(allocations[1].weight, -0.3);
    }

    #[test]
    fn trend_without_signals_is_empty() {
        let strategy = ProbabilisticTrend::new(0.5, 0.3).unwrap();
        assert!(strategy.generate_allocations(&[]).is_empty());
    }

    #[test]
    fn kelly_criterion_values() {
        assert_relative_eq!(kelly_criterion(0.6, 1.0), 0.2, epsilon = 1e-12);
        assert_relative_eq!(kelly_criterion(0.5, 2.0), 0.25, epsilon = 1e-12);
        assert_eq!(kelly_criterion(0.3, 1.0), 0.0);
        assert_eq!(kelly_criterion(0.9, 0.0), 0.0);
    }

    #[test]
    fn kelly_sized_scales_by_fraction_and_direction() {
        let strategy = KellySized::new(0.5, 1.0, 0.5, 1.0).unwrap();
        let allocations =
            strategy.generate_allocations(&[make_signal(1, -1.0, 0.7), make_signal(2, 0.5, 0.7)]);
        // f = 0.7 - 0.3 = 0.4, half-Kelly = 0.2
        assert_relative_eq!(allocations[0].weight, -0.2, epsilon = 1e-12);
        assert_relative_eq!(allocations[1].weight, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn kelly_sized_rejects_bad_params() {
        assert!(KellySized::new(0.5, 0.0, 0.5, 1.0).is_err());
        assert!(KellySized::new(0.5, 1.0, 1.5, 1.0).is_err());
        assert!(KellySized::new(1.5, 1.0, 0.5, 1.0).is_err());
    }

    #[test]
    fn build_uses_defaults_for_missing_params() {
        let strategy = StrategyKind::ProbabilisticTrend
            .build(&params(&[("max_cap", 0.5)]))
            .unwrap();
        // Default threshold 0.7 drops the 0.65 signal.
        let allocations =
            strategy.generate_allocations(&[make_signal(1, 1.0, 0.65), make_signal(2, 1.0, 0.75)]);
        assert_eq!(allocations.len(), 1);
        assert_relative_eq!(allocations[0].weight, 0.5);
    }

    #[test]
    fn build_rejects_unknown_and_invalid_params() {
        let err = StrategyKind::ProbabilisticTrend
            .build(&params(&[("kelly_fraction", 0.5)]))
            .unwrap_err();
        assert!(matches!(err, TrialFailure::InvalidParams(_)));

        let err = StrategyKind::KellySized
            .build(&params(&[("max_cap", -0.1)]))
            .unwrap_err();
        assert!(matches!(err, TrialFailure::InvalidParams(_)));
    }

    #[test]
    fn kind_parse_and_display() {
        assert_eq!(
            "probabilistic_trend".parse::<StrategyKind>(),
            Ok(StrategyKind::ProbabilisticTrend)
        );
        assert_eq!("Kelly".parse::<StrategyKind>(), Ok(StrategyKind::KellySized));
        assert!("momentum".parse::<StrategyKind>().is_err());
        assert_eq!(StrategyKind::KellySized.to_string(), "kelly_sized");
    }
}
