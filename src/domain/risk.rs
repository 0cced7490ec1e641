//! Risk governance: drawdown freeze, volatility targeting and position limits.

use crate::domain::error::FoldtraderError;
use crate::domain::portfolio::Portfolio;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;

/// Which notional the per-asset position limit bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClampMode {
    /// The resulting exposure after the rebalance.
    #[default]
    Total,
    /// Only the incremental trade notional; exposure can build up across
    /// several rebalances.
    Incremental,
}

impl FromStr for ClampMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "total" => Ok(ClampMode::Total),
            "incremental" => Ok(ClampMode::Incremental),
            other => Err(format!("unknown clamp mode '{other}'")),
        }
    }
}

/// Immutable risk mandate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub max_drawdown: f64,
    pub vol_target: f64,
    pub max_leverage: f64,
    pub position_limit_pct: f64,
    pub clamp_mode: ClampMode,
}

impl RiskProfile {
    pub fn new(
        max_drawdown: f64,
        vol_target: f64,
        max_leverage: f64,
        position_limit_pct: f64,
        clamp_mode: ClampMode,
    ) -> Result<Self, FoldtraderError> {
        if !(max_drawdown > 0.0 && max_drawdown <= 1.0) {
            return Err(FoldtraderError::config_invalid(
                "risk",
                "max_drawdown",
                "max_drawdown must be in (0, 1]",
            ));
        }
        if !(vol_target > 0.0 && vol_target.is_finite()) {
            return Err(FoldtraderError::config_invalid(
                "risk",
                "vol_target",
                "vol_target must be positive",
            ));
        }
        if !(max_leverage >= 1.0 && max_leverage.is_finite()) {
            return Err(FoldtraderError::config_invalid(
                "risk",
                "max_leverage",
                "max_leverage must be at least 1",
            ));
        }
        if !(position_limit_pct > 0.0 && position_limit_pct <= 1.0) {
            return Err(FoldtraderError::config_invalid(
                "risk",
                "position_limit_pct",
                "position_limit_pct must be in (0, 1]",
            ));
        }
        Ok(RiskProfile {
            max_drawdown,
            vol_target,
            max_leverage,
            position_limit_pct,
            clamp_mode,
        })
    }
}

/// Portfolio figures the constitution needs for one decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskState {
    pub equity: f64,
    pub peak_equity: f64,
    /// Annualized realized volatility.
    pub current_volatility: f64,
    pub gross_exposure: f64,
}

/// Mechanical checks that reject or resize positions against a [`RiskProfile`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskConstitution {
    profile: RiskProfile,
}

impl RiskConstitution {
    pub fn new(profile: RiskProfile) -> Self {
        RiskConstitution { profile }
    }

    pub fn profile(&self) -> &RiskProfile {
        &self.profile
    }

    /// False (frozen) once the drawdown from peak reaches `max_drawdown`.
    pub fn check_drawdown(&self, state: &RiskState) -> bool {
        if state.peak_equity <= 0.0 {
            return true;
        }
        let drawdown = state.equity / state.peak_equity - 1.0;
        drawdown > -self.profile.max_drawdown
    }

    pub fn vol_scalar(&self, state: &RiskState) -> f64 {
        if state.current_volatility <= 0.0 {
            return 1.0;
        }
        if state.current_volatility > self.profile.vol_target {
            self.profile.vol_target / state.current_volatility
        } else {
            1.0
        }
    }

    /// Clamp `|requested_value|` to `equity * position_limit_pct`, keeping the sign.
    pub fn validate_position_size(&self, requested_value: f64, state: &RiskState) -> f64 {
        let limit = (state.equity * self.profile.position_limit_pct).max(0.0);
        requested_value.abs().min(limit).copysign(requested_value)
    }

    /// Apply the position limit according to the profile's [`ClampMode`].
    pub fn bound_target_value(
        &self,
        requested_target: f64,
        current_value: f64,
        state: &RiskState,
    ) -> f64 {
        match self.profile.clamp_mode {
            ClampMode::Total => self.validate_position_size(requested_target, state),
            ClampMode::Incremental => {
                current_value
                    + self.validate_position_size(requested_target - current_value, state)
            }
        }
    }

    /// Factor in [0, 1] keeping `gross_target_value` within `max_leverage * equity`.
    pub fn leverage_scalar(&self, gross_target_value: f64, state: &RiskState) -> f64 {
        let capacity = self.profile.max_leverage * state.equity;
        if gross_target_value <= capacity || gross_target_value <= 0.0 {
            return 1.0;
        }
        (capacity / gross_target_value).max(0.0)
    }
}

/// Applies the constitution inside a backtest, tracking peak equity and
/// realized volatility across the state sequence of one run.
#[derive(Debug, Clone)]
pub struct RiskGovernor {
    constitution: RiskConstitution,
    vol_lookback: usize,
    periods_per_year: f64,
    peak_equity: f64,
    last_equity: Option<f64>,
    returns: VecDeque<f64>,
    freezes: usize,
}

impl RiskGovernor {
    pub fn new(profile: RiskProfile, vol_lookback: usize, periods_per_year: f64) -> Self {
        RiskGovernor {
            constitution: RiskConstitution::new(profile),
            vol_lookback: vol_lookback.max(2),
            periods_per_year,
            peak_equity: 0.0,
            last_equity: None,
            returns: VecDeque::new(),
            freezes: 0,
        }
    }

    pub fn constitution(&self) -> &RiskConstitution {
        &self.constitution
    }

    /// Number of rebalances forced flat by a drawdown breach.
    pub fn freezes(&self) -> usize {
        self.freezes
    }

    /// Feed the mark-to-market equity of each state, in order.
    pub fn observe(&mut self, equity: f64) {
        if let Some(prev) = self.last_equity {
            let r = if prev > 0.0 { equity / prev - 1.0 } else { 0.0 };
            self.returns.push_back(r);
            if self.returns.len() > self.vol_lookback {
                self.returns.pop_front();
            }
        }
        self.last_equity = Some(equity);
        self.peak_equity = self.peak_equity.max(equity);
    }

    pub fn realized_volatility(&self) -> f64 {
        let n = self.returns.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.returns.iter().sum::<f64>() / n as f64;
        let var = self.returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        var.sqrt() * self.periods_per_year.sqrt()
    }

    pub fn state(&self, portfolio: &Portfolio) -> RiskState {
        RiskState {
            equity: portfolio.total_equity(),
            peak_equity: self.peak_equity,
            current_volatility: self.realized_volatility(),
            gross_exposure: portfolio.gross_exposure(),
        }
    }

    /// Turn target weights into approved target values.
    ///
    /// Order: drawdown freeze, volatility scalar, position clamp, leverage cap.
    /// A freeze returns zero targets for every requested and held asset.
    pub fn govern(&mut self, portfolio: &Portfolio, targets: &[(String, f64)]) -> Vec<(String, f64)> {
        let state = self.state(portfolio);

        if !self.constitution.check_drawdown(&state) {
            self.freezes += 1;
            warn!(
                "drawdown limit breached (equity {:.2}, peak {:.2}); forcing flat",
                state.equity, state.peak_equity
            );
            let mut flat: BTreeMap<String, f64> = portfolio
                .positions
                .keys()
                .map(|asset| (asset.clone(), 0.0))
                .collect();
            for (asset, _) in targets {
                flat.insert(asset.clone(), 0.0);
            }
            return flat.into_iter().collect();
        }

        let scalar = self.constitution.vol_scalar(&state);
        let bounded: Vec<(String, f64)> = targets
            .iter()
            .map(|(asset, weight)| {
                let requested = state.equity * weight * scalar;
                let current = portfolio.position_value(asset);
                let value = self.constitution.bound_target_value(requested, current, &state);
                (asset.clone(), value)
            })
            .collect();

        let untouched: f64 = portfolio
            .positions
            .keys()
            .filter(|asset| !targets.iter().any(|(a, _)| a == *asset))
            .map(|asset| portfolio.position_value(asset).abs())
            .sum();
        let requested_gross: f64 = bounded.iter().map(|(_, v)| v.abs()).sum();
        let capacity_state = RiskState {
            equity: (state.equity - untouched / self.constitution.profile.max_leverage).max(0.0),
            ..state
        };
        let factor = self
            .constitution
            .leverage_scalar(requested_gross, &capacity_state);

        bounded
            .into_iter()
            .map(|(asset, value)| (asset, value * factor))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    fn profile() -> RiskProfile {
        RiskProfile::new(0.20, 0.15, 2.0, 0.50, ClampMode::Total).unwrap()
    }

    fn state(equity: f64, peak: f64, vol: f64) -> RiskState {
        RiskState {
            equity,
            peak_equity: peak,
            current_volatility: vol,
            gross_exposure: 0.0,
        }
    }

    #[test]
    fn profile_validation() {
        assert!(RiskProfile::new(0.0, 0.15, 1.0, 0.5, ClampMode::Total).is_err());
        assert!(RiskProfile::new(1.2, 0.15, 1.0, 0.5, ClampMode::Total).is_err());
        assert!(RiskProfile::new(1.0, 0.15, 1.0, 0.5, ClampMode::Total).is_ok());
        assert!(RiskProfile::new(0.2, 0.0, 1.0, 0.5, ClampMode::Total).is_err());
        assert!(RiskProfile::new(0.2, 0.15, 0.5, 0.5, ClampMode::Total).is_err());
        assert!(RiskProfile::new(0.2, 0.15, 1.0, 0.0, ClampMode::Total).is_err());
    }

    #[test]
    fn drawdown_within_limit() {
        let c = RiskConstitution::new(profile());
        assert!(c.check_drawdown(&state(95_000.0, 100_000.0, 0.1)));
    }

    #[test]
    fn drawdown_beyond_limit() {
        let c = RiskConstitution::new(profile());
        assert!(!c.check_drawdown(&state(70_000.0, 100_000.0, 0.1)));
    }

    #[test]
    fn drawdown_boundary_is_inclusive() {
        let c = RiskConstitution::new(RiskProfile::new(0.25, 0.15, 1.0, 0.5, ClampMode::Total).unwrap());
        // 75/100 - 1 == -0.25 exactly in binary floating point.
        assert!(!c.check_drawdown(&state(75.0, 100.0, 0.0)));
    }

    #[test]
    fn drawdown_without_peak_is_allowed() {
        let c = RiskConstitution::new(profile());
        assert!(c.check_drawdown(&state(0.0, 0.0, 0.0)));
    }

    #[test]
    fn vol_scalar_cases() {
        let c = RiskConstitution::new(profile());
        assert_relative_eq!(c.vol_scalar(&state(1.0, 1.0, 0.10)), 1.0);
        assert_relative_eq!(c.vol_scalar(&state(1.0, 1.0, 0.30)), 0.5);
        assert_relative_eq!(c.vol_scalar(&state(1.0, 1.0, 0.0)), 1.0);
        assert_relative_eq!(c.vol_scalar(&state(1.0, 1.0, -0.3)), 1.0);
    }

    #[test]
    fn position_clamp_preserves_sign() {
        let c = RiskConstitution::new(profile());
        let s = state(100_000.0, 100_000.0, 0.15);
        assert_relative_eq!(c.validate_position_size(80_000.0, &s), 50_000.0);
        assert_relative_eq!(c.validate_position_size(-60_000.0, &s), -50_000.0);
        assert_relative_eq!(c.validate_position_size(20_000.0, &s), 20_000.0);
    }

    #[test]
    fn incremental_clamp_allows_exposure_build_up() {
        let incremental = RiskConstitution::new(
            RiskProfile::new(0.2, 0.15, 2.0, 0.5, ClampMode::Incremental).unwrap(),
        );
        let total = RiskConstitution::new(profile());
        let s = state(100_000.0, 100_000.0, 0.0);

        assert_relative_eq!(incremental.bound_target_value(90_000.0, 45_000.0, &s), 90_000.0);
        assert_relative_eq!(incremental.bound_target_value(120_000.0, 45_000.0, &s), 95_000.0);
        assert_relative_eq!(total.bound_target_value(90_000.0, 45_000.0, &s), 50_000.0);
    }

    #[test]
    fn leverage_scalar_caps_gross() {
        let c = RiskConstitution::new(profile());
        let s = state(100_000.0, 100_000.0, 0.0);
        assert_relative_eq!(c.leverage_scalar(150_000.0, &s), 1.0);
        assert_relative_eq!(c.leverage_scalar(400_000.0, &s), 0.5);
    }

    #[test]
    fn clamp_mode_parses() {
        assert_eq!("Total".parse::<ClampMode>(), Ok(ClampMode::Total));
        assert_eq!("incremental".parse::<ClampMode>(), Ok(ClampMode::Incremental));
        assert!("gross".parse::<ClampMode>().is_err());
    }

    fn portfolio_with(cash: f64, holdings: &[(&str, f64, f64)]) -> Portfolio {
        let mut portfolio = Portfolio::new(cash);
        let mut marks = HashMap::new();
        for (asset, qty, price) in holdings {
            portfolio.adjust_position(asset, *qty);
            marks.insert(asset.to_string(), *price);
        }
        portfolio.update_marks(&marks);
        portfolio
    }

    #[test]
    fn governor_freezes_all_holdings_on_breach() {
        let mut governor = RiskGovernor::new(profile(), 20, 252.0);
        governor.observe(100_000.0);
        let portfolio = portfolio_with(20_000.0, &[("GOLD", 500.0, 100.0)]);
        governor.observe(portfolio.total_equity());

        let approved = governor.govern(&portfolio, &[("OIL".to_string(), 0.3)]);

        assert_eq!(
            approved,
            vec![("GOLD".to_string(), 0.0), ("OIL".to_string(), 0.0)]
        );
        assert_eq!(governor.freezes(), 1);
    }

    #[test]
    fn governor_clamps_to_position_limit() {
        let mut governor = RiskGovernor::new(profile(), 20, 252.0);
        let portfolio = portfolio_with(100_000.0, &[]);
        governor.observe(portfolio.total_equity());

        let approved = governor.govern(&portfolio, &[("GOLD".to_string(), 0.9)]);
        assert_eq!(approved.len(), 1);
        assert_relative_eq!(approved[0].1, 50_000.0);
    }

    #[test]
    fn governor_scales_down_in_high_volatility() {
        let mut governor = RiskGovernor::new(profile(), 5, 252.0);
        for equity in [100_000.0, 110_000.0, 95_000.0, 112_000.0, 99_000.0, 110_000.0] {
            governor.observe(equity);
        }
        let vol = governor.realized_volatility();
        assert!(vol > 0.15);

        let portfolio = portfolio_with(110_000.0, &[]);
        let approved = governor.govern(&portfolio, &[("GOLD".to_string(), 0.2)]);
        assert_relative_eq!(approved[0].1, 110_000.0 * 0.2 * 0.15 / vol, epsilon = 1e-6);
    }

    #[test]
    fn governor_respects_leverage_with_untouched_holdings() {
        let p = RiskProfile::new(0.5, 10.0, 1.0, 1.0, ClampMode::Total).unwrap();
        let mut governor = RiskGovernor::new(p, 20, 252.0);
        // Equity 100k with 60k already in GOLD; OIL may only take the remaining 40k.
        let portfolio = portfolio_with(40_000.0, &[("GOLD", 600.0, 100.0)]);
        governor.observe(portfolio.total_equity());

        let approved = governor.govern(&portfolio, &[("OIL".to_string(), 0.8)]);
        assert_relative_eq!(approved[0].1, 40_000.0, epsilon = 1e-6);
    }
}
