//! Hyperparameter spaces and sampled parameter sets.

use crate::domain::error::FoldtraderError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Concrete hyperparameters for one strategy instance, ordered by name.
pub type ParamSet = BTreeMap<String, f64>;

/// Render a parameter set as `name=value` pairs.
pub fn format_params(params: &ParamSet) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamKind {
    /// Uniform on `[low, high]`, snapped to `low + k * step` when a step is set.
    Float { low: f64, high: f64, step: Option<f64> },
    /// Integers on `[low, high]`.
    Int { low: i64, high: i64 },
    /// One of a fixed list.
    Choice(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
}

impl ParamSpec {
    pub fn float(name: &str, low: f64, high: f64, step: Option<f64>) -> Self {
        ParamSpec {
            name: name.to_string(),
            kind: ParamKind::Float { low, high, step },
        }
    }

    pub fn int(name: &str, low: i64, high: i64) -> Self {
        ParamSpec {
            name: name.to_string(),
            kind: ParamKind::Int { low, high },
        }
    }

    pub fn choice(name: &str, values: Vec<f64>) -> Self {
        ParamSpec {
            name: name.to_string(),
            kind: ParamKind::Choice(values),
        }
    }

    /// Parse `float:low:high[:step]`, `int:low:high` or `choice:a,b,c`.
    pub fn parse(name: &str, definition: &str) -> Result<Self, FoldtraderError> {
        let invalid = |reason: String| {
            FoldtraderError::config_invalid("strategy", &format!("param.{name}"), reason)
        };
        let parts: Vec<&str> = definition.trim().split(':').map(str::trim).collect();
        let number = |s: &str| -> Result<f64, FoldtraderError> {
            s.parse::<f64>()
                .map_err(|_| invalid(format!("'{s}' is not a number")))
        };

        let spec = match parts.as_slice() {
            ["float", low, high] => Self::float(name, number(low)?, number(high)?, None),
            ["float", low, high, step] => {
                Self::float(name, number(low)?, number(high)?, Some(number(step)?))
            }
            ["int", low, high] => {
                let low = low
                    .parse::<i64>()
                    .map_err(|_| invalid(format!("'{low}' is not an integer")))?;
                let high = high
                    .parse::<i64>()
                    .map_err(|_| invalid(format!("'{high}' is not an integer")))?;
                Self::int(name, low, high)
            }
            ["choice", values] => {
                let values = values
                    .split(',')
                    .map(|v| number(v.trim()))
                    .collect::<Result<Vec<f64>, _>>()?;
                Self::choice(name, values)
            }
            _ => {
                return Err(invalid(format!(
                    "expected float:low:high[:step], int:low:high or choice:a,b,..; got '{definition}'"
                )));
            }
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), FoldtraderError> {
        let invalid = |reason: &str| {
            FoldtraderError::config_invalid("strategy", &format!("param.{}", self.name), reason)
        };
        match &self.kind {
            ParamKind::Float { low, high, step } => {
                if !(low.is_finite() && high.is_finite()) || low > high {
                    return Err(invalid("bounds must be finite with low <= high"));
                }
                if let Some(step) = step {
                    if !(*step > 0.0) {
                        return Err(invalid("step must be positive"));
                    }
                }
            }
            ParamKind::Int { low, high } => {
                if low > high {
                    return Err(invalid("low must not exceed high"));
                }
            }
            ParamKind::Choice(values) => {
                if values.is_empty() {
                    return Err(invalid("choice needs at least one value"));
                }
            }
        }
        Ok(())
    }

    pub fn low(&self) -> f64 {
        match &self.kind {
            ParamKind::Float { low, .. } => *low,
            ParamKind::Int { low, .. } => *low as f64,
            ParamKind::Choice(values) => values.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }

    pub fn high(&self) -> f64 {
        match &self.kind {
            ParamKind::Float { high, .. } => *high,
            ParamKind::Int { high, .. } => *high as f64,
            ParamKind::Choice(values) => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    /// Map an arbitrary value onto the nearest admissible value.
    pub fn snap(&self, value: f64) -> f64 {
        match &self.kind {
            ParamKind::Float { low, high, step } => {
                let clamped = value.clamp(*low, *high);
                match step {
                    Some(step) => {
                        let k = ((clamped - low) / step).round();
                        let snapped = low + k * step;
                        // Round away representation noise such as 0.15000000000000002.
                        let snapped = (snapped * 1e12).round() / 1e12;
                        if snapped > *high { snapped - step } else { snapped }
                    }
                    None => clamped,
                }
            }
            ParamKind::Int { low, high } => value.round().clamp(*low as f64, *high as f64),
            ParamKind::Choice(values) => values
                .iter()
                .copied()
                .min_by(|a, b| (a - value).abs().total_cmp(&(b - value).abs()))
                .unwrap_or(value),
        }
    }

    /// Every admissible value, when the set is finite.
    pub fn grid_values(&self) -> Option<Vec<f64>> {
        match &self.kind {
            ParamKind::Float { low, high, step } => {
                let step = (*step)?;
                let n = ((high - low) / step + 1e-9).floor() as usize;
                Some((0..=n).map(|k| self.snap(low + k as f64 * step)).collect())
            }
            ParamKind::Int { low, high } => Some((*low..=*high).map(|v| v as f64).collect()),
            ParamKind::Choice(values) => Some(values.clone()),
        }
    }
}

impl fmt::Display for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ParamKind::Float { low, high, step: Some(step) } => {
                write!(f, "{}: float [{low}, {high}] step {step}", self.name)
            }
            ParamKind::Float { low, high, step: None } => {
                write!(f, "{}: float [{low}, {high}]", self.name)
            }
            ParamKind::Int { low, high } => write!(f, "{}: int [{low}, {high}]", self.name),
            ParamKind::Choice(values) => write!(f, "{}: choice {values:?}", self.name),
        }
    }
}

/// Ordered collection of parameter specs searched together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSpace {
    specs: Vec<ParamSpec>,
}

impl ParamSpace {
    pub fn new(specs: Vec<ParamSpec>) -> Result<Self, FoldtraderError> {
        for (i, spec) in specs.iter().enumerate() {
            spec.validate()?;
            if specs[..i].iter().any(|s| s.name == spec.name) {
                return Err(FoldtraderError::config_invalid(
                    "strategy",
                    &format!("param.{}", spec.name),
                    "duplicate parameter",
                ));
            }
        }
        Ok(ParamSpace { specs })
    }

    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
