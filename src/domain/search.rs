//! Hyperparameter search strategies.
//!
//! A search proposes parameter sets with [`SearchStrategy::suggest`] and is
//! told the score of each with [`SearchStrategy::observe`]. All randomness
//! comes from a seeded [`StdRng`], so a search is reproducible from its seed.

use crate::domain::params::{ParamKind, ParamSet, ParamSpace, ParamSpec};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use std::fmt;
use std::str::FromStr;

pub trait SearchStrategy: Send {
    /// Next parameter set to evaluate, or `None` once the search is exhausted.
    fn suggest(&mut self, space: &ParamSpace) -> Option<ParamSet>;

    /// Feed back the score of a suggested set. Failed trials report `-inf`.
    fn observe(&mut self, params: &ParamSet, score: f64);
}

fn sample_uniform(spec: &ParamSpec, rng: &mut StdRng) -> f64 {
    match &spec.kind {
        ParamKind::Float { low, high, .. } => {
            if high > low {
                spec.snap(rng.gen_range(*low..=*high))
            } else {
                *low
            }
        }
        ParamKind::Int { low, high } => rng.gen_range(*low..=*high) as f64,
        ParamKind::Choice(values) => values[rng.gen_range(0..values.len())],
    }
}

fn sample_space(space: &ParamSpace, rng: &mut StdRng) -> ParamSet {
    space
        .specs()
        .iter()
        .map(|spec| (spec.name.clone(), sample_uniform(spec, rng)))
        .collect()
}

/// Independent uniform draws from every parameter range.
pub struct RandomSearch {
    rng: StdRng,
}

impl RandomSearch {
    pub fn new(seed: u64) -> Self {
        RandomSearch {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, space: &ParamSpace) -> Option<ParamSet> {
        Some(sample_space(space, &mut self.rng))
    }

    fn observe(&mut self, _params: &ParamSet, _score: f64) {}
}

/// Exhaustive walk over the cartesian grid, last parameter varying fastest.
///
/// Floats without a step are discretized into `resolution` evenly spaced
/// points including both bounds.
pub struct GridSearch {
    resolution: usize,
    axes: Option<Vec<(String, Vec<f64>)>>,
    next: usize,
}

impl GridSearch {
    pub const DEFAULT_RESOLUTION: usize = 5;

    pub fn new() -> Self {
        Self::with_resolution(Self::DEFAULT_RESOLUTION)
    }

    pub fn with_resolution(resolution: usize) -> Self {
        GridSearch {
            resolution: resolution.max(2),
            axes: None,
            next: 0,
        }
    }

    fn axis(&self, spec: &ParamSpec) -> Vec<f64> {
        spec.grid_values().unwrap_or_else(|| {
            let (low, high) = (spec.low(), spec.high());
            let n = self.resolution - 1;
            (0..=n)
                .map(|k| low + (high - low) * k as f64 / n as f64)
                .collect()
        })
    }

    /// Number of points in the grid for `space`.
    pub fn grid_size(&self, space: &ParamSpace) -> usize {
        space
            .specs()
            .iter()
            .map(|s| self.axis(s).len())
            .product()
    }
}

impl Default for GridSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchStrategy for GridSearch {
    fn suggest(&mut self, space: &ParamSpace) -> Option<ParamSet> {
        if self.axes.is_none() {
            let axes = space
                .specs()
                .iter()
                .map(|s| (s.name.clone(), self.axis(s)))
                .collect();
            self.axes = Some(axes);
        }
        let axes = self.axes.as_ref()?;
        let total: usize = axes.iter().map(|(_, values)| values.len()).product();
        if self.next >= total {
            return None;
        }

        let mut rest = self.next;
        let mut params = ParamSet::new();
        for (name, values) in axes.iter().rev() {
            params.insert(name.clone(), values[rest % values.len()]);
            rest /= values.len();
        }
        self.next += 1;
        Some(params)
    }

    fn observe(&mut self, _params: &ParamSet, _score: f64) {}
}

/// Tree-structured Parzen estimator.
///
/// After `n_startup` random trials, the history is split into the best
/// `gamma` fraction and the rest. Each parameter is then drawn independently:
/// candidates are sampled around good observations and the one maximizing
/// `l(x) / g(x)` is kept, where `l` and `g` are Parzen densities over the
/// good and bad groups.
pub struct TpeSearch {
    rng: StdRng,
    history: Vec<(ParamSet, f64)>,
    n_startup: usize,
    gamma: f64,
    n_candidates: usize,
}

impl TpeSearch {
    pub fn new(seed: u64) -> Self {
        TpeSearch {
            rng: StdRng::seed_from_u64(seed),
            history: Vec::new(),
            n_startup: 10,
            gamma: 0.25,
            n_candidates: 24,
        }
    }

    pub fn with_startup_trials(mut self, n_startup: usize) -> Self {
        self.n_startup = n_startup;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma.clamp(0.01, 1.0);
        self
    }

    fn split_history(&self) -> (Vec<&ParamSet>, Vec<&ParamSet>) {
        let mut ranked: Vec<&(ParamSet, f64)> = self.history.iter().collect();
        // Stable sort keeps earlier trials first among equal scores.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let n_good = ((ranked.len() as f64 * self.gamma).ceil() as usize).max(1);
        let (good, bad) = ranked.split_at(n_good.min(ranked.len()));
        (
            good.iter().map(|(p, _)| p).collect(),
            bad.iter().map(|(p, _)| p).collect(),
        )
    }

    fn sample_numeric(&mut self, spec: &ParamSpec, good: &[f64], bad: &[f64]) -> f64 {
        let (low, high) = (spec.low(), spec.high());
        let width = high - low;
        if width <= 0.0 {
            return low;
        }
        if good.is_empty() {
            return sample_uniform(spec, &mut self.rng);
        }

        let sigma = 0.1 * width;
        let prior = 1.0 / width;
        let density = |x: f64, obs: &[f64]| {
            (obs.iter().map(|&v| gaussian_pdf(x, v, sigma)).sum::<f64>() + prior)
                / (obs.len() + 1) as f64
        };

        let mut best = (f64::NEG_INFINITY, low);
        for _ in 0..self.n_candidates {
            let base = good[self.rng.gen_range(0..good.len())];
            let raw = match Normal::new(base, sigma) {
                Ok(normal) => normal.sample(&mut self.rng),
                Err(_) => base,
            };
            let candidate = spec.snap(raw.clamp(low, high));
            let ratio = density(candidate, good) / density(candidate, bad);
            if ratio > best.0 {
                best = (ratio, candidate);
            }
        }
        best.1
    }

    fn sample_choice(&mut self, values: &[f64], good: &[f64], bad: &[f64]) -> f64 {
        let counts = |obs: &[f64]| -> Vec<f64> {
            values
                .iter()
                .map(|v| 1.0 + obs.iter().filter(|o| (*o - v).abs() < 1e-12).count() as f64)
                .collect()
        };
        let good_counts = counts(good);
        let bad_counts = counts(bad);
        let good_total: f64 = good_counts.iter().sum();
        let bad_total: f64 = bad_counts.iter().sum();

        let Ok(dist) = WeightedIndex::new(&good_counts) else {
            return values[self.rng.gen_range(0..values.len())];
        };
        let mut best = (f64::NEG_INFINITY, values[0]);
        for _ in 0..self.n_candidates {
            let i = dist.sample(&mut self.rng);
            let ratio = (good_counts[i] / good_total) / (bad_counts[i] / bad_total);
            if ratio > best.0 {
                best = (ratio, values[i]);
            }
        }
        best.1
    }
}

fn gaussian_pdf(x: f64, mean: f64, sigma: f64) -> f64 {
    let z = (x - mean) / sigma;
    (-0.5 * z * z).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
}

impl SearchStrategy for TpeSearch {
    fn suggest(&mut self, space: &ParamSpace) -> Option<ParamSet> {
        if self.history.len() < self.n_startup.max(1) {
            return Some(sample_space(space, &mut self.rng));
        }

        let values_of = |group: &[&ParamSet], name: &str| -> Vec<f64> {
            group.iter().filter_map(|p| p.get(name).copied()).collect()
        };
        let columns: Vec<(Vec<f64>, Vec<f64>)> = {
            let (good, bad) = self.split_history();
            space
                .specs()
                .iter()
                .map(|spec| (values_of(&good, &spec.name), values_of(&bad, &spec.name)))
                .collect()
        };

        let mut params = ParamSet::new();
        for (spec, (good_values, bad_values)) in space.specs().iter().zip(columns) {
            let value = match &spec.kind {
                ParamKind::Choice(values) => self.sample_choice(values, &good_values, &bad_values),
                _ => self.sample_numeric(spec, &good_values, &bad_values),
            };
            params.insert(spec.name.clone(), value);
        }
        Some(params)
    }

    fn observe(&mut self, params: &ParamSet, score: f64) {
        let score = if score.is_nan() { f64::NEG_INFINITY } else { score };
        self.history.push((params.clone(), score));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchKind {
    Random,
    Grid,
    #[default]
    Tpe,
}

impl SearchKind {
    pub fn build(self, seed: u64) -> Box<dyn SearchStrategy> {
        match self {
            SearchKind::Random => Box::new(RandomSearch::new(seed)),
            SearchKind::Grid => Box::new(GridSearch::new()),
            SearchKind::Tpe => Box::new(TpeSearch::new(seed)),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SearchKind::Random => "random",
            SearchKind::Grid => "grid",
            SearchKind::Tpe => "tpe",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SearchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "random" => Ok(SearchKind::Random),
            "grid" => Ok(SearchKind::Grid),
            "tpe" | "bayesian" => Ok(SearchKind::Tpe),
            other => Err(format!("unknown search '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> ParamSpace {
        ParamSpace::new(vec![
            ParamSpec::float("confidence_threshold", 0.55, 0.85, Some(0.05)),
            ParamSpec::float("max_cap", 0.1, 0.5, None),
        ])
        .unwrap()
    }

    fn run(search: &mut dyn SearchStrategy, space: &ParamSpace, n: usize) -> Vec<ParamSet> {
        let mut seen = Vec::new();
        for _ in 0..n {
            let Some(p) = search.suggest(space) else { break };
            search.observe(&p, 0.0);
            seen.push(p);
        }
        seen
    }

    #[test]
    fn random_is_reproducible_and_in_bounds() {
        let s = space();
        let a = run(&mut RandomSearch::new(7), &s, 30);
        let b = run(&mut RandomSearch::new(7), &s, 30);
        assert_eq!(a, b);
        for p in &a {
            let t = p["confidence_threshold"];
            assert!((0.55..=0.85).contains(&t));
            assert_eq!(s.specs()[0].snap(t), t);
            assert!((0.1..=0.5).contains(&p["max_cap"]));
        }
    }

    #[test]
    fn random_differs_across_seeds() {
        let s = space();
        assert_ne!(
            run(&mut RandomSearch::new(1), &s, 10),
            run(&mut RandomSearch::new(2), &s, 10)
        );
    }

    #[test]
    fn grid_exhausts_cartesian_product_then_stops() {
        let s = ParamSpace::new(vec![
            ParamSpec::int("a", 1, 2),
            ParamSpec::choice("b", vec![10.0, 20.0, 30.0]),
        ])
        .unwrap();
        let mut grid = GridSearch::new();
        assert_eq!(grid.grid_size(&s), 6);
        let points = run(&mut grid, &s, 100);
        assert_eq!(points.len(), 6);
        assert_eq!(points[0]["a"], 1.0);
        assert_eq!(points[0]["b"], 10.0);
        assert_eq!(points[1]["b"], 20.0);
        assert_eq!(points[5]["a"], 2.0);
        assert_eq!(points[5]["b"], 30.0);
        assert!(grid.suggest(&s).is_none());
    }

    #[test]
    fn grid_discretizes_stepless_floats() {
        let s = ParamSpace::new(vec![ParamSpec::float("x", 0.0, 1.0, None)]).unwrap();
        let points = run(&mut GridSearch::with_resolution(3), &s, 10);
        let xs: Vec<f64> = points.iter().map(|p| p["x"]).collect();
        assert_eq!(xs, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn grid_over_empty_space_yields_one_default_set() {
        let points = run(&mut GridSearch::new(), &ParamSpace::default(), 5);
        assert_eq!(points, vec![ParamSet::new()]);
    }

    #[test]
    fn tpe_is_reproducible() {
        let s = space();
        let drive = |seed| {
            let mut tpe = TpeSearch::new(seed).with_startup_trials(5);
            let mut out = Vec::new();
            for _ in 0..20 {
                let p = tpe.suggest(&s).unwrap();
                let score = -(p["max_cap"] - 0.3).powi(2);
                tpe.observe(&p, score);
                out.push(p);
            }
            out
        };
        assert_eq!(drive(3), drive(3));
    }

    #[test]
    fn tpe_concentrates_near_optimum() {
        let s = ParamSpace::new(vec![ParamSpec::float("x", 0.0, 1.0, None)]).unwrap();
        let mut tpe = TpeSearch::new(11).with_startup_trials(10);
        let mut best = (f64::NEG_INFINITY, 0.0);
        for _ in 0..60 {
            let p = tpe.suggest(&s).unwrap();
            let x = p["x"];
            assert!((0.0..=1.0).contains(&x));
            let score = -(x - 0.8).powi(2);
            if score > best.0 {
                best = (score, x);
            }
            tpe.observe(&p, score);
        }
        assert!((best.1 - 0.8).abs() < 0.1, "best x {}", best.1);
    }

    #[test]
    fn tpe_choice_stays_in_set_and_tolerates_failures() {
        let s = ParamSpace::new(vec![ParamSpec::choice("c", vec![1.0, 2.0, 3.0])]).unwrap();
        let mut tpe = TpeSearch::new(5).with_startup_trials(3);
        for i in 0..15 {
            let p = tpe.suggest(&s).unwrap();
            assert!([1.0, 2.0, 3.0].contains(&p["c"]));
            let score = if i % 4 == 0 { f64::NEG_INFINITY } else { p["c"] };
            tpe.observe(&p, score);
        }
    }

    #[test]
    fn search_kind_parse() {
        assert_eq!("TPE".parse::<SearchKind>(), Ok(SearchKind::Tpe));
        assert_eq!("grid".parse::<SearchKind>(), Ok(SearchKind::Grid));
        assert!("anneal".parse::<SearchKind>().is_err());
        assert_eq!(SearchKind::default(), SearchKind::Tpe);
    }
}
