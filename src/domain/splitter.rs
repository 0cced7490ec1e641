//! Causal walk-forward window generation.
//!
//! Windows are half-open: train is `[train_start, train_end)` and test is
//! `[train_end + embargo, train_end + embargo + test_window)`. The embargo is a
//! plain duration in the data's sampling unit, so the last train observation
//! always precedes the first test observation.

use crate::domain::error::FoldtraderError;
use crate::domain::price::Timestamp;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Native sampling granularity of the data; window lengths are counts of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingUnit {
    Minute,
    Hour,
    Day,
}

impl SamplingUnit {
    /// `count` units as a duration; `None` when it is out of range.
    pub fn duration(self, count: i64) -> Option<Duration> {
        match self {
            SamplingUnit::Minute => Duration::try_minutes(count),
            SamplingUnit::Hour => Duration::try_hours(count),
            SamplingUnit::Day => Duration::try_days(count),
        }
    }
}

impl FromStr for SamplingUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minute" | "min" | "m" => Ok(SamplingUnit::Minute),
            "hour" | "h" => Ok(SamplingUnit::Hour),
            "day" | "d" => Ok(SamplingUnit::Day),
            other => Err(format!("unknown sampling unit '{other}'")),
        }
    }
}

impl fmt::Display for SamplingUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SamplingUnit::Minute => "minute",
            SamplingUnit::Hour => "hour",
            SamplingUnit::Day => "day",
        })
    }
}

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        TimeRange { start, end }
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        t >= self.start && t < self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// One (train, test) pair of a walk-forward schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub index: usize,
    pub train: TimeRange,
    pub test: TimeRange,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSplitter {
    train_window: Duration,
    test_window: Duration,
    step: Duration,
    embargo: Duration,
}

impl TimeSplitter {
    pub fn new(
        train_window: Duration,
        test_window: Duration,
        step: Duration,
        embargo: Duration,
    ) -> Result<Self, FoldtraderError> {
        let zero = Duration::zero();
        if train_window <= zero {
            return Err(FoldtraderError::config_invalid(
                "walk_forward",
                "train_window",
                "train_window must be positive",
            ));
        }
        if test_window <= zero {
            return Err(FoldtraderError::config_invalid(
                "walk_forward",
                "test_window",
                "test_window must be positive",
            ));
        }
        if step <= zero {
            return Err(FoldtraderError::config_invalid(
                "walk_forward",
                "step",
                "step must be positive",
            ));
        }
        if embargo < zero {
            return Err(FoldtraderError::config_invalid(
                "walk_forward",
                "embargo",
                "embargo must be non-negative",
            ));
        }
        Ok(TimeSplitter {
            train_window,
            test_window,
            step,
            embargo,
        })
    }

    /// Build from counts of `unit`; the embargo defaults to zero.
    pub fn from_units(
        unit: SamplingUnit,
        train_window: i64,
        test_window: i64,
        step: i64,
        embargo: i64,
    ) -> Result<Self, FoldtraderError> {
        let duration = |key: &str, count: i64| {
            unit.duration(count).ok_or_else(|| {
                FoldtraderError::config_invalid(
                    "walk_forward",
                    key,
                    format!("{count} {unit}s is out of range"),
                )
            })
        };
        Self::new(
            duration("train_window", train_window)?,
            duration("test_window", test_window)?,
            duration("step", step)?,
            duration("embargo", embargo)?,
        )
    }

    pub fn embargo(&self) -> Duration {
        self.embargo
    }

    /// Lazily enumerate folds over `index`, which must be strictly ascending.
    pub fn split<'a>(&self, index: &'a [Timestamp]) -> Result<Folds<'a>, FoldtraderError> {
        if let Some(w) = index.windows(2).find(|w| w[1] <= w[0]) {
            return Err(FoldtraderError::invalid_input(format!(
                "timestamp index is not strictly ascending ({} then {})",
                w[0], w[1]
            )));
        }
        Ok(Folds {
            splitter: *self,
            index,
            train_start: index.first().copied(),
            next_index: 0,
        })
    }
}

/// Iterator over the folds of one index. Cloning restarts from the clone point.
#[derive(Debug, Clone)]
pub struct Folds<'a> {
    splitter: TimeSplitter,
    index: &'a [Timestamp],
    train_start: Option<Timestamp>,
    next_index: usize,
}

impl Folds<'_> {
    fn has_points(&self, range: &TimeRange) -> bool {
        let lo = self.index.partition_point(|t| *t < range.start);
        lo < self.index.len() && self.index[lo] < range.end
    }
}

impl Iterator for Folds<'_> {
    type Item = Fold;

    fn next(&mut self) -> Option<Fold> {
        let last = *self.index.last()?;
        loop {
            let train_start = self.train_start?;
            let window = train_start
                .checked_add_signed(self.splitter.train_window)
                .and_then(|train_end| {
                    let test_start = train_end.checked_add_signed(self.splitter.embargo)?;
                    let test_end = test_start.checked_add_signed(self.splitter.test_window)?;
                    Some((train_end, test_start, test_end))
                });

            // Past the representable calendar means past the data too.
            let Some((train_end, test_start, test_end)) = window.filter(|w| w.2 <= last) else {
                self.train_start = None;
                return None;
            };

            self.train_start = train_start.checked_add_signed(self.splitter.step);

            let train = TimeRange::new(train_start, train_end);
            let test = TimeRange::new(test_start, test_end);
            if self.has_points(&train) && self.has_points(&test) {
                let fold = Fold {
                    index: self.next_index,
                    train,
                    test,
                };
                self.next_index += 1;
                return Some(fold);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn daily_index(days: i64) -> Vec<Timestamp> {
        let start = NaiveDate::from_ymd_opt(2022, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..days).map(|d| start + Duration::days(d)).collect()
    }

    fn splitter(train: i64, test: i64, step: i64, embargo: i64) -> TimeSplitter {
        TimeSplitter::from_units(SamplingUnit::Day, train, test, step, embargo).unwrap()
    }

    #[test]
    fn two_year_daily_schedule() {
        let index = daily_index(730);
        let folds: Vec<Fold> = splitter(180, 30, 30, 0).split(&index).unwrap().collect();

        assert_eq!(folds.len(), (730 - 180 - 30) / 30 + 1);
        assert_eq!(folds[0].train.start, index[0]);
        assert_eq!(folds[0].test.start, index[180]);
        assert_eq!(folds[1].train.start, index[30]);
        for (i, fold) in folds.iter().enumerate() {
            assert_eq!(fold.index, i);
        }
    }

    #[test]
    fn last_fold_ends_inside_data() {
        let index = daily_index(730);
        let last = splitter(180, 30, 30, 0).split(&index).unwrap().last().unwrap();
        assert!(last.test.end <= *index.last().unwrap());
    }

    #[test]
    fn data_shorter_than_one_window_yields_no_folds() {
        let index = daily_index(100);
        assert_eq!(splitter(180, 30, 30, 0).split(&index).unwrap().count(), 0);
    }

    #[test]
    fn empty_index_yields_no_folds() {
        assert_eq!(splitter(10, 5, 5, 0).split(&[]).unwrap().count(), 0);
    }

    #[test]
    fn embargo_separates_train_and_test() {
        let index = daily_index(200);
        let folds: Vec<Fold> = splitter(60, 20, 20, 5).split(&index).unwrap().collect();
        assert!(!folds.is_empty());

        for fold in &folds {
            let max_train = index.iter().filter(|t| fold.train.contains(**t)).max().unwrap();
            let min_test = index.iter().filter(|t| fold.test.contains(**t)).min().unwrap();
            assert!(*max_train + Duration::days(5) <= *min_test);
        }
    }

    #[test]
    fn zero_embargo_never_shares_a_timestamp() {
        let index = daily_index(120);
        for fold in splitter(30, 10, 10, 0).split(&index).unwrap() {
            assert!(!index
                .iter()
                .any(|t| fold.train.contains(*t) && fold.test.contains(*t)));
        }
    }

    #[test]
    fn folds_with_empty_ranges_are_skipped() {
        // Gap in the data between day 10 and day 40.
        let mut index = daily_index(10);
        let start = index[0];
        index.extend((40..80).map(|d| start + Duration::days(d)));

        let folds: Vec<Fold> = splitter(10, 10, 10, 0).split(&index).unwrap().collect();
        for fold in &folds {
            assert!(index.iter().any(|t| fold.train.contains(*t)));
            assert!(index.iter().any(|t| fold.test.contains(*t)));
        }
        assert_eq!(folds.iter().map(|f| f.index).collect::<Vec<_>>(), (0..folds.len()).collect::<Vec<_>>());
    }

    #[test]
    fn split_is_restartable() {
        let index = daily_index(365);
        let s = splitter(90, 30, 15, 2);
        let first: Vec<Fold> = s.split(&index).unwrap().collect();
        let second: Vec<Fold> = s.split(&index).unwrap().collect();
        assert_eq!(first, second);

        let mut folds = s.split(&index).unwrap();
        folds.next();
        let resumed = folds.clone();
        assert_eq!(folds.collect::<Vec<_>>(), resumed.collect::<Vec<_>>());
    }

    #[test]
    fn hourly_units() {
        let start = daily_index(1)[0];
        let index: Vec<Timestamp> = (0..24 * 20).map(|h| start + Duration::hours(h)).collect();
        let s = TimeSplitter::from_units(SamplingUnit::Hour, 24 * 7, 24, 24, 1).unwrap();
        let folds: Vec<Fold> = s.split(&index).unwrap().collect();
        assert!(!folds.is_empty());
        assert_eq!(folds[0].test.start, start + Duration::hours(24 * 7 + 1));
    }

    #[test]
    fn rejects_non_ascending_index() {
        let mut index = daily_index(10);
        index.swap(3, 4);
        let err = splitter(3, 2, 1, 0).split(&index).unwrap_err();
        assert!(matches!(err, FoldtraderError::InvalidInput { .. }));
    }

    #[test]
    fn rejects_non_positive_windows() {
        assert!(TimeSplitter::from_units(SamplingUnit::Day, 0, 5, 5, 0).is_err());
        assert!(TimeSplitter::from_units(SamplingUnit::Day, 5, 0, 5, 0).is_err());
        assert!(TimeSplitter::from_units(SamplingUnit::Day, 5, 5, 0, 0).is_err());
        assert!(TimeSplitter::from_units(SamplingUnit::Day, 5, 5, 5, -1).is_err());
    }

    #[test]
    fn rejects_windows_beyond_duration_range() {
        let err = TimeSplitter::from_units(SamplingUnit::Day, i64::MAX, 30, 30, 0).unwrap_err();
        assert!(matches!(err, FoldtraderError::ConfigInvalid { ref key, .. } if key == "train_window"));
        assert!(TimeSplitter::from_units(SamplingUnit::Minute, 5, 5, 5, i64::MIN).is_err());
    }

    #[test]
    fn window_past_the_calendar_ends_iteration() {
        let index = daily_index(400);
        let s = TimeSplitter::from_units(SamplingUnit::Day, 100_000_000, 30, 30, 0).unwrap();
        assert_eq!(s.split(&index).unwrap().count(), 0);

        let s = TimeSplitter::from_units(SamplingUnit::Day, 180, 30, 100_000_000, 0).unwrap();
        assert_eq!(s.split(&index).unwrap().count(), 1);
    }

    #[test]
    fn sampling_unit_parses() {
        assert_eq!("day".parse::<SamplingUnit>(), Ok(SamplingUnit::Day));
        assert_eq!("H".parse::<SamplingUnit>(), Ok(SamplingUnit::Hour));
        assert!("week".parse::<SamplingUnit>().is_err());
    }
}
