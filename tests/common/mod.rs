#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use foldtrader::domain::allocation::Allocation;
use foldtrader::domain::price::{PriceTable, Timestamp};
use foldtrader::domain::signal::Signal;
use std::fs;
use std::path::{Path, PathBuf};

pub fn start() -> Timestamp {
    NaiveDate::from_ymd_opt(2022, 1, 3)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// `n` consecutive calendar days from [`start`].
pub fn calendar_days(n: usize) -> Vec<Timestamp> {
    (0..n as i64).map(|i| start() + Duration::days(i)).collect()
}

/// `n` weekdays from [`start`], skipping Saturdays and Sundays.
pub fn business_days(n: usize) -> Vec<Timestamp> {
    let mut days = Vec::with_capacity(n);
    let mut t = start();
    while days.len() < n {
        if !matches!(t.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(t);
        }
        t += Duration::days(1);
    }
    days
}

pub fn price_table(asset: &str, timestamps: &[Timestamp], closes: &[f64]) -> PriceTable {
    let series: Vec<_> = timestamps.iter().copied().zip(closes.iter().copied()).collect();
    PriceTable::from_series(asset, &series).unwrap()
}

/// Oscillating close series with a slight upward drift.
pub fn wave_prices(asset: &str, timestamps: &[Timestamp]) -> PriceTable {
    let closes: Vec<f64> = (0..timestamps.len())
        .map(|i| 100.0 + 5.0 * (i as f64 / 9.0).sin() + 0.01 * i as f64)
        .collect();
    price_table(asset, timestamps, &closes)
}

/// One signal every `every` timestamps, pointing along the wave's slope.
pub fn wave_signals(asset: &str, timestamps: &[Timestamp], every: usize) -> Vec<Signal> {
    timestamps
        .iter()
        .enumerate()
        .step_by(every)
        .map(|(i, t)| {
            let direction = if (i as f64 / 9.0).cos() > 0.0 { 1.0 } else { -1.0 };
            Signal::new(*t, asset, direction, 0.9, every as u32, "wave").unwrap()
        })
        .collect()
}

pub fn allocation(t: Timestamp, asset: &str, weight: f64) -> Allocation {
    Allocation::new(t, asset, weight)
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

pub fn prices_csv(asset: &str, table: &PriceTable) -> String {
    let mut out = String::from("timestamp,asset,close\n");
    for (t, row) in table.iter() {
        if let Some(close) = row.get(asset) {
            out.push_str(&format!("{},{},{}\n", t.format("%Y-%m-%d"), asset, close));
        }
    }
    out
}

pub fn signals_csv(signals: &[Signal]) -> String {
    let mut out = String::from("timestamp,asset,direction,probability,horizon,source\n");
    for s in signals {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            s.timestamp.format("%Y-%m-%d"),
            s.asset,
            s.direction,
            s.probability,
            s.horizon,
            s.source
        ));
    }
    out
}

pub const RUN_INI: &str = r#"
[backtest]
initial_capital = 100000
commission_bps = 10
slippage_bps = 5

[walk_forward]
unit = day
train_window = 180
test_window = 30
step = 30
n_trials = 5
search = random
seed = 11

[strategy]
kind = probabilistic_trend
param.confidence_threshold = float:0.55:0.85:0.05
param.max_cap = float:0.1:0.5:0.1
"#;
