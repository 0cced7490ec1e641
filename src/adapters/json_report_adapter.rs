//! JSON report writer.
//!
//! Non-finite floats (an infinite profit factor, a failed in-sample score)
//! are written as `null`.

use crate::domain::aggregate::WfoSummary;
use crate::domain::error::FoldtraderError;
use crate::domain::params::ParamSet;
use crate::domain::portfolio::{PortfolioState, Trade};
use crate::domain::walk_forward::FoldResult;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Serialize)]
struct SummaryDocument<'a> {
    summary: &'a WfoSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    best_params: Option<&'a ParamSet>,
}

fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<(), FoldtraderError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| FoldtraderError::Io(e.into()))?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReportAdapter;

impl ReportPort for JsonReportAdapter {
    fn write_states(&self, states: &[PortfolioState], path: &Path) -> Result<(), FoldtraderError> {
        write_json(states, path)
    }

    fn write_trades(&self, trades: &[Trade], path: &Path) -> Result<(), FoldtraderError> {
        write_json(trades, path)
    }

    fn write_folds(&self, folds: &[FoldResult], path: &Path) -> Result<(), FoldtraderError> {
        write_json(folds, path)
    }

    fn write_summary(
        &self,
        summary: &WfoSummary,
        params: Option<&ParamSet>,
        path: &Path,
    ) -> Result<(), FoldtraderError> {
        write_json(
            &SummaryDocument {
                summary,
                best_params: params,
            },
            path,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::splitter::TimeRange;
    use crate::domain::walk_forward::FoldStatus;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn fold(index: usize, in_sample_score: f64) -> FoldResult {
        let day = |d: u32| {
            NaiveDate::from_ymd_opt(2023, 6, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        let mut best_params = ParamSet::new();
        best_params.insert("threshold".into(), 0.65);
        FoldResult {
            fold_index: index,
            train_window: TimeRange::new(day(1), day(11)),
            test_window: TimeRange::new(day(11), day(16)),
            oos_sharpe: 0.9,
            oos_return: 0.02,
            best_params,
            in_sample_score,
            trade_count: 2,
            status: FoldStatus::Completed,
        }
    }

    #[test]
    fn folds_are_a_json_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("folds.json");
        JsonReportAdapter
            .write_folds(&[fold(0, 1.5), fold(1, 1.1)], &path)
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let folds = value.as_array().unwrap();
        assert_eq!(folds.len(), 2);
        assert_eq!(folds[1]["fold_index"], 1);
        assert_eq!(folds[0]["best_params"]["threshold"], 0.65);
        assert_eq!(folds[0]["status"], "Completed");
    }

    #[test]
    fn infinite_scores_become_null() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("folds.json");
        JsonReportAdapter
            .write_folds(&[fold(0, f64::INFINITY)], &path)
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value[0]["in_sample_score"].is_null());
    }

    #[test]
    fn summary_omits_missing_params() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.json");
        let summary = WfoSummary {
            fold_count: 1,
            completed_folds: 0,
            mean_oos_sharpe: 0.0,
            median_oos_sharpe: 0.0,
            min_oos_sharpe: 0.0,
            std_oos_sharpe: 0.0,
            mean_oos_return: 0.0,
            total_oos_return: 0.0,
            robustness_score: 0.0,
            total_trades: 0,
        };
        JsonReportAdapter.write_summary(&summary, None, &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["fold_count"], 1);
        assert!(value.get("best_params").is_none());
    }
}
