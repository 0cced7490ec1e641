//! CSV report writer: one flat table per output.

use crate::domain::aggregate::WfoSummary;
use crate::domain::error::FoldtraderError;
use crate::domain::params::{ParamSet, format_params};
use crate::domain::portfolio::{PortfolioState, Trade};
use crate::domain::price::Timestamp;
use crate::domain::walk_forward::FoldResult;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_timestamp(t: Timestamp) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

fn io_error(e: csv::Error) -> FoldtraderError {
    FoldtraderError::Io(e.into())
}

#[derive(Serialize)]
struct StateRow {
    timestamp: String,
    cash: f64,
    equity: f64,
    positions: String,
}

#[derive(Serialize)]
struct TradeRow<'a> {
    timestamp: String,
    asset: &'a str,
    quantity: f64,
    execution_price: f64,
    cost: f64,
    direction: i8,
}

#[derive(Serialize)]
struct FoldRow {
    fold_index: usize,
    train_start: String,
    train_end: String,
    test_start: String,
    test_end: String,
    oos_sharpe: f64,
    oos_return: f64,
    in_sample_score: f64,
    trade_count: usize,
    status: String,
    best_params: String,
}

#[derive(Serialize)]
struct SummaryRow {
    metric: String,
    value: String,
}

impl SummaryRow {
    fn new(metric: &str, value: impl ToString) -> Self {
        SummaryRow {
            metric: metric.to_string(),
            value: value.to_string(),
        }
    }
}

fn write_rows<T: Serialize>(rows: impl IntoIterator<Item = T>, path: &Path) -> Result<(), FoldtraderError> {
    let mut writer = csv::Writer::from_path(path).map_err(io_error)?;
    for row in rows {
        writer.serialize(row).map_err(io_error)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReportAdapter;

impl ReportPort for CsvReportAdapter {
    fn write_states(&self, states: &[PortfolioState], path: &Path) -> Result<(), FoldtraderError> {
        write_rows(
            states.iter().map(|s| StateRow {
                timestamp: format_timestamp(s.timestamp),
                cash: s.cash,
                equity: s.equity,
                positions: s
                    .positions
                    .iter()
                    .map(|(asset, qty)| format!("{asset}={qty}"))
                    .collect::<Vec<_>>()
                    .join(" "),
            }),
            path,
        )
    }

    fn write_trades(&self, trades: &[Trade], path: &Path) -> Result<(), FoldtraderError> {
        write_rows(
            trades.iter().map(|t| TradeRow {
                timestamp: format_timestamp(t.timestamp),
                asset: &t.asset,
                quantity: t.quantity,
                execution_price: t.execution_price,
                cost: t.cost,
                direction: t.direction,
            }),
            path,
        )
    }

    fn write_folds(&self, folds: &[FoldResult], path: &Path) -> Result<(), FoldtraderError> {
        write_rows(
            folds.iter().map(|f| FoldRow {
                fold_index: f.fold_index,
                train_start: format_timestamp(f.train_window.start),
                train_end: format_timestamp(f.train_window.end),
                test_start: format_timestamp(f.test_window.start),
                test_end: format_timestamp(f.test_window.end),
                oos_sharpe: f.oos_sharpe,
                oos_return: f.oos_return,
                in_sample_score: f.in_sample_score,
                trade_count: f.trade_count,
                status: f.status.to_string(),
                best_params: format_params(&f.best_params),
            }),
            path,
        )
    }

    fn write_summary(
        &self,
        summary: &WfoSummary,
        params: Option<&ParamSet>,
        path: &Path,
    ) -> Result<(), FoldtraderError> {
        let mut rows = vec![
            SummaryRow::new("fold_count", summary.fold_count),
            SummaryRow::new("completed_folds", summary.completed_folds),
            SummaryRow::new("mean_oos_sharpe", summary.mean_oos_sharpe),
            SummaryRow::new("median_oos_sharpe", summary.median_oos_sharpe),
            SummaryRow::new("min_oos_sharpe", summary.min_oos_sharpe),
            SummaryRow::new("std_oos_sharpe", summary.std_oos_sharpe),
            SummaryRow::new("mean_oos_return", summary.mean_oos_return),
            SummaryRow::new("total_oos_return", summary.total_oos_return),
            SummaryRow::new("robustness_score", summary.robustness_score),
            SummaryRow::new("total_trades", summary.total_trades),
        ];
        if let Some(params) = params {
            rows.extend(
                params
                    .iter()
                    .map(|(name, value)| SummaryRow::new(&format!("param.{name}"), value)),
            );
        }
        write_rows(rows, path)
    }
}
