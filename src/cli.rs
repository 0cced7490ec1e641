//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::report_adapter_for;
use crate::domain::aggregate::{aggregate, best_params_across_folds};
use crate::domain::backtest::BacktestResult;
use crate::domain::config_validation::{
    RunConfig, load_backtest_settings, load_risk_settings, load_run_config,
    load_walk_forward_settings,
};
use crate::domain::error::FoldtraderError;
use crate::domain::objective::{ObjectiveConfig, max_drawdown, sharpe_ratio, sortino_ratio};
use crate::domain::params::format_params;
use crate::domain::price::PriceTable;
use crate::domain::walk_forward::FoldResult;
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "foldtrader", about = "Walk-forward optimization and backtesting")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Optimize on rolling train windows and score each out of sample
    WalkForward {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        prices: PathBuf,
        #[arg(long)]
        signals: PathBuf,
        /// Per-fold results (.csv or .json)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Cross-fold summary (.csv or .json)
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Replay a fixed allocation schedule
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        prices: PathBuf,
        #[arg(long)]
        allocations: PathBuf,
        #[arg(long)]
        states: Option<PathBuf>,
        #[arg(long)]
        trades: Option<PathBuf>,
    },
    /// Print the fold schedule for a price file
    Splits {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        prices: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::WalkForward {
            config,
            prices,
            signals,
            output,
            summary,
        } => run_walk_forward(
            &config,
            &prices,
            &signals,
            output.as_deref(),
            summary.as_deref(),
        ),
        Command::Backtest {
            config,
            prices,
            allocations,
            states,
            trades,
        } => run_backtest(
            &config,
            &prices,
            &allocations,
            states.as_deref(),
            trades.as_deref(),
        ),
        Command::Splits { config, prices } => run_splits(&config, &prices),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = FoldtraderError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(err: FoldtraderError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

fn load_prices(data: &dyn DataPort, path: &Path) -> Result<PriceTable, FoldtraderError> {
    eprintln!("Loading prices from {}", path.display());
    let prices = data.fetch_prices(&path.to_string_lossy())?;
    if prices.is_empty() {
        return Err(FoldtraderError::Data {
            reason: format!("{} has no price rows", path.display()),
        });
    }
    eprintln!(
        "  {} timestamps, {} assets",
        prices.len(),
        prices.assets().len()
    );
    Ok(prices)
}

fn run_walk_forward(
    config_path: &Path,
    prices_path: &Path,
    signals_path: &Path,
    output_path: Option<&Path>,
    summary_path: Option<&Path>,
) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let run_config = match load_run_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let optimizer = match run_config.walk_forward_optimizer() {
        Ok(o) => o,
        Err(e) => return fail(e),
    };

    // Stage 2: Load data
    let data = CsvAdapter::default();
    let prices = match load_prices(&data, prices_path) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };
    eprintln!("Loading signals from {}", signals_path.display());
    let signals = match data.fetch_signals(&signals_path.to_string_lossy()) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    eprintln!("  {} signals", signals.len());

    // Stage 3: Run folds
    let wf = &run_config.walk_forward;
    eprintln!(
        "Running walk-forward: {} strategy, {} search, {} trials per fold, objective {}",
        run_config.strategy.kind,
        wf.search,
        wf.n_trials,
        wf.objective.label(),
    );
    let folds = match optimizer.run(&prices, &signals, &run_config.strategy.space, wf.n_trials) {
        Ok(f) => f,
        Err(e) => return fail(e),
    };

    // Stage 4: Summarize
    print_folds(&folds);
    let summary = aggregate(&folds);
    let best = best_params_across_folds(&folds);
    match &summary {
        Some(s) => {
            eprintln!("\n=== Walk-Forward Summary ===");
            eprintln!("Folds:            {} ({} completed)", s.fold_count, s.completed_folds);
            eprintln!("Mean OOS Sharpe:  {:.2}", s.mean_oos_sharpe);
            eprintln!("Median OOS Sharpe: {:.2}", s.median_oos_sharpe);
            eprintln!("Min OOS Sharpe:   {:.2}", s.min_oos_sharpe);
            eprintln!("Robustness:       {:.2}", s.robustness_score);
            eprintln!("Mean OOS Return:  {:.2}%", s.mean_oos_return * 100.0);
            eprintln!("Total Trades:     {}", s.total_trades);
            if let Some(params) = &best {
                eprintln!("Latest Params:    {}", format_params(params));
            }
        }
        None => eprintln!("\nNo folds fit in the price history"),
    }

    // Stage 5: Write reports
    if let Some(path) = output_path {
        if let Err(e) = report_adapter_for(path).write_folds(&folds, path) {
            return fail(e);
        }
        eprintln!("\nFolds written to: {}", path.display());
    }
    if let (Some(path), Some(s)) = (summary_path, &summary) {
        if let Err(e) = report_adapter_for(path).write_summary(s, best.as_ref(), path) {
            return fail(e);
        }
        eprintln!("Summary written to: {}", path.display());
    }
    ExitCode::SUCCESS
}

fn print_folds(folds: &[FoldResult]) {
    if folds.is_empty() {
        return;
    }
    eprintln!("\n=== Folds ===");
    for f in folds {
        if f.is_completed() {
            eprintln!(
                "  #{:<3} test {} to {}  sharpe {:>6.2}  return {:>6.2}%  trades {:<4} {}",
                f.fold_index,
                f.test_window.start.date(),
                f.test_window.end.date(),
                f.oos_sharpe,
                f.oos_return * 100.0,
                f.trade_count,
                format_params(&f.best_params),
            );
        } else {
            eprintln!(
                "  #{:<3} test {} to {}  {}",
                f.fold_index,
                f.test_window.start.date(),
                f.test_window.end.date(),
                f.status,
            );
        }
    }
}

fn run_backtest(
    config_path: &Path,
    prices_path: &Path,
    allocations_path: &Path,
    states_path: Option<&Path>,
    trades_path: Option<&Path>,
) -> ExitCode {
    // Stage 1: Load config; walk-forward settings are not needed here
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let settings = match load_backtest_settings(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let risk = match load_risk_settings(&adapter) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };
    let engine = match settings.engine(risk.as_ref()) {
        Ok(e) => e,
        Err(e) => return fail(e),
    };

    // Stage 2: Load data
    let data = CsvAdapter::default();
    let prices = match load_prices(&data, prices_path) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };
    eprintln!("Loading allocations from {}", allocations_path.display());
    let allocations = match data.fetch_allocations(&allocations_path.to_string_lossy()) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };

    // Stage 3: Run
    eprintln!(
        "Running backtest: {} allocations, {} to {}",
        allocations.len(),
        prices.first_timestamp().map(|t| t.to_string()).unwrap_or_default(),
        prices.last_timestamp().map(|t| t.to_string()).unwrap_or_default(),
    );
    let result = engine.run(&prices, &allocations);
    print_backtest_summary(&result, &settings.objective);

    // Stage 4: Write reports
    if let Some(path) = states_path {
        if let Err(e) = report_adapter_for(path).write_states(&result.states, path) {
            return fail(e);
        }
        eprintln!("\nStates written to: {}", path.display());
    }
    if let Some(path) = trades_path {
        if let Err(e) = report_adapter_for(path).write_trades(&result.trades, path) {
            return fail(e);
        }
        eprintln!("Trades written to: {}", path.display());
    }
    ExitCode::SUCCESS
}

fn print_backtest_summary(result: &BacktestResult, config: &ObjectiveConfig) {
    let returns = result.returns();
    eprintln!("\n=== Backtest Results ===");
    eprintln!("Final Equity:     {:.2}", result.final_equity());
    eprintln!("Total Return:     {:.2}%", result.total_return() * 100.0);
    eprintln!(
        "Sharpe Ratio:     {:.2}",
        sharpe_ratio(&returns, config.risk_free_rate, config.periods_per_year)
    );
    eprintln!(
        "Sortino Ratio:    {:.2}",
        sortino_ratio(
            &returns,
            config.risk_free_rate,
            config.target_return,
            config.periods_per_year
        )
    );
    eprintln!(
        "Max Drawdown:     -{:.1}%",
        max_drawdown(&returns, returns.len()) * 100.0
    );
    eprintln!("Total Trades:     {}", result.trades.len());
    if result.skipped_rebalances > 0 {
        eprintln!("Skipped (no price): {}", result.skipped_rebalances);
    }
    if result.unpriced_timestamps > 0 {
        eprintln!("Ignored (no price row): {}", result.unpriced_timestamps);
    }
    if result.risk_freezes > 0 {
        eprintln!("Risk Freezes:     {}", result.risk_freezes);
    }
}

fn run_splits(config_path: &Path, prices_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let splitter = match load_walk_forward_settings(&adapter).and_then(|wf| wf.splitter()) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let prices = match load_prices(&CsvAdapter::default(), prices_path) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };
    let folds = match splitter.split(prices.timestamps()) {
        Ok(f) => f,
        Err(e) => return fail(e),
    };

    let mut count = 0;
    for fold in folds {
        println!("{}\ttrain {}\ttest {}", fold.index, fold.train, fold.test);
        count += 1;
    }
    eprintln!("{} folds", count);
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let run_config = match load_run_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    if let Err(e) = run_config.walk_forward_optimizer() {
        return fail(e);
    }

    describe(&run_config);
    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn describe(run_config: &RunConfig) {
    let bt = &run_config.backtest;
    eprintln!("\nBacktest:");
    eprintln!("  initial_capital: {}", bt.initial_capital);
    eprintln!(
        "  commission:      {} bps",
        bt.execution.commission_rate * 10_000.0
    );
    eprintln!("  slippage:        {} bps", bt.execution.slippage_rate * 10_000.0);

    let wf = &run_config.walk_forward;
    eprintln!("\nWalk-forward:");
    eprintln!(
        "  windows:         train {} / test {} / step {} / embargo {} ({})",
        wf.train_window, wf.test_window, wf.step, wf.embargo, wf.unit
    );
    eprintln!("  search:          {} x {} trials", wf.search, wf.n_trials);
    eprintln!("  objective:       {}", wf.objective.label());

    eprintln!("\nStrategy: {}", run_config.strategy.kind);
    for spec in run_config.strategy.space.specs() {
        eprintln!("  param {}", spec);
    }
    for (name, value) in &run_config.strategy.fixed {
        eprintln!("  fixed {} = {}", name, value);
    }

    match &run_config.risk {
        Some(r) => eprintln!(
            "\nRisk: max_drawdown {} vol_target {} max_leverage {} position_limit {} ({:?} clamp)",
            r.profile.max_drawdown,
            r.profile.vol_target,
            r.profile.max_leverage,
            r.profile.position_limit_pct,
            r.profile.clamp_mode,
        ),
        None => eprintln!("\nRisk: disabled"),
    }
}
