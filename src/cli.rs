//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use tracing::info;

use crate::adapters::csv_adapter::CsvSignalStore;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::combiner::CombinerPolicy;
use crate::domain::diagnostics::Diagnostics;
use crate::domain::engine_config::EngineConfig;
use crate::domain::error::FactorwalkError;
use crate::domain::ic::{self, IcSeries, IcSummary, IcWindow};
use crate::domain::orchestrator::{WalkForwardOrchestrator, WalkForwardReport};
use crate::domain::walk_forward::{WalkForwardPeriod, require_periods};
use crate::ports::config_port::ConfigPort;
use crate::ports::signal_store::SignalStore;

#[derive(Parser, Debug)]
#[command(name = "factorwalk", about = "Walk-forward factor combination backtester")]
pub struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full walk-forward backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Restrict to these combination policies (repeatable)
        #[arg(short, long)]
        policy: Vec<String>,
    },
    /// Information-coefficient diagnostics only
    Ic {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        factor: Option<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Print the walk-forward periods
    Periods {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Parse and validate a configuration without reading data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Backing store named by `[store] kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Csv,
    Sqlite,
}

impl FromStr for StoreKind {
    type Err = FactorwalkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(StoreKind::Csv),
            "sqlite" => Ok(StoreKind::Sqlite),
            other => Err(FactorwalkError::ConfigInvalid {
                section: "store".into(),
                key: "kind".into(),
                reason: format!("unknown store kind '{other}' (expected csv or sqlite)"),
            }),
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest { config, policy } => run_backtest(&config, &policy),
        Command::Ic {
            config,
            factor,
            start,
            end,
        } => run_ic(&config, factor.as_deref(), start, end),
        Command::Periods { config } => run_periods(&config),
        Command::Validate { config } => run_validate(&config),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            if e.is_configuration() {
                eprintln!("check the [engine] and [store] sections, or run `factorwalk validate`");
            }
            ExitCode::from(&e)
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, FactorwalkError> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

/// `[engine]` settings with `policies` optionally overridden, validated.
pub fn build_engine_config(
    config: &dyn ConfigPort,
    policies: &[String],
) -> Result<EngineConfig, FactorwalkError> {
    let mut engine = EngineConfig::from_config(config)?;
    if !policies.is_empty() {
        engine.policies = policies
            .iter()
            .map(|p| {
                p.parse::<CombinerPolicy>()
                    .map_err(|e| FactorwalkError::invalid("policies", e))
            })
            .collect::<Result<_, _>>()?;
    }
    engine.validate()?;
    Ok(engine)
}

pub fn store_kind(config: &dyn ConfigPort) -> Result<StoreKind, FactorwalkError> {
    config
        .get_string("store", "kind")
        .as_deref()
        .unwrap_or("csv")
        .parse()
}

fn store_path(config: &dyn ConfigPort) -> Result<String, FactorwalkError> {
    config
        .get_string("store", "path")
        .ok_or_else(|| FactorwalkError::ConfigMissing {
            section: "store".into(),
            key: "path".into(),
        })
}

/// Open the store described by the `[store]` section.
pub fn build_store(config: &dyn ConfigPort) -> Result<Box<dyn SignalStore>, FactorwalkError> {
    match store_kind(config)? {
        StoreKind::Csv => {
            let path = store_path(config)?;
            info!(path = %path, "using CSV signal store");
            Ok(Box::new(CsvSignalStore::new(path)))
        }
        #[cfg(feature = "sqlite")]
        StoreKind::Sqlite => {
            use crate::adapters::sqlite_adapter::SqliteSignalStore;
            info!("using SQLite signal store");
            Ok(Box::new(SqliteSignalStore::from_config(config)?))
        }
        #[cfg(not(feature = "sqlite"))]
        StoreKind::Sqlite => Err(FactorwalkError::ConfigInvalid {
            section: "store".into(),
            key: "kind".into(),
            reason: "built without the sqlite feature".into(),
        }),
    }
}

fn run_backtest(config_path: &Path, policies: &[String]) -> Result<(), FactorwalkError> {
    let adapter = load_config(config_path)?;
    let engine = build_engine_config(&adapter, policies)?;
    let store = build_store(&adapter)?;

    let orchestrator = WalkForwardOrchestrator::new(store.as_ref(), engine)?;
    let report = orchestrator.run()?;

    print_results(&report);
    print_method_summaries(&report);
    let engine = orchestrator.config();
    println!();
    println!("=== Factor IC ({} to {}) ===", engine.start_date, engine.end_date);
    print_ic_summaries(&report.factor_summaries);
    print_diagnostics(&report.diagnostics);
    Ok(())
}

fn run_ic(
    config_path: &Path,
    factor: Option<&str>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(), FactorwalkError> {
    let adapter = load_config(config_path)?;
    let engine = build_engine_config(&adapter, &[])?;
    let store = build_store(&adapter)?;

    let factors: BTreeSet<String> = match factor {
        Some(f) => BTreeSet::from([f.to_string()]),
        None => engine.factors.clone(),
    };
    let window = IcWindow::new(
        start.unwrap_or(engine.start_date),
        end.unwrap_or(engine.end_date),
    );
    if window.start > window.end {
        return Err(FactorwalkError::invalid(
            "start_date",
            format!("{} is after {}", window.start, window.end),
        ));
    }

    let mut diagnostics = Diagnostics::new();
    let series = ic::analyze_factors(
        store.as_ref(),
        &factors,
        &engine.region,
        window,
        &engine.ic_params(),
        &mut diagnostics,
    )?;

    for s in &series {
        print_ic_series(s);
    }
    println!();
    let summaries: Vec<IcSummary> = series.into_iter().map(|s| s.summary).collect();
    print_ic_summaries(&summaries);
    print_diagnostics(&diagnostics);
    Ok(())
}

fn run_periods(config_path: &Path) -> Result<(), FactorwalkError> {
    let adapter = load_config(config_path)?;
    let engine = build_engine_config(&adapter, &[])?;
    let periods = require_periods(
        engine.start_date,
        engine.end_date,
        engine.train_window,
        engine.test_window,
    )?;
    print_periods(&periods);
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), FactorwalkError> {
    let adapter = load_config(config_path)?;
    let engine = build_engine_config(&adapter, &[])?;
    let kind = store_kind(&adapter)?;
    store_path(&adapter)?;
    let periods = require_periods(
        engine.start_date,
        engine.end_date,
        engine.train_window,
        engine.test_window,
    )?;

    let factors: Vec<&str> = engine.factors.iter().map(String::as_str).collect();
    let policies: Vec<&str> = engine.policies.iter().map(|p| p.name()).collect();
    println!("Config validated successfully");
    println!("  factors:      {}", factors.join(", "));
    println!("  region:       {}", engine.region);
    println!("  range:        {} to {}", engine.start_date, engine.end_date);
    println!(
        "  windows:      train {} / test {} ({} periods)",
        engine.train_window,
        engine.test_window,
        periods.len()
    );
    println!("  policies:     {}", policies.join(", "));
    println!("  store:        {:?}", kind);
    Ok(())
}

fn fmt_pct(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}%", v * 100.0))
}

fn fmt_num(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.3}", v))
}

fn print_periods(periods: &[WalkForwardPeriod]) {
    println!(
        "{:>3}  {:<10}  {:<10}  {:<10}  {:<10}",
        "#", "train from", "train to", "test from", "test to"
    );
    for p in periods {
        println!(
            "{:>3}  {:<10}  {:<10}  {:<10}  {:<10}",
            p.index, p.train_start, p.train_end, p.test_start, p.test_end
        );
    }
}

fn print_results(report: &WalkForwardReport) {
    println!("=== Period Results ===");
    println!(
        "{:>3}  {:<20} {:>10} {:>8} {:>10} {:>8} {:>5} {:>8} {:>14}",
        "#", "method", "return", "sharpe", "max dd", "win", "rebal", "holdings", "costs"
    );
    for r in &report.results {
        println!(
            "{:>3}  {:<20} {:>10} {:>8} {:>10} {:>8} {:>5} {:>8.1} {:>14.2}",
            r.period_index,
            r.method_name,
            fmt_pct(Some(r.total_return)),
            fmt_num(r.sharpe_ratio),
            fmt_pct(r.max_drawdown),
            fmt_pct(Some(r.win_rate)),
            r.num_rebalances,
            r.avg_holdings,
            r.transaction_costs
        );
    }
}

fn print_method_summaries(report: &WalkForwardReport) {
    println!();
    println!("=== Policy Comparison ===");
    println!(
        "{:<20} {:>7} {:>10} {:>8} {:>10} {:>8} {:>14} {:>14}",
        "method", "periods", "mean ret", "sharpe", "max dd", "win", "best", "worst"
    );
    for m in &report.method_summaries {
        println!(
            "{:<20} {:>7} {:>10} {:>8} {:>10} {:>8} {:>14} {:>14}",
            m.method,
            m.periods,
            fmt_pct(Some(m.mean_total_return)),
            fmt_num(m.mean_sharpe),
            fmt_pct(m.mean_max_drawdown),
            fmt_pct(Some(m.mean_win_rate)),
            format!("#{} {}", m.best_period.0, fmt_pct(Some(m.best_period.1))),
            format!("#{} {}", m.worst_period.0, fmt_pct(Some(m.worst_period.1))),
        );
    }
}

fn print_ic_summaries(summaries: &[IcSummary]) {
    println!(
        "{:<20} {:>5} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "factor", "n", "mean", "std", "median", "hit", "signif", "t"
    );
    for s in summaries {
        println!(
            "{:<20} {:>5} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
            s.factor_name,
            s.defined,
            fmt_num(s.mean_ic),
            fmt_num(s.std_ic),
            fmt_num(s.median_ic),
            fmt_pct(s.hit_rate),
            fmt_pct(s.significance_rate),
            fmt_num(s.t_stat)
        );
    }
}

fn print_ic_series(series: &IcSeries) {
    println!();
    println!("=== IC: {} ===", series.summary.factor_name);
    println!("{:<10} {:>8} {:>8} {:>5} {:>4}", "date", "ic", "p", "n", "sig");
    for o in &series.observations {
        println!(
            "{:<10} {:>8} {:>8} {:>5} {:>4}",
            o.date,
            fmt_num(o.ic),
            fmt_num(o.p_value),
            o.sample_size,
            if o.significant { "*" } else { "" }
        );
    }
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    if diagnostics.is_empty() {
        return;
    }
    eprintln!(
        "{} diagnostics ({} data gaps, {} empty universes)",
        diagnostics.len(),
        diagnostics.data_gaps(),
        diagnostics.empty_universes()
    );
    for d in diagnostics.entries() {
        tracing::debug!("{d}");
    }
}
