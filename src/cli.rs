//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestConfig, BacktestJob, BacktestResult, run_backtest, run_batch};
use crate::domain::config_validation::{
    read_bool, read_date, read_f64, read_optional, read_parsed, read_period_list, read_symbols,
    read_usize, validate_all,
};
use crate::domain::error::SwingtraderError;
use crate::domain::execution::CostModel;
use crate::domain::indicator::snapshot::IndicatorSettings;
use crate::domain::metrics::{PerformanceReport, drawdown_window};
use crate::domain::position::ExitReason;
use crate::domain::preset::Preset;
use crate::domain::signal::{SignalKind, build_generator};
use crate::domain::strategy::{StopMode, StrategyConfig};
use crate::domain::symbol_data::{SymbolData, precompute};
use crate::domain::trailing::TrailingRule;
use crate::domain::universe::{LoadedUniverse, load_benchmark, load_universe};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "swingtrader", about = "Multi-signal swing trade simulator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Preset to start from; INI keys still override it
        #[arg(short, long)]
        preset: Option<Preset>,
        /// Directory for trades.csv, equity.csv and summary.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Run every preset over the same universe and compare
    Compare {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the latest indicator state and signals per symbol
    Scan {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data range for the configured symbol(s)
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
    /// List the named presets
    Presets,
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            preset,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, preset)
            } else {
                run_backtest_command(&config, preset, output.as_deref())
            }
        }
        Command::Compare { config } => run_compare(&config),
        Command::Scan { config } => run_scan(&config),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, symbol } => run_info(&config, symbol.as_deref()),
        Command::Presets => {
            run_presets();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, SwingtraderError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, SwingtraderError> {
    const S: &str = "backtest";
    let defaults = BacktestConfig::default();
    let default_costs = CostModel::default();

    let costs = CostModel {
        commission: read_f64(config, "costs", "commission")?.unwrap_or(default_costs.commission),
        tax: read_f64(config, "costs", "tax")?.unwrap_or(default_costs.tax),
        slippage: read_f64(config, "costs", "slippage")?.unwrap_or(default_costs.slippage),
        commission_flat: read_f64(config, "costs", "commission_flat")?
            .unwrap_or(default_costs.commission_flat),
    };

    Ok(BacktestConfig {
        start_date: read_date(config, S, "start_date")?.unwrap_or(defaults.start_date),
        end_date: read_date(config, S, "end_date")?.unwrap_or(defaults.end_date),
        initial_capital: read_f64(config, S, "initial_capital")?
            .unwrap_or(defaults.initial_capital),
        costs,
        allow_shorting: read_bool(config, S, "allow_shorting")?.unwrap_or(defaults.allow_shorting),
        risk_free_rate: read_f64(config, S, "risk_free_rate")?.unwrap_or(defaults.risk_free_rate),
        periods_per_year: read_f64(config, S, "periods_per_year")?
            .unwrap_or(defaults.periods_per_year),
    })
}

/// Start from `preset` (or `[strategy] preset`, or the default preset) and
/// apply every key present in the INI on top.
pub fn build_strategy_config(
    config: &dyn ConfigPort,
    preset: Option<Preset>,
) -> Result<StrategyConfig, SwingtraderError> {
    const S: &str = "strategy";
    const I: &str = "indicators";

    let preset = match preset {
        Some(p) => p,
        None => read_parsed::<Preset>(config, S, "preset", "a known preset")?.unwrap_or_default(),
    };
    let mut strategy = preset.strategy();

    if let Some(signal) = read_parsed::<SignalKind>(config, S, "signal", "a known signal")? {
        strategy.signal = signal;
    }

    let risk = &mut strategy.risk;
    if let Some(v) = read_f64(config, S, "position_size")? {
        risk.position_size = v;
    }
    if let Some(v) = read_parsed::<StopMode>(config, S, "stop_mode", "atr or structural")? {
        risk.stop_mode = v;
    }
    if let Some(v) = read_f64(config, S, "stop_atr_mult")? {
        risk.stop_atr_mult = v;
    }
    risk.tp1_r = read_optional(config, S, "tp1_r", risk.tp1_r, "a number or none")?;
    if let Some(v) = read_f64(config, S, "tp2_r")? {
        risk.tp2_r = v;
    }
    if let Some(v) = read_bool(config, S, "breakeven_on_tp1")? {
        risk.breakeven_on_tp1 = v;
    }
    if let Some(v) = read_parsed::<TrailingRule>(config, S, "trailing", "a trigger:lock list")? {
        risk.trailing = v;
    }
    risk.max_holding_bars = read_optional(
        config,
        S,
        "max_holding_bars",
        risk.max_holding_bars,
        "a bar count or none",
    )?;
    if let Some(v) = read_bool(config, S, "quadrant_exit")? {
        risk.quadrant_exit = v;
    }
    if let Some(v) = read_f64(config, S, "atr_fallback")? {
        risk.atr_fallback = v;
    }

    let params = &mut strategy.signal_params;
    if let Some(v) = read_parsed::<u32>(config, S, "emergence_days", "a day count")? {
        params.emergence_days = v;
    }
    if let Some(v) = read_f64(config, I, "squeeze_threshold")? {
        params.squeeze_threshold = v;
    }
    if let Some(v) = read_f64(config, I, "pullback_band_atr")? {
        params.pullback_band_atr = v;
    }
    if let Some(v) = read_bool(config, I, "pullback_quadrant_gate")? {
        params.pullback_quadrant_gate = v;
    }

    Ok(strategy)
}

pub fn build_indicator_settings(config: &dyn ConfigPort) -> Result<IndicatorSettings, SwingtraderError> {
    const I: &str = "indicators";
    let d = IndicatorSettings::default();
    Ok(IndicatorSettings {
        band_period: read_usize(config, I, "bb_period")?.unwrap_or(d.band_period),
        band_std: read_f64(config, I, "bb_std")?.unwrap_or(d.band_std),
        atr_period: read_usize(config, I, "atr_period")?.unwrap_or(d.atr_period),
        oscillator_period: read_usize(config, I, "rsi_period")?.unwrap_or(d.oscillator_period),
        ema_stack: read_period_list(config, I, "ema_stack")?.unwrap_or(d.ema_stack),
        pullback_fast: read_usize(config, I, "pullback_fast")?.unwrap_or(d.pullback_fast),
        pullback_slow: read_usize(config, I, "pullback_slow")?.unwrap_or(d.pullback_slow),
        ratio_short: read_usize(config, I, "ratio_short")?.unwrap_or(d.ratio_short),
        ratio_long: read_usize(config, I, "ratio_long")?.unwrap_or(d.ratio_long),
        momentum_short: read_usize(config, I, "momentum_short")?.unwrap_or(d.momentum_short),
        momentum_long: read_usize(config, I, "momentum_long")?.unwrap_or(d.momentum_long),
    })
}

fn config_value(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn data_adapter(config: &dyn ConfigPort) -> Result<CsvAdapter, SwingtraderError> {
    let dir = config_value(config, "backtest", "data_dir")
        .ok_or_else(|| SwingtraderError::missing("backtest", "data_dir"))?;
    Ok(CsvAdapter::new(PathBuf::from(dir)))
}

fn benchmark_symbol(config: &dyn ConfigPort) -> Option<String> {
    config_value(config, "backtest", "benchmark")
}

/// Validated settings plus the loaded, precomputed universe.
struct Prepared {
    backtest: BacktestConfig,
    universe: Vec<SymbolData>,
    has_benchmark: bool,
}

fn prepare(
    config: &dyn ConfigPort,
    data_port: &dyn DataPort,
    require_benchmark: bool,
) -> Result<Prepared, SwingtraderError> {
    let backtest = build_backtest_config(config)?;
    let settings = build_indicator_settings(config)?;
    let symbols = read_symbols(config)?;

    eprintln!("Loading {} symbols...", symbols.len());
    let LoadedUniverse { symbols, skipped } =
        load_universe(data_port, symbols, backtest.start_date, backtest.end_date)?;
    for s in &skipped {
        eprintln!("warning: skipped {} ({:?})", s.symbol, s.reason);
    }

    let benchmark = match benchmark_symbol(config) {
        Some(symbol) => Some(load_benchmark(
            data_port,
            &symbol,
            backtest.start_date,
            backtest.end_date,
        )?),
        None if require_benchmark => return Err(SwingtraderError::missing("backtest", "benchmark")),
        None => None,
    };

    let has_benchmark = benchmark.is_some();
    let universe = precompute(symbols, benchmark.as_deref(), &settings);
    Ok(Prepared {
        backtest,
        universe,
        has_benchmark,
    })
}

fn output_dir(config: &dyn ConfigPort, cli_output: Option<&Path>) -> PathBuf {
    match cli_output {
        Some(p) => p.to_path_buf(),
        None => config_value(config, "report", "output_dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("output")),
    }
}

fn run_backtest_command(
    config_path: &Path,
    preset: Option<Preset>,
    output: Option<&Path>,
) -> Result<(), SwingtraderError> {
    let config = load_config(config_path)?;
    validate_all(&config)?;

    let strategy = build_strategy_config(&config, preset)?;
    eprintln!("Strategy: {} (signal {})", strategy.name, strategy.signal);

    let data_port = data_adapter(&config)?;
    let prepared = prepare(&config, &data_port, strategy.needs_benchmark())?;
    let bt = &prepared.backtest;

    eprintln!("Running backtest: {} symbols", prepared.universe.len());
    let result = run_backtest(&prepared.universe, bt, &strategy);
    let report = PerformanceReport::compute(&result, bt.risk_free_rate, bt.periods_per_year);

    print_summary(&result, &report);

    let dir = output_dir(&config, output);
    CsvReportAdapter.write(&result, &report, &dir)?;
    eprintln!("\nReport written to: {}", dir.display());
    Ok(())
}

fn print_summary(result: &BacktestResult, report: &PerformanceReport) {
    eprintln!("\n=== Aggregate Results ===");
    eprintln!("Final Equity:     {:.2}", report.final_equity);
    eprintln!("Total Return:     {:.2}%", report.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", report.annualized_return * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", report.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", report.sortino_ratio);
    eprintln!("Calmar Ratio:     {:.2}", report.calmar_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", report.max_drawdown * 100.0);
    if let Some((peak, trough)) = drawdown_window(&result.equity_curve) {
        eprintln!("  Peak → Trough:  {} → {}", peak, trough);
    }
    eprintln!("Total Trades:     {}", report.total_trades);
    eprintln!("Win Rate:         {:.1}%", report.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", report.profit_factor);
    eprintln!("Expectancy:       {:.2}", report.expectancy);
    eprintln!("Avg Holding:      {:.1} bars", report.avg_holding_bars);
    eprintln!("Total Costs:      {:.2}", report.total_costs);

    if report.total_trades > 0 {
        eprintln!("\n=== Exit Reasons ===");
        for reason in ExitReason::ALL {
            let count = report.exit_count(reason);
            if count > 0 {
                eprintln!("  {:<14} {}", reason, count);
            }
        }
    }

    if !report.per_symbol.is_empty() {
        eprintln!("\n=== Per-Symbol Summary ===");
        for s in &report.per_symbol {
            let pnl_sign = if s.total_pnl >= 0.0 { "+" } else { "" };
            eprintln!(
                "  {}:  {} trades, {:.1}% win rate, {}{:.0}",
                s.symbol,
                s.total_trades,
                s.win_rate * 100.0,
                pnl_sign,
                s.total_pnl,
            );
        }
    }

    if !result.quarantined.is_empty() {
        eprintln!("\nQuarantined: {}", result.quarantined.join(", "));
    }
}

pub fn run_dry_run(config_path: &Path, preset: Option<Preset>) -> Result<(), SwingtraderError> {
    let config = load_config(config_path)?;
    validate_all(&config)?;
    eprintln!("Config validated successfully");

    let bt = build_backtest_config(&config)?;
    let strategy = build_strategy_config(&config, preset)?;
    let settings = build_indicator_settings(&config)?;
    let symbols = read_symbols(&config)?;
    print_strategy(&strategy);
    eprintln!("Indicators: {:?}", settings);

    if strategy.needs_benchmark() && benchmark_symbol(&config).is_none() {
        return Err(SwingtraderError::missing("backtest", "benchmark"));
    }

    let data_port = data_adapter(&config)?;
    for symbol in &symbols {
        print_data_range(&data_port, symbol);
    }
    eprintln!(
        "\nWould run {} on {} symbols with capital {:.2}",
        strategy.name,
        symbols.len(),
        bt.initial_capital
    );
    Ok(())
}

fn print_strategy(strategy: &StrategyConfig) {
    let r = &strategy.risk;
    eprintln!("Strategy:         {}", strategy.name);
    eprintln!("  signal:         {}", strategy.signal);
    eprintln!("  position size:  {:.2}%", r.position_size * 100.0);
    eprintln!("  stop:           {} x{}", r.stop_mode, r.stop_atr_mult);
    match r.tp1_r {
        Some(tp1) => eprintln!("  targets:        {}R / {}R", tp1, r.tp2_r),
        None => eprintln!("  targets:        none / {}R", r.tp2_r),
    }
    eprintln!("  breakeven:      {}", r.breakeven_on_tp1);
    eprintln!("  trailing:       {}", r.trailing);
    match r.max_holding_bars {
        Some(n) => eprintln!("  max holding:    {} bars", n),
        None => eprintln!("  max holding:    none"),
    }
    eprintln!("  quadrant exit:  {}", r.quadrant_exit);
}

pub fn run_validate(config_path: &Path) -> Result<(), SwingtraderError> {
    let config = load_config(config_path)?;
    validate_all(&config)?;
    let strategy = build_strategy_config(&config, None)?;
    build_backtest_config(&config)?;
    build_indicator_settings(&config)?;
    print_strategy(&strategy);
    eprintln!("\nConfiguration is valid.");
    Ok(())
}

fn run_compare(config_path: &Path) -> Result<(), SwingtraderError> {
    let config = load_config(config_path)?;
    validate_all(&config)?;

    let data_port = data_adapter(&config)?;
    let prepared = prepare(&config, &data_port, false)?;

    let mut jobs = Vec::new();
    for preset in Preset::ALL {
        let strategy = build_strategy_config(&config, Some(preset))?;
        if strategy.needs_benchmark() && !prepared.has_benchmark {
            eprintln!("warning: skipping {} (needs [backtest] benchmark)", preset);
            continue;
        }
        jobs.push(BacktestJob {
            universe: &prepared.universe,
            config: prepared.backtest.clone(),
            strategy,
        });
    }

    eprintln!("Running {} presets in parallel...", jobs.len());
    let results = run_batch(&jobs);

    println!(
        "{:<20} {:>7} {:>10} {:>8} {:>8} {:>8} {:>7}",
        "preset", "trades", "return%", "sharpe", "maxdd%", "win%", "pf"
    );
    for (job, result) in jobs.iter().zip(&results) {
        let bt = &job.config;
        let report = PerformanceReport::compute(result, bt.risk_free_rate, bt.periods_per_year);
        println!(
            "{:<20} {:>7} {:>10.2} {:>8.2} {:>8.1} {:>8.1} {:>7.2}",
            result.strategy_name,
            report.total_trades,
            report.total_return * 100.0,
            report.sharpe_ratio,
            report.max_drawdown * 100.0,
            report.win_rate * 100.0,
            report.profit_factor,
        );
    }
    Ok(())
}

/// Signals each kind would emit on the symbol's latest bar.
fn latest_signals(sd: &SymbolData, strategy: &StrategyConfig) -> Vec<String> {
    let Some(last) = sd.bar_count().checked_sub(1) else {
        return Vec::new();
    };
    let mut found = Vec::new();
    for kind in SignalKind::ALL {
        let mut generator = build_generator(kind, &strategy.signal_params);
        for i in 0..=last {
            generator.observe(&sd.context(i));
        }
        if last < generator.min_history() {
            continue;
        }
        if let Some(signal) = generator.evaluate(&sd.context(last)) {
            found.push(format!("{} {}", signal.kind, signal.direction));
        }
    }
    found
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}

fn run_scan(config_path: &Path) -> Result<(), SwingtraderError> {
    let config = load_config(config_path)?;
    validate_all(&config)?;

    let strategy = build_strategy_config(&config, None)?;
    let data_port = data_adapter(&config)?;
    let prepared = prepare(&config, &data_port, false)?;

    for sd in &prepared.universe {
        let Some(bar) = sd.bars.last() else {
            continue;
        };
        let snap = sd.snapshots.last().cloned().unwrap_or_default();
        println!("{} {}", sd.symbol, bar.date);
        println!(
            "  close {:.2}  width {}  atr {}  rsi {}",
            bar.close,
            snap.bands.map_or_else(|| "-".to_string(), |b| format!("{:.4}", b.width)),
            fmt_opt(snap.atr),
            fmt_opt(snap.oscillator),
        );
        println!(
            "  ema {}/{}  trend {}  quadrant {}",
            fmt_opt(snap.ema_fast),
            fmt_opt(snap.ema_slow),
            snap.trend.map_or_else(|| "-".to_string(), |t| t.to_string()),
            snap.quadrant().map_or_else(|| "-".to_string(), |q| q.to_string()),
        );
        let signals = latest_signals(sd, &strategy);
        if signals.is_empty() {
            println!("  signals: none");
        } else {
            println!("  signals: {}", signals.join(", "));
        }
    }
    Ok(())
}

fn print_data_range(data_port: &dyn DataPort, symbol: &str) {
    match data_port.get_data_range(symbol) {
        Ok(Some((first, last, count))) => {
            println!("{}: {} bars, {} to {}", symbol, count, first, last)
        }
        Ok(None) => eprintln!("{}: no data found", symbol),
        Err(e) => eprintln!("error querying {}: {}", symbol, e),
    }
}

fn run_info(config_path: &Path, symbol: Option<&str>) -> Result<(), SwingtraderError> {
    let config = load_config(config_path)?;
    let data_port = data_adapter(&config)?;

    let symbols = match symbol {
        Some(s) => vec![s.trim().to_uppercase()],
        None => match read_symbols(&config) {
            Ok(list) => list,
            Err(SwingtraderError::ConfigMissing { .. }) => data_port.list_symbols()?,
            Err(e) => return Err(e),
        },
    };

    for s in &symbols {
        print_data_range(&data_port, s);
    }
    Ok(())
}

fn run_presets() {
    for preset in Preset::ALL {
        println!("{:<20} {}", preset.as_str(), preset.description());
    }
}
