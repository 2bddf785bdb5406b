//! Simulation loop.
//!
//! One pass over the unified timeline with a single shared capital pool. For
//! each date: fill armed entries at the open, step open positions, let the
//! generator observe every symbol, evaluate flat symbols, arm new signals and
//! record an equity point.

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, info, trace};

use crate::domain::execution::CostModel;
use crate::domain::ledger::{EquityPoint, Ledger};
use crate::domain::position::{ArmedEntry, ClosedTrade, fill, step};
use crate::domain::signal::{Direction, build_generator};
use crate::domain::strategy::StrategyConfig;
use crate::domain::symbol_data::{SymbolData, build_unified_timeline};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub costs: CostModel,
    pub allow_shorting: bool,
    pub risk_free_rate: f64,
    pub periods_per_year: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            start_date: NaiveDate::MIN,
            end_date: NaiveDate::MAX,
            initial_capital: 1_000_000.0,
            costs: CostModel::default(),
            allow_shorting: false,
            risk_free_rate: 0.03,
            periods_per_year: 252.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub strategy_name: String,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub closed_trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
    pub quarantined: Vec<String>,
    pub signals_armed: usize,
    pub fills_refused: usize,
}

impl BacktestResult {
    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.initial_capital)
    }

    pub fn total_realized(&self) -> f64 {
        self.closed_trades.iter().map(|t| t.realized_pnl).sum()
    }
}

pub fn run_backtest(
    universe: &[SymbolData],
    config: &BacktestConfig,
    strategy: &StrategyConfig,
) -> BacktestResult {
    let timeline = build_unified_timeline(universe);
    let last_date = timeline.last().copied();
    let rules = &strategy.risk;
    let costs = &config.costs;

    info!(
        strategy = %strategy.name,
        symbols = universe.len(),
        dates = timeline.len(),
        "backtest started"
    );

    let mut ledger = Ledger::new(config.initial_capital);
    let mut generator = build_generator(strategy.signal, &strategy.signal_params);
    let min_history = generator.min_history();
    let slots = universe.iter().map(|sd| sd.id + 1).max().unwrap_or(0);
    let mut armed: Vec<Option<ArmedEntry>> = vec![None; slots];
    let mut signals_armed = 0;
    let mut fills_refused = 0;

    for &date in &timeline {
        for sd in universe {
            let Some(idx) = sd.get_bar_index(date) else {
                continue;
            };
            let Some(entry) = armed[sd.id].take() else {
                continue;
            };
            if ledger.is_quarantined(&sd.symbol) {
                continue;
            }
            match fill(&entry, &sd.bars[idx], ledger.capital, rules, costs) {
                Ok(position) => {
                    debug!(
                        symbol = %position.symbol,
                        %date,
                        direction = %position.direction,
                        price = position.entry_price,
                        size = position.original_size,
                        stop = position.stop_loss,
                        "entry filled"
                    );
                    ledger.open(position);
                }
                Err(reason) => {
                    debug!(symbol = %sd.symbol, %date, %reason, "entry refused");
                    fills_refused += 1;
                }
            }
        }

        for sd in universe {
            let Some(idx) = sd.get_bar_index(date) else {
                continue;
            };
            let Some(position) = ledger.take_position(&sd.symbol) else {
                continue;
            };
            let is_last = sd.is_last_bar(idx) || Some(date) == last_date;
            match step(position, &sd.bars[idx], sd.snapshot(idx), rules, costs, is_last) {
                Ok(outcome) => {
                    if let Some(partial) = &outcome.partial {
                        debug!(
                            symbol = %sd.symbol,
                            %date,
                            price = partial.price,
                            size = partial.size,
                            "partial exit"
                        );
                    }
                    if let Some(trade) = ledger.apply(outcome) {
                        debug!(
                            symbol = %trade.symbol,
                            %date,
                            reason = %trade.exit_reason,
                            price = trade.exit_price,
                            pnl = trade.realized_pnl,
                            "position closed"
                        );
                    }
                }
                Err(error) => {
                    ledger.quarantine(&sd.symbol, &error);
                    armed[sd.id] = None;
                }
            }
        }

        for sd in universe {
            if let Some(idx) = sd.get_bar_index(date) {
                generator.observe(&sd.context(idx));
            }
        }

        for sd in universe {
            let Some(idx) = sd.get_bar_index(date) else {
                continue;
            };
            if idx < min_history
                || sd.is_last_bar(idx)
                || ledger.has_position(&sd.symbol)
                || armed[sd.id].is_some()
                || ledger.is_quarantined(&sd.symbol)
            {
                continue;
            }
            let Some(signal) = generator.evaluate(&sd.context(idx)) else {
                continue;
            };
            if signal.direction == Direction::Short && !config.allow_shorting {
                trace!(symbol = %signal.symbol, %date, kind = %signal.kind, "short signal ignored");
                continue;
            }
            trace!(
                symbol = %signal.symbol,
                %date,
                kind = %signal.kind,
                direction = %signal.direction,
                "signal armed"
            );
            armed[sd.id] = Some(ArmedEntry::from_signal(&signal, &sd.bars[idx], sd.snapshot(idx)));
            signals_armed += 1;
        }

        ledger.record_equity(date);
    }

    let final_capital = ledger.capital;
    let (closed_trades, equity_curve, quarantined) = ledger.into_parts();

    info!(
        strategy = %strategy.name,
        trades = closed_trades.len(),
        final_capital,
        quarantined = quarantined.len(),
        "backtest finished"
    );

    BacktestResult {
        strategy_name: strategy.name.clone(),
        initial_capital: config.initial_capital,
        final_capital,
        closed_trades,
        equity_curve,
        quarantined,
        signals_armed,
        fills_refused,
    }
}

/// One independent simulation.
#[derive(Debug, Clone)]
pub struct BacktestJob<'a> {
    pub universe: &'a [SymbolData],
    pub config: BacktestConfig,
    pub strategy: StrategyConfig,
}

/// Run independent simulations in parallel. Results follow job order.
pub fn run_batch(jobs: &[BacktestJob<'_>]) -> Vec<BacktestResult> {
    jobs.par_iter()
        .map(|job| run_backtest(job.universe, &job.config, &job.strategy))
        .collect()
}

/// All trades from several runs, ordered by exit date then symbol.
pub fn merge_closed_trades(results: &[BacktestResult]) -> Vec<ClosedTrade> {
    let mut merged: Vec<ClosedTrade> = results
        .iter()
        .flat_map(|r| r.closed_trades.iter().cloned())
        .collect();
    merged.sort_by(|a, b| {
        a.exit_date
            .cmp(&b.exit_date)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::snapshot::{IndicatorSettings, compute_snapshots};
    use crate::domain::ohlcv::PriceBar;
    use crate::domain::position::ExitReason;
    use crate::domain::preset::Preset;
    use crate::domain::signal::SignalKind;
    use approx::assert_relative_eq;

    const SIGNAL_BAR: usize = 35;

    fn flat(count: usize) -> Vec<PriceBar> {
        (0..count)
            .map(|i| PriceBar {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64),
                open: 100.0,
                high: 100.0,
                low: 100.0,
                close: 100.0,
                volume: 1_000,
            })
            .collect()
    }

    /// Flat at 100 with one bar breaking below (long fade) or above (short fade).
    fn squeeze_break(count: usize, direction: Direction) -> Vec<PriceBar> {
        let mut bars = flat(count);
        let b = &mut bars[SIGNAL_BAR];
        match direction {
            Direction::Long => {
                b.low = 96.5;
                b.close = 97.0;
            }
            Direction::Short => {
                b.high = 103.5;
                b.close = 103.0;
            }
        }
        bars
    }

    fn symbol(id: usize, name: &str, bars: Vec<PriceBar>) -> SymbolData {
        let snapshots = compute_snapshots(&bars, None, &IndicatorSettings::default());
        SymbolData::new(id, name.to_string(), bars, snapshots)
    }

    fn ledger_consistent(result: &BacktestResult) {
        assert_relative_eq!(
            result.final_equity(),
            result.initial_capital + result.total_realized(),
            epsilon = 1e-6
        );
        assert_relative_eq!(result.final_capital, result.final_equity(), epsilon = 1e-6);
    }

    #[test]
    fn config_defaults() {
        let c = BacktestConfig::default();
        assert_eq!(c.initial_capital, 1_000_000.0);
        assert_eq!(c.periods_per_year, 252.0);
        assert!(!c.allow_shorting);
        assert_eq!(c.costs, CostModel::default());
    }

    #[test]
    fn flat_series_is_quiet() {
        let universe = vec![symbol(0, "FLAT", flat(80))];
        let result = run_backtest(&universe, &BacktestConfig::default(), &StrategyConfig::default());
        assert_eq!(result.signals_armed, 0);
        assert!(result.closed_trades.is_empty());
        assert_eq!(result.equity_curve.len(), 80);
        assert!(result.equity_curve.iter().all(|p| p.equity == 1_000_000.0));
    }

    #[test]
    fn long_fade_fills_next_open_and_times_out() {
        let mut bars = squeeze_break(60, Direction::Long);
        bars[SIGNAL_BAR + 1].open = 99.8;
        bars[SIGNAL_BAR + 1].low = 99.8;
        let universe = vec![symbol(0, "BHP", bars)];
        let result = run_backtest(&universe, &BacktestConfig::default(), &StrategyConfig::default());

        assert_eq!(result.signals_armed, 1);
        assert_eq!(result.closed_trades.len(), 1);
        let trade = &result.closed_trades[0];
        assert_eq!(trade.signal, SignalKind::SqueezeFade);
        assert_eq!(trade.direction, Direction::Long);
        assert_eq!(trade.entry_date, universe[0].bars[SIGNAL_BAR + 1].date);
        assert_relative_eq!(trade.entry_price, 99.8);
        assert_eq!(trade.exit_reason, ExitReason::TimeExit);
        assert_eq!(trade.holding_periods, 11);
        assert_relative_eq!(trade.size, 1_000_000.0 * 0.05 / 99.8);
        ledger_consistent(&result);
    }

    #[test]
    fn shorts_ignored_unless_allowed() {
        let universe = vec![symbol(0, "CBA", squeeze_break(60, Direction::Short))];
        let strategy = StrategyConfig::default();

        let result = run_backtest(&universe, &BacktestConfig::default(), &strategy);
        assert_eq!(result.signals_armed, 0);
        assert!(result.closed_trades.is_empty());

        let config = BacktestConfig {
            allow_shorting: true,
            ..BacktestConfig::default()
        };
        let result = run_backtest(&universe, &config, &strategy);
        assert_eq!(result.closed_trades.len(), 1);
        assert_eq!(result.closed_trades[0].direction, Direction::Short);
        ledger_consistent(&result);
    }

    #[test]
    fn open_position_closed_at_end_of_data() {
        let universe = vec![symbol(0, "BHP", squeeze_break(40, Direction::Long))];
        let result = run_backtest(&universe, &BacktestConfig::default(), &StrategyConfig::default());
        assert_eq!(result.closed_trades.len(), 1);
        assert_eq!(result.closed_trades[0].exit_reason, ExitReason::EndOfData);
        assert_eq!(result.equity_curve.last().unwrap().open_position_count, 0);
        ledger_consistent(&result);
    }

    #[test]
    fn no_signal_on_final_bar() {
        let universe = vec![symbol(0, "BHP", squeeze_break(SIGNAL_BAR + 1, Direction::Long))];
        let result = run_backtest(&universe, &BacktestConfig::default(), &StrategyConfig::default());
        assert_eq!(result.signals_armed, 0);
    }

    #[test]
    fn symbols_share_capital() {
        let universe = vec![
            symbol(0, "AAA", squeeze_break(60, Direction::Long)),
            symbol(1, "BBB", squeeze_break(60, Direction::Long)),
            symbol(2, "CCC", flat(60)),
        ];
        let result = run_backtest(&universe, &BacktestConfig::default(), &StrategyConfig::default());
        assert_eq!(result.closed_trades.len(), 2);
        let first = &result.equity_curve[SIGNAL_BAR + 1];
        assert_eq!(first.open_position_count, 2);
        // second fill is sized off capital already reduced by the first entry cost
        assert!(result.closed_trades[1].size < result.closed_trades[0].size);
        ledger_consistent(&result);
    }

    #[test]
    fn failing_symbol_is_quarantined() {
        let mut bad = symbol(0, "BAD", squeeze_break(60, Direction::Long));
        bad.bars[SIGNAL_BAR + 4].close = f64::NAN;
        let universe = vec![bad, symbol(1, "GOOD", squeeze_break(60, Direction::Long))];
        let result = run_backtest(&universe, &BacktestConfig::default(), &StrategyConfig::default());

        assert_eq!(result.quarantined, vec!["BAD".to_string()]);
        assert!(result.closed_trades.iter().all(|t| t.symbol == "GOOD"));
        assert_eq!(result.closed_trades.len(), 1);
        ledger_consistent(&result);
    }

    #[test]
    fn batch_matches_sequential_runs() {
        let universe = vec![
            symbol(0, "AAA", squeeze_break(60, Direction::Long)),
            symbol(1, "BBB", squeeze_break(60, Direction::Short)),
        ];
        let jobs: Vec<BacktestJob> = [Preset::SqueezeFade, Preset::RotationPullback]
            .iter()
            .map(|p| BacktestJob {
                universe: &universe,
                config: BacktestConfig::default(),
                strategy: p.strategy(),
            })
            .collect();
        let batch = run_batch(&jobs);
        assert_eq!(batch.len(), 2);
        for (job, result) in jobs.iter().zip(&batch) {
            assert_eq!(*result, run_backtest(job.universe, &job.config, &job.strategy));
        }
        assert_eq!(batch[0].strategy_name, "squeeze_fade");
    }

    #[test]
    fn merge_orders_by_exit_date() {
        let universe = vec![symbol(0, "AAA", squeeze_break(60, Direction::Long))];
        let early = run_backtest(&universe, &BacktestConfig::default(), &StrategyConfig::default());
        let late_universe = vec![symbol(0, "ZZZ", squeeze_break(40, Direction::Long))];
        let late = run_backtest(&late_universe, &BacktestConfig::default(), &StrategyConfig::default());

        let merged = merge_closed_trades(&[early, late]);
        assert_eq!(merged.len(), 2);
        assert!(merged[0].exit_date <= merged[1].exit_date);
        assert_eq!(merged[0].symbol, "ZZZ");
    }
}
