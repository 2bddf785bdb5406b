//! Performance report: return, risk and trade statistics for one run.
//!
//! Every ratio with a zero denominator is reported as 0.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use super::backtest::BacktestResult;
use super::ledger::EquityPoint;
use super::position::{ClosedTrade, ExitReason};

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolSummary {
    pub symbol: String,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub total_pnl: f64,
    pub win_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReport {
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return: f64,
    /// Compound annual growth over the simulated bars.
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of bars spent below a prior peak.
    pub max_drawdown_duration: usize,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_holding_bars: f64,
    pub total_costs: f64,
    pub exit_reasons: BTreeMap<ExitReason, usize>,
    pub per_symbol: Vec<SymbolSummary>,
}

impl PerformanceReport {
    pub fn compute(result: &BacktestResult, risk_free_rate: f64, periods_per_year: f64) -> Self {
        Self::from_parts(
            result.initial_capital,
            &result.equity_curve,
            &result.closed_trades,
            risk_free_rate,
            periods_per_year,
        )
    }

    pub fn from_parts(
        initial_capital: f64,
        equity_curve: &[EquityPoint],
        trades: &[ClosedTrade],
        risk_free_rate: f64,
        periods_per_year: f64,
    ) -> Self {
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let years = if periods_per_year > 0.0 {
            equity_curve.len() as f64 / periods_per_year
        } else {
            0.0
        };
        let annualized_return = if years <= 0.0 || !total_return.is_finite() {
            0.0
        } else if 1.0 + total_return <= 0.0 {
            -1.0
        } else {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        };

        let equity: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
        let (max_drawdown, max_drawdown_duration) = compute_drawdown(initial_capital, &equity);
        let (sharpe_ratio, sortino_ratio) =
            compute_risk_adjusted(&equity, risk_free_rate, periods_per_year);
        let calmar_ratio = if max_drawdown > 0.0 {
            annualized_return / max_drawdown
        } else {
            0.0
        };

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_holding = 0u64;
        let mut total_costs = 0.0_f64;
        let mut exit_reasons = BTreeMap::new();

        for trade in trades {
            let pnl = trade.realized_pnl;
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }
            total_holding += u64::from(trade.holding_periods);
            total_costs += trade.costs;
            *exit_reasons.entry(trade.exit_reason).or_insert(0) += 1;
        }

        let total_trades = trades.len();
        let win_rate = ratio(trades_won as f64, total_trades as f64);
        let profit_factor = ratio(total_wins, total_losses);
        let avg_win = ratio(total_wins, trades_won as f64);
        let avg_loss = ratio(total_losses, trades_lost as f64);
        let expectancy = if total_trades > 0 {
            win_rate * avg_win - (1.0 - win_rate) * avg_loss
        } else {
            0.0
        };
        let avg_holding_bars = ratio(total_holding as f64, total_trades as f64);

        PerformanceReport {
            initial_capital,
            final_equity,
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            profit_factor,
            expectancy,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            avg_holding_bars,
            total_costs,
            exit_reasons,
            per_symbol: summarize_by_symbol(trades),
        }
    }

    pub fn exit_count(&self, reason: ExitReason) -> usize {
        self.exit_reasons.get(&reason).copied().unwrap_or(0)
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator != 0.0 && denominator.is_finite() {
        numerator / denominator
    } else {
        0.0
    }
}

/// Per-symbol trade summaries, sorted by symbol.
pub fn summarize_by_symbol(trades: &[ClosedTrade]) -> Vec<SymbolSummary> {
    let mut by_symbol: HashMap<&str, SymbolSummary> = HashMap::new();
    for trade in trades {
        let entry = by_symbol
            .entry(trade.symbol.as_str())
            .or_insert_with(|| SymbolSummary {
                symbol: trade.symbol.clone(),
                total_trades: 0,
                winning_trades: 0,
                losing_trades: 0,
                total_pnl: 0.0,
                win_rate: 0.0,
            });
        entry.total_trades += 1;
        entry.total_pnl += trade.realized_pnl;
        if trade.realized_pnl > 0.0 {
            entry.winning_trades += 1;
        } else if trade.realized_pnl < 0.0 {
            entry.losing_trades += 1;
        }
    }
    let mut summaries: Vec<SymbolSummary> = by_symbol
        .into_values()
        .map(|mut s| {
            s.win_rate = ratio(s.winning_trades as f64, s.total_trades as f64);
            s
        })
        .collect();
    summaries.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    summaries
}

/// Largest peak-to-trough fraction and longest underwater stretch, in bars.
///
/// The running peak starts at the initial capital, so a loss on the first
/// recorded bar still counts.
pub fn compute_drawdown(initial_capital: f64, equity: &[f64]) -> (f64, usize) {
    let mut peak = initial_capital;
    let mut max_dd = 0.0_f64;
    let mut max_duration = 0usize;
    let mut duration = 0usize;

    for &value in equity {
        if value >= peak {
            peak = value;
            duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
            duration += 1;
            max_duration = max_duration.max(duration);
        }
    }

    (max_dd, max_duration)
}

/// Per-bar simple returns of an equity series.
pub fn period_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Annualized Sharpe and Sortino over per-bar returns.
pub fn compute_risk_adjusted(equity: &[f64], risk_free_rate: f64, periods_per_year: f64) -> (f64, f64) {
    let returns = period_returns(equity);
    if returns.is_empty() || periods_per_year <= 0.0 {
        return (0.0, 0.0);
    }

    let per_period_rf = risk_free_rate / periods_per_year;
    let mean_excess =
        returns.iter().map(|r| r - per_period_rf).sum::<f64>() / returns.len() as f64;
    let scale = periods_per_year.sqrt();

    let stddev = population_std(&returns);
    let sharpe = if stddev > 0.0 {
        scale * mean_excess / stddev
    } else {
        0.0
    };

    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_std = population_std(&downside);
    let sortino = if downside_std > 0.0 {
        scale * mean_excess / downside_std
    } else {
        0.0
    };

    (sharpe, sortino)
}

/// Dates bracketing the deepest drawdown: (peak, trough).
pub fn drawdown_window(equity_curve: &[EquityPoint]) -> Option<(NaiveDate, NaiveDate)> {
    let first = equity_curve.first()?;
    let mut peak = first;
    let mut worst: Option<(NaiveDate, NaiveDate, f64)> = None;
    for point in equity_curve {
        if point.equity >= peak.equity {
            peak = point;
        } else if peak.equity > 0.0 {
            let dd = (peak.equity - point.equity) / peak.equity;
            if worst.is_none_or(|(_, _, w)| dd > w) {
                worst = Some((peak.date, point.date, dd));
            }
        }
    }
    worst.map(|(p, t, _)| (p, t))
}
