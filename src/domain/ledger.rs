//! Shared capital pool, open positions and the equity curve.
//!
//! Capital moves only by realized cash: the entry cost when a position opens
//! and the net proceeds of every exit tranche. Unrealized PnL is marked at each
//! bar but never booked.
//!
//! Each recorded equity point keeps what every symbol contributed to it, so a
//! quarantined symbol can be taken out of the whole curve, not just the bar it
//! failed on.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

use super::position::{ClosedTrade, Position, PositionError, StepOutcome};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub realized_capital: f64,
    pub unrealized_pnl: f64,
    pub equity: f64,
    pub open_position_count: usize,
}

/// One symbol's share of one recorded equity point.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SymbolMark {
    point: usize,
    realized: f64,
    unrealized: f64,
    open: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub initial_capital: f64,
    pub capital: f64,
    positions: BTreeMap<String, Position>,
    closed_trades: Vec<ClosedTrade>,
    equity_curve: Vec<EquityPoint>,
    realized_by_symbol: HashMap<String, f64>,
    marks: HashMap<String, Vec<SymbolMark>>,
    quarantined: BTreeSet<String>,
}

impl Ledger {
    pub fn new(initial_capital: f64) -> Self {
        Ledger {
            initial_capital,
            capital: initial_capital,
            positions: BTreeMap::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
            realized_by_symbol: HashMap::new(),
            marks: HashMap::new(),
            quarantined: BTreeSet::new(),
        }
    }

    fn book(&mut self, symbol: &str, amount: f64) {
        self.capital += amount;
        *self.realized_by_symbol.entry(symbol.to_string()).or_insert(0.0) += amount;
    }

    /// Add a freshly filled position and charge its entry cost.
    pub fn open(&mut self, position: Position) {
        let symbol = position.symbol.clone();
        self.book(&symbol, -position.costs);
        self.positions.insert(symbol, position);
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn take_position(&mut self, symbol: &str) -> Option<Position> {
        self.positions.remove(symbol)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn open_symbols(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }

    /// Book a step's sales; keep the position if it is still open.
    ///
    /// Returns the closed trade when the step closed the position.
    pub fn apply(&mut self, outcome: StepOutcome) -> Option<ClosedTrade> {
        let realized = outcome.realized();
        let position = outcome.position;
        let symbol = position.symbol.clone();
        self.book(&symbol, realized);
        if position.is_open() {
            self.positions.insert(symbol, position);
            None
        } else {
            let trade = position.to_closed_trade()?;
            self.closed_trades.push(trade.clone());
            Some(trade)
        }
    }

    /// Remove a symbol from the run: reverse what it realized, drop its trades
    /// and take its marks out of every equity point already recorded.
    pub fn quarantine(&mut self, symbol: &str, error: &PositionError) {
        let contribution = self.realized_by_symbol.remove(symbol).unwrap_or(0.0);
        self.capital -= contribution;
        self.positions.remove(symbol);
        let marks = self.marks.remove(symbol).unwrap_or_default();
        for mark in &marks {
            if let Some(point) = self.equity_curve.get_mut(mark.point) {
                point.realized_capital -= mark.realized;
                point.unrealized_pnl -= mark.unrealized;
                point.equity = point.realized_capital + point.unrealized_pnl;
                if mark.open {
                    point.open_position_count = point.open_position_count.saturating_sub(1);
                }
            }
        }
        let before = self.closed_trades.len();
        self.closed_trades.retain(|t| t.symbol != symbol);
        warn!(
            symbol,
            %error,
            reversed = contribution,
            dropped_trades = before - self.closed_trades.len(),
            rewritten_points = marks.len(),
            "symbol quarantined"
        );
        self.quarantined.insert(symbol.to_string());
    }

    pub fn is_quarantined(&self, symbol: &str) -> bool {
        self.quarantined.contains(symbol)
    }

    pub fn quarantined(&self) -> impl Iterator<Item = &String> {
        self.quarantined.iter()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.positions.values().map(Position::unrealized_pnl).sum()
    }

    pub fn equity(&self) -> f64 {
        self.capital + self.unrealized_pnl()
    }

    pub fn record_equity(&mut self, date: NaiveDate) {
        let point = self.equity_curve.len();
        for (symbol, realized) in &self.realized_by_symbol {
            let position = self.positions.get(symbol);
            self.marks.entry(symbol.clone()).or_default().push(SymbolMark {
                point,
                realized: *realized,
                unrealized: position.map_or(0.0, Position::unrealized_pnl),
                open: position.is_some(),
            });
        }
        let unrealized_pnl = self.unrealized_pnl();
        self.equity_curve.push(EquityPoint {
            date,
            realized_capital: self.capital,
            unrealized_pnl,
            equity: self.capital + unrealized_pnl,
            open_position_count: self.positions.len(),
        });
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed_trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn into_parts(self) -> (Vec<ClosedTrade>, Vec<EquityPoint>, Vec<String>) {
        (
            self.closed_trades,
            self.equity_curve,
            self.quarantined.into_iter().collect(),
        )
    }
}
