//! Trade lifecycle: armed entry → open → partially closed → closed.
//!
//! [`fill`] turns an [`ArmedEntry`] into an open [`Position`] at the next bar's
//! open. [`step`] advances a position by one bar and is pure: it consumes the
//! position and returns the new one together with whatever was sold.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::domain::execution::{CostModel, position_size};
use crate::domain::indicator::Quadrant;
use crate::domain::indicator::snapshot::IndicatorSnapshot;
use crate::domain::ohlcv::PriceBar;
use crate::domain::signal::{Direction, Signal, SignalKind};
use crate::domain::strategy::{RiskRules, StopMode};
use crate::domain::trailing::ratchet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeState {
    Open,
    PartiallyClosed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit1,
    TakeProfit2,
    QuadrantExit,
    TimeExit,
    EndOfData,
}

impl ExitReason {
    pub const ALL: [ExitReason; 6] = [
        ExitReason::StopLoss,
        ExitReason::TakeProfit1,
        ExitReason::TakeProfit2,
        ExitReason::QuadrantExit,
        ExitReason::TimeExit,
        ExitReason::EndOfData,
    ];
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "StopLoss",
            ExitReason::TakeProfit1 => "TakeProfit1",
            ExitReason::TakeProfit2 => "TakeProfit2",
            ExitReason::QuadrantExit => "QuadrantExit",
            ExitReason::TimeExit => "TimeExit",
            ExitReason::EndOfData => "EndOfData",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionError {
    #[error("non-finite {field} in {symbol} trade on {date}")]
    NonFinite {
        symbol: String,
        field: &'static str,
        date: NaiveDate,
    },
}

/// Why an armed entry did not become a position. Not an error: the entry is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRejection {
    NonPositiveRisk,
    NonPositiveSize,
    NonFinite,
}

impl fmt::Display for FillRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillRejection::NonPositiveRisk => f.write_str("stop is not on the losing side of entry"),
            FillRejection::NonPositiveSize => f.write_str("position size is not positive"),
            FillRejection::NonFinite => f.write_str("non-finite entry arithmetic"),
        }
    }
}

/// A signal waiting for the next bar's open.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmedEntry {
    pub symbol: String,
    pub kind: SignalKind,
    pub direction: Direction,
    pub signal_date: NaiveDate,
    pub signal_high: f64,
    pub signal_low: f64,
    pub signal_atr: Option<f64>,
}

impl ArmedEntry {
    pub fn from_signal(signal: &Signal, bar: &PriceBar, snapshot: Option<&IndicatorSnapshot>) -> Self {
        ArmedEntry {
            symbol: signal.symbol.clone(),
            kind: signal.kind,
            direction: signal.direction,
            signal_date: signal.date,
            signal_high: bar.high,
            signal_low: bar.low,
            signal_atr: snapshot.and_then(|s| s.atr),
        }
    }
}

/// One sale out of a position.
#[derive(Debug, Clone, PartialEq)]
pub struct Tranche {
    pub date: NaiveDate,
    pub price: f64,
    pub size: f64,
    pub gross_pnl: f64,
    pub cost: f64,
    /// `None` for the TP1 partial.
    pub reason: Option<ExitReason>,
}

impl Tranche {
    pub fn net_pnl(&self) -> f64 {
        self.gross_pnl - self.cost
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitRecord {
    pub date: NaiveDate,
    pub price: f64,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub signal: SignalKind,
    pub direction: Direction,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    /// ATR used for stops and the trailing ladder, fixed at entry.
    pub atr: f64,
    pub original_size: f64,
    pub remaining_size: f64,
    pub initial_stop: f64,
    pub stop_loss: f64,
    pub take_profit_1: Option<f64>,
    pub take_profit_2: f64,
    pub tp1_hit: bool,
    /// Best favorable excursion so far, in ATR units.
    pub max_excursion_atr: f64,
    pub holding_bars: u32,
    pub state: TradeState,
    /// Net of every cost, entry included.
    pub realized_pnl: f64,
    pub costs: f64,
    pub last_price: f64,
    pub exit: Option<ExitRecord>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.state != TradeState::Closed
    }

    pub fn risk_per_unit(&self) -> f64 {
        (self.entry_price - self.initial_stop).abs()
    }

    /// Mark-to-market of the remaining size at the last seen close.
    pub fn unrealized_pnl(&self) -> f64 {
        if !self.is_open() {
            return 0.0;
        }
        self.direction.sign() * (self.last_price - self.entry_price) * self.remaining_size
    }

    fn stop_touched(&self, bar: &PriceBar) -> bool {
        match self.direction {
            Direction::Long => bar.low <= self.stop_loss,
            Direction::Short => bar.high >= self.stop_loss,
        }
    }

    /// A gap through the stop fills at the open.
    fn stop_fill_price(&self, bar: &PriceBar) -> f64 {
        match self.direction {
            Direction::Long => bar.open.min(self.stop_loss),
            Direction::Short => bar.open.max(self.stop_loss),
        }
    }

    fn reached(&self, bar: &PriceBar, level: f64) -> bool {
        match self.direction {
            Direction::Long => bar.high >= level,
            Direction::Short => bar.low <= level,
        }
    }

    fn non_finite(&self, field: &'static str, date: NaiveDate) -> PositionError {
        PositionError::NonFinite {
            symbol: self.symbol.clone(),
            field,
            date,
        }
    }

    fn sell(
        &mut self,
        date: NaiveDate,
        price: f64,
        size: f64,
        reason: Option<ExitReason>,
        costs: &CostModel,
    ) -> Result<Tranche, PositionError> {
        let gross_pnl = self.direction.sign() * (price - self.entry_price) * size;
        let cost = costs.charge(price * size);
        if !gross_pnl.is_finite() {
            return Err(self.non_finite("exit pnl", date));
        }
        if !cost.is_finite() {
            return Err(self.non_finite("exit cost", date));
        }
        self.remaining_size -= size;
        self.realized_pnl += gross_pnl - cost;
        self.costs += cost;
        Ok(Tranche {
            date,
            price,
            size,
            gross_pnl,
            cost,
            reason,
        })
    }

    fn close(
        &mut self,
        date: NaiveDate,
        price: f64,
        reason: ExitReason,
        costs: &CostModel,
    ) -> Result<Tranche, PositionError> {
        let tranche = self.sell(date, price, self.remaining_size, Some(reason), costs)?;
        self.remaining_size = 0.0;
        self.state = TradeState::Closed;
        self.exit = Some(ExitRecord {
            date,
            price,
            reason,
        });
        Ok(tranche)
    }

    /// Export record, once the position is closed.
    pub fn to_closed_trade(&self) -> Option<ClosedTrade> {
        let exit = self.exit?;
        let notional = self.entry_price * self.original_size;
        let pnl_pct = if notional > 0.0 {
            self.realized_pnl / notional * 100.0
        } else {
            0.0
        };
        Some(ClosedTrade {
            symbol: self.symbol.clone(),
            signal: self.signal,
            direction: self.direction,
            entry_date: self.entry_date,
            entry_price: self.entry_price,
            exit_date: exit.date,
            exit_price: exit.price,
            size: self.original_size,
            realized_pnl: self.realized_pnl,
            pnl_pct,
            holding_periods: self.holding_bars,
            exit_reason: exit.reason,
            tp1_hit: self.tp1_hit,
            initial_stop: self.initial_stop,
            final_stop: self.stop_loss,
            costs: self.costs,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub signal: SignalKind,
    pub direction: Direction,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub exit_date: NaiveDate,
    pub exit_price: f64,
    pub size: f64,
    pub realized_pnl: f64,
    pub pnl_pct: f64,
    pub holding_periods: u32,
    pub exit_reason: ExitReason,
    pub tp1_hit: bool,
    pub initial_stop: f64,
    pub final_stop: f64,
    pub costs: f64,
}

impl ClosedTrade {
    pub fn is_winner(&self) -> bool {
        self.realized_pnl > 0.0
    }
}

/// Open a position at `bar.open`. The entry cost is already in `realized_pnl`.
pub fn fill(
    armed: &ArmedEntry,
    bar: &PriceBar,
    capital: f64,
    rules: &RiskRules,
    costs: &CostModel,
) -> Result<Position, FillRejection> {
    let entry = bar.open;
    let sign = armed.direction.sign();
    let atr = armed
        .signal_atr
        .filter(|a| a.is_finite() && *a > 0.0)
        .unwrap_or(entry * rules.atr_fallback);

    let k = rules.stop_atr_mult;
    let stop = match (rules.stop_mode, armed.direction) {
        (StopMode::AtrFromEntry, _) => entry - sign * k * atr,
        (StopMode::Structural, Direction::Long) => armed.signal_low - k * atr,
        (StopMode::Structural, Direction::Short) => armed.signal_high + k * atr,
    };
    if !(entry.is_finite() && atr.is_finite() && stop.is_finite()) {
        return Err(FillRejection::NonFinite);
    }

    let risk = sign * (entry - stop);
    if !(risk > 0.0) {
        return Err(FillRejection::NonPositiveRisk);
    }

    let size = position_size(capital, rules.position_size, entry);
    if !(size > 0.0) || !size.is_finite() {
        return Err(FillRejection::NonPositiveSize);
    }

    let take_profit_1 = rules.tp1_r.map(|r| entry + sign * r * risk);
    let take_profit_2 = entry + sign * rules.tp2_r * risk;
    let entry_cost = costs.charge(entry * size);
    if !entry_cost.is_finite() {
        return Err(FillRejection::NonFinite);
    }

    Ok(Position {
        symbol: armed.symbol.clone(),
        signal: armed.kind,
        direction: armed.direction,
        entry_date: bar.date,
        entry_price: entry,
        atr,
        original_size: size,
        remaining_size: size,
        initial_stop: stop,
        stop_loss: stop,
        take_profit_1,
        take_profit_2,
        tp1_hit: false,
        max_excursion_atr: 0.0,
        holding_bars: 0,
        state: TradeState::Open,
        realized_pnl: -entry_cost,
        costs: entry_cost,
        last_price: entry,
        exit: None,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub position: Position,
    pub partial: Option<Tranche>,
    pub close: Option<Tranche>,
}

impl StepOutcome {
    /// Net cash returned to capital by this bar's sales.
    pub fn realized(&self) -> f64 {
        self.partial.iter().chain(self.close.iter()).map(Tranche::net_pnl).sum()
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_some()
    }
}

/// Advance `position` through one bar. The first terminal condition wins.
pub fn step(
    position: Position,
    bar: &PriceBar,
    snapshot: Option<&IndicatorSnapshot>,
    rules: &RiskRules,
    costs: &CostModel,
    is_last_bar: bool,
) -> Result<StepOutcome, PositionError> {
    let mut p = position;
    if !p.is_open() {
        return Ok(StepOutcome {
            position: p,
            partial: None,
            close: None,
        });
    }
    if !(bar.open.is_finite() && bar.high.is_finite() && bar.low.is_finite() && bar.close.is_finite()) {
        return Err(p.non_finite("bar price", bar.date));
    }

    p.holding_bars += 1;
    p.last_price = bar.close;
    let sign = p.direction.sign();

    if p.stop_touched(bar) {
        let price = p.stop_fill_price(bar);
        let reason = if p.tp1_hit {
            ExitReason::TakeProfit1
        } else {
            ExitReason::StopLoss
        };
        let close = p.close(bar.date, price, reason, costs)?;
        return Ok(StepOutcome {
            position: p,
            partial: None,
            close: Some(close),
        });
    }

    let mut partial = None;
    if let Some(tp1) = p.take_profit_1
        && !p.tp1_hit
        && p.reached(bar, tp1)
    {
        let half = p.remaining_size / 2.0;
        partial = Some(p.sell(bar.date, tp1, half, None, costs)?);
        p.tp1_hit = true;
        p.state = TradeState::PartiallyClosed;
        if rules.breakeven_on_tp1 {
            p.stop_loss = ratchet(p.direction, p.stop_loss, p.entry_price);
        }
    }

    let favorable = match p.direction {
        Direction::Long => bar.high,
        Direction::Short => bar.low,
    };
    let excursion = sign * (favorable - p.entry_price) / p.atr;
    if excursion.is_finite() {
        p.max_excursion_atr = p.max_excursion_atr.max(excursion);
    }
    if let Some(lock) = rules.trailing.lock_for(p.max_excursion_atr) {
        let proposed = p.entry_price + sign * lock * p.atr;
        p.stop_loss = ratchet(p.direction, p.stop_loss, proposed);
    }
    if !p.stop_loss.is_finite() {
        return Err(p.non_finite("stop", bar.date));
    }

    let lagging = snapshot.and_then(|s| s.quadrant()) == Some(Quadrant::Lagging);
    let exit = if p.reached(bar, p.take_profit_2) {
        Some((ExitReason::TakeProfit2, p.take_profit_2))
    } else if rules.quadrant_exit && lagging {
        Some((ExitReason::QuadrantExit, bar.close))
    } else if rules.max_holding_bars.is_some_and(|max| p.holding_bars > max) {
        Some((ExitReason::TimeExit, bar.close))
    } else if is_last_bar {
        Some((ExitReason::EndOfData, bar.close))
    } else {
        None
    };

    let close = match exit {
        Some((reason, price)) => Some(p.close(bar.date, price, reason, costs)?),
        None => None,
    };
    Ok(StepOutcome {
        position: p,
        partial,
        close,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::snapshot::Rotation;
    use crate::domain::preset::Preset;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn bar(day: u32, open: f64, high: f64, low: f64, close: f64) -> PriceBar {
        PriceBar {
            date: d(day),
            open,
            high,
            low,
            close,
            volume: 1_000,
        }
    }

    fn armed(direction: Direction, atr: Option<f64>) -> ArmedEntry {
        ArmedEntry {
            symbol: "BHP".into(),
            kind: SignalKind::SqueezeFade,
            direction,
            signal_date: d(1),
            signal_high: 101.0,
            signal_low: 99.0,
            signal_atr: atr,
        }
    }

    fn open_long(rules: &RiskRules) -> Position {
        let entry_bar = bar(2, 100.0, 100.0, 100.0, 100.0);
        fill(
            &armed(Direction::Long, Some(2.0)),
            &entry_bar,
            1_000_000.0,
            rules,
            &CostModel::free(),
        )
        .unwrap()
    }

    fn lagging() -> IndicatorSnapshot {
        IndicatorSnapshot {
            rotation: Some(Rotation {
                ratio: 98.0,
                momentum: 99.0,
                quadrant: Quadrant::Lagging,
            }),
            ..IndicatorSnapshot::default()
        }
    }

    #[test]
    fn fill_long_atr_stop() {
        let p = open_long(&RiskRules::default());
        assert_relative_eq!(p.original_size, 500.0);
        assert_relative_eq!(p.stop_loss, 96.0);
        assert_relative_eq!(p.take_profit_1.unwrap(), 106.0);
        assert_relative_eq!(p.take_profit_2, 110.0);
        assert_eq!(p.state, TradeState::Open);
        assert_eq!(p.entry_date, d(2));
    }

    #[test]
    fn fill_falls_back_to_percent_atr() {
        let entry_bar = bar(2, 100.0, 100.0, 100.0, 100.0);
        let p = fill(
            &armed(Direction::Long, None),
            &entry_bar,
            1_000_000.0,
            &RiskRules::default(),
            &CostModel::free(),
        )
        .unwrap();
        assert_relative_eq!(p.atr, 3.0);
        assert_relative_eq!(p.stop_loss, 94.0);
    }

    #[test]
    fn fill_structural_short() {
        let rules = Preset::LeadingRotation.strategy().risk;
        let entry_bar = bar(2, 100.0, 100.0, 100.0, 100.0);
        let p = fill(
            &armed(Direction::Short, Some(2.0)),
            &entry_bar,
            1_000_000.0,
            &rules,
            &CostModel::free(),
        )
        .unwrap();
        // signal high 101 + 2.5 × 2
        assert_relative_eq!(p.stop_loss, 106.0);
        assert_relative_eq!(p.take_profit_1.unwrap(), 88.0);
        assert_relative_eq!(p.take_profit_2, 70.0);
    }

    #[test]
    fn fill_refuses_stop_on_wrong_side() {
        let rules = Preset::RotationPullback.strategy().risk;
        // gap down far below the structural stop at 99 - 5 = 94
        let entry_bar = bar(2, 90.0, 91.0, 89.0, 90.0);
        let res = fill(
            &armed(Direction::Long, Some(2.0)),
            &entry_bar,
            1_000_000.0,
            &rules,
            &CostModel::free(),
        );
        assert_eq!(res.unwrap_err(), FillRejection::NonPositiveRisk);
    }

    #[test]
    fn fill_refuses_without_capital() {
        let entry_bar = bar(2, 100.0, 100.0, 100.0, 100.0);
        let res = fill(
            &armed(Direction::Long, Some(2.0)),
            &entry_bar,
            0.0,
            &RiskRules::default(),
            &CostModel::free(),
        );
        assert_eq!(res.unwrap_err(), FillRejection::NonPositiveSize);
    }

    #[test]
    fn entry_cost_charged_immediately() {
        let entry_bar = bar(2, 100.0, 100.0, 100.0, 100.0);
        let p = fill(
            &armed(Direction::Long, Some(2.0)),
            &entry_bar,
            1_000_000.0,
            &RiskRules::default(),
            &CostModel::default(),
        )
        .unwrap();
        // 500 units × 100 × 0.4%
        assert_relative_eq!(p.costs, 200.0);
        assert_relative_eq!(p.realized_pnl, -200.0);
    }

    #[test]
    fn tp1_sells_half_and_moves_stop_to_breakeven() {
        let rules = RiskRules::default();
        let p = open_long(&rules);
        let out = step(p, &bar(3, 101.0, 106.5, 99.0, 105.0), None, &rules, &CostModel::free(), false).unwrap();

        let partial = out.partial.unwrap();
        assert_relative_eq!(partial.price, 106.0);
        assert_relative_eq!(partial.size, 250.0);
        assert_relative_eq!(partial.gross_pnl, 1_500.0);
        assert!(out.close.is_none());
        assert!(out.position.tp1_hit);
        assert!(out.position.stop_loss >= 100.0);
        assert_relative_eq!(out.position.remaining_size, 250.0);
        assert_eq!(out.position.state, TradeState::PartiallyClosed);
    }

    #[test]
    fn stop_has_priority_over_targets() {
        let rules = RiskRules::default();
        let p = open_long(&rules);
        let out = step(p, &bar(3, 100.0, 111.0, 95.0, 105.0), None, &rules, &CostModel::free(), false).unwrap();
        let close = out.close.unwrap();
        assert_eq!(close.reason, Some(ExitReason::StopLoss));
        assert_relative_eq!(close.price, 96.0);
        assert!(out.partial.is_none());
        assert_eq!(out.position.remaining_size, 0.0);
    }

    #[test]
    fn gap_through_stop_fills_at_open() {
        let rules = RiskRules::default();
        let p = open_long(&rules);
        let out = step(p, &bar(3, 94.0, 95.0, 93.0, 94.5), None, &rules, &CostModel::free(), false).unwrap();
        assert_relative_eq!(out.close.unwrap().price, 94.0);
    }

    #[test]
    fn stop_after_tp1_reports_take_profit_1() {
        let rules = RiskRules::default();
        let p = open_long(&rules);
        let out = step(p, &bar(3, 101.0, 106.5, 101.0, 105.0), None, &rules, &CostModel::free(), false).unwrap();
        let out = step(out.position, &bar(4, 101.0, 102.0, 99.5, 100.0), None, &rules, &CostModel::free(), false).unwrap();
        let close = out.close.unwrap();
        assert_eq!(close.reason, Some(ExitReason::TakeProfit1));
        assert_relative_eq!(close.price, 100.0);

        let trade = out.position.to_closed_trade().unwrap();
        assert!(trade.tp1_hit);
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit1);
        // half at +6, half at breakeven
        assert_relative_eq!(trade.realized_pnl, 1_500.0);
    }

    #[test]
    fn tp1_and_tp2_on_the_same_bar() {
        let rules = RiskRules::default();
        let p = open_long(&rules);
        let out = step(p, &bar(3, 101.0, 112.0, 100.5, 111.0), None, &rules, &CostModel::free(), false).unwrap();
        assert!(out.partial.is_some());
        let close = out.close.as_ref().unwrap();
        assert_eq!(close.reason, Some(ExitReason::TakeProfit2));
        assert_relative_eq!(close.price, 110.0);
        assert_relative_eq!(out.realized(), 250.0 * 6.0 + 250.0 * 10.0);
    }

    #[test]
    fn quadrant_exit_only_when_enabled() {
        let mut rules = RiskRules::default();
        let snap = lagging();

        let p = open_long(&rules);
        let out = step(p, &bar(3, 100.0, 101.0, 99.0, 100.5), Some(&snap), &rules, &CostModel::free(), false).unwrap();
        assert!(out.close.is_none());

        rules.quadrant_exit = true;
        let p = open_long(&rules);
        let out = step(p, &bar(3, 100.0, 101.0, 99.0, 100.5), Some(&snap), &rules, &CostModel::free(), false).unwrap();
        let close = out.close.unwrap();
        assert_eq!(close.reason, Some(ExitReason::QuadrantExit));
        assert_relative_eq!(close.price, 100.5);
    }

    #[test]
    fn time_exit_when_holding_exceeds_max() {
        let rules = RiskRules {
            max_holding_bars: Some(2),
            ..RiskRules::default()
        };
        let mut p = open_long(&rules);
        for day in 3..5 {
            let out = step(p, &bar(day, 100.0, 101.0, 99.0, 100.0), None, &rules, &CostModel::free(), false).unwrap();
            assert!(out.close.is_none());
            p = out.position;
        }
        let out = step(p, &bar(5, 100.0, 101.0, 99.0, 100.0), None, &rules, &CostModel::free(), false).unwrap();
        assert_eq!(out.close.unwrap().reason, Some(ExitReason::TimeExit));
        assert_eq!(out.position.holding_bars, 3);
    }

    #[test]
    fn no_time_exit_without_maximum() {
        let rules = RiskRules {
            max_holding_bars: None,
            ..RiskRules::default()
        };
        let mut p = open_long(&rules);
        for day in 3..28 {
            let out = step(p, &bar(day, 100.0, 101.0, 99.0, 100.0), None, &rules, &CostModel::free(), false).unwrap();
            assert!(out.close.is_none());
            p = out.position;
        }
    }

    #[test]
    fn end_of_data_closes_at_close() {
        let rules = RiskRules::default();
        let p = open_long(&rules);
        let out = step(p, &bar(3, 100.0, 101.0, 99.0, 100.7), None, &rules, &CostModel::free(), true).unwrap();
        let close = out.close.unwrap();
        assert_eq!(close.reason, Some(ExitReason::EndOfData));
        assert_relative_eq!(close.price, 100.7);
    }

    #[test]
    fn trailing_ladder_ratchets_stop() {
        let rules = Preset::QuadrantEmergence.strategy().risk;
        let p = open_long(&rules);
        assert_relative_eq!(p.stop_loss, 92.0);

        // high 112 is 6 ATR: lock +1 ATR
        let out = step(p, &bar(3, 101.0, 112.0, 100.0, 111.0), None, &rules, &CostModel::free(), false).unwrap();
        assert!(out.close.is_none());
        assert_relative_eq!(out.position.max_excursion_atr, 6.0);
        assert_relative_eq!(out.position.stop_loss, 102.0);

        // pullback does not loosen the stop
        let out = step(out.position, &bar(4, 110.0, 110.5, 103.0, 104.0), None, &rules, &CostModel::free(), false).unwrap();
        assert_relative_eq!(out.position.stop_loss, 102.0);
        assert_relative_eq!(out.position.max_excursion_atr, 6.0);
    }

    #[test]
    fn short_mirrors_long() {
        let rules = RiskRules::default();
        let entry_bar = bar(2, 100.0, 100.0, 100.0, 100.0);
        let p = fill(
            &armed(Direction::Short, Some(2.0)),
            &entry_bar,
            1_000_000.0,
            &rules,
            &CostModel::free(),
        )
        .unwrap();
        assert_relative_eq!(p.stop_loss, 104.0);
        assert_relative_eq!(p.take_profit_1.unwrap(), 94.0);

        let out = step(p, &bar(3, 99.0, 101.0, 93.5, 95.0), None, &rules, &CostModel::free(), false).unwrap();
        let partial = out.partial.unwrap();
        assert_relative_eq!(partial.price, 94.0);
        assert_relative_eq!(partial.gross_pnl, 250.0 * 6.0);
        assert!(out.position.stop_loss <= 100.0);
        assert_relative_eq!(out.position.unrealized_pnl(), 250.0 * 5.0);
    }

    #[test]
    fn realized_pnl_accounts_for_every_cost() {
        let rules = RiskRules::default();
        let costs = CostModel::default();
        let entry_bar = bar(2, 100.0, 100.0, 100.0, 100.0);
        let p = fill(&armed(Direction::Long, Some(2.0)), &entry_bar, 1_000_000.0, &rules, &costs).unwrap();
        let entry_cost = p.costs;

        let first = step(p, &bar(3, 101.0, 106.5, 101.0, 105.0), None, &rules, &costs, false).unwrap();
        let second = step(first.position.clone(), &bar(4, 105.0, 111.0, 104.0, 110.5), None, &rules, &costs, false).unwrap();

        let cash_flow = -entry_cost + first.realized() + second.realized();
        let trade = second.position.to_closed_trade().unwrap();
        assert_relative_eq!(trade.realized_pnl, cash_flow, epsilon = 1e-9);
        assert_relative_eq!(trade.costs, 200.0 + 250.0 * 106.0 * 0.004 + 250.0 * 110.0 * 0.004, epsilon = 1e-9);
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit2);
        assert_eq!(trade.holding_periods, 2);
        assert_relative_eq!(trade.pnl_pct, trade.realized_pnl / 50_000.0 * 100.0);
    }

    #[test]
    fn closed_position_is_inert() {
        let rules = RiskRules::default();
        let p = open_long(&rules);
        let out = step(p, &bar(3, 100.0, 101.0, 99.0, 100.0), None, &rules, &CostModel::free(), true).unwrap();
        let again = step(out.position.clone(), &bar(4, 50.0, 200.0, 10.0, 60.0), None, &rules, &CostModel::free(), false).unwrap();
        assert_eq!(again.position, out.position);
        assert!(again.close.is_none());
        assert_eq!(again.position.unrealized_pnl(), 0.0);
    }

    #[test]
    fn non_finite_bar_is_an_error() {
        let rules = RiskRules::default();
        let p = open_long(&rules);
        let err = step(p, &bar(3, f64::NAN, 101.0, 99.0, 100.0), None, &rules, &CostModel::free(), false).unwrap_err();
        assert!(matches!(err, PositionError::NonFinite { field: "bar price", .. }));
    }

    #[test]
    fn open_position_has_no_trade_record() {
        assert!(open_long(&RiskRules::default()).to_closed_trade().is_none());
    }

    fn walk() -> impl Strategy<Value = Vec<(f64, f64, f64, f64)>> {
        prop::collection::vec((-3.0f64..3.0, 0.0f64..3.0, 0.0f64..3.0, -3.0f64..3.0), 1..60)
    }

    proptest! {
        #[test]
        fn size_shrinks_and_stop_only_tightens(moves in walk(), emergence in any::<bool>()) {
            let rules = if emergence {
                Preset::QuadrantEmergence.strategy().risk
            } else {
                RiskRules { max_holding_bars: None, ..RiskRules::default() }
            };
            let mut p = open_long(&rules);
            let mut price = 100.0f64;
            let last = moves.len() - 1;
            for (i, (open_mv, up, down, close_mv)) in moves.into_iter().enumerate() {
                let open = (price + open_mv).max(1.0);
                let close = (open + close_mv).max(1.0);
                let high = open.max(close) + up;
                let low = (open.min(close) - down).max(0.5);
                let b = PriceBar {
                    date: d(1) + chrono::Duration::days(i as i64 + 2),
                    open, high, low, close, volume: 1,
                };
                let before = p.clone();
                let out = step(p, &b, None, &rules, &CostModel::free(), i == last).unwrap();
                prop_assert!(out.position.remaining_size <= before.remaining_size);
                prop_assert!(out.position.stop_loss >= before.stop_loss);
                price = close;
                p = out.position;
                if !p.is_open() {
                    break;
                }
            }
            prop_assert_eq!(p.state, TradeState::Closed);
            prop_assert_eq!(p.remaining_size, 0.0);
        }
    }
}
