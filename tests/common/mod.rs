#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
pub use swingtrader::domain::ohlcv::PriceBar;
use swingtrader::domain::error::SwingtraderError;
use swingtrader::domain::indicator::snapshot::{IndicatorSettings, compute_snapshots};
use swingtrader::domain::signal::Direction;
use swingtrader::domain::symbol_data::SymbolData;
use swingtrader::ports::data_port::DataPort;

/// Bar index of the band break in [`squeeze_break_bars`].
pub const SIGNAL_BAR: usize = 35;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PriceBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<PriceBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, SwingtraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(SwingtraderError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, SwingtraderError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SwingtraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(SwingtraderError::DataSource {
                reason: reason.clone(),
            });
        }
        match self.data.get(symbol) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.date).min().unwrap();
                let max = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(date_str: &str, close: f64) -> PriceBar {
    PriceBar {
        date: NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap(),
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1000,
    }
}

/// `count` consecutive calendar days from 2024-01-01, all prices equal to `price`.
pub fn flat_bars(count: usize, price: f64) -> Vec<PriceBar> {
    (0..count)
        .map(|i| PriceBar {
            date: date(2024, 1, 1) + chrono::Duration::days(i as i64),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1_000,
        })
        .collect()
}

/// Gently rising closes with a fixed daily range.
pub fn generate_bars(count: usize, start_price: f64) -> Vec<PriceBar> {
    (0..count)
        .map(|i| {
            let close = start_price + i as f64 * 0.5;
            PriceBar {
                date: date(2024, 1, 1) + chrono::Duration::days(i as i64),
                open: close - 0.25,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 10_000,
            }
        })
        .collect()
}

/// Flat at 100 with one bar at [`SIGNAL_BAR`] breaking out of the squeeze.
///
/// A long fade breaks below the lower band, a short fade above the upper.
pub fn squeeze_break_bars(count: usize, direction: Direction) -> Vec<PriceBar> {
    let mut bars = flat_bars(count, 100.0);
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

pub fn make_symbol_data(id: usize, symbol: &str, bars: Vec<PriceBar>) -> SymbolData {
    let snapshots = compute_snapshots(&bars, None, &IndicatorSettings::default());
    SymbolData::new(id, symbol.to_string(), bars, snapshots)
}

/// Write `{SYMBOL}.csv` files the way the CSV data adapter expects them.
pub fn write_symbol_csv(dir: &Path, symbol: &str, bars: &[PriceBar]) {
    let mut out = String::from("date,open,high,low,close,volume\n");
    for b in bars {
        writeln!(
            out,
            "{},{},{},{},{},{}",
            b.date, b.open, b.high, b.low, b.close, b.volume
        )
        .unwrap();
    }
    std::fs::write(dir.join(format!("{}.csv", symbol)), out).unwrap();
}
