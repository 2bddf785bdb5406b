//! Symbol universe: parsing the symbol list and loading usable bar history.
//!
//! A symbol that fails to load, has malformed bars only, or has fewer than
//! [`MIN_BARS`] bars is dropped with a warning; the run continues with the rest.

use crate::domain::error::SwingtraderError;
use crate::domain::ohlcv::PriceBar;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{info, warn};

pub const MIN_BARS: usize = 30;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
}

pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    FetchFailed(String),
    NoData,
    InsufficientBars { bars: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct LoadedUniverse {
    pub symbols: Vec<(String, Vec<PriceBar>)>,
    pub skipped: Vec<SkippedSymbol>,
}

impl LoadedUniverse {
    pub fn count(&self) -> usize {
        self.symbols.len()
    }
}

/// Keep well-formed bars only, sorted by date with duplicate dates removed.
pub fn clean_bars(symbol: &str, mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    let before = bars.len();
    bars.retain(PriceBar::is_well_formed);
    let dropped = before - bars.len();
    if dropped > 0 {
        warn!(symbol, dropped, "dropped malformed bars");
    }
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    bars
}

pub fn load_universe(
    data_port: &dyn DataPort,
    symbols: Vec<String>,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<LoadedUniverse, SwingtraderError> {
    let total = symbols.len();
    let mut loaded = Vec::new();
    let mut skipped = Vec::new();

    for symbol in symbols {
        let bars = match data_port.fetch_bars(&symbol, start_date, end_date) {
            Ok(bars) => clean_bars(&symbol, bars),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "skipping symbol");
                skipped.push(SkippedSymbol {
                    symbol,
                    reason: SkipReason::FetchFailed(e.to_string()),
                });
                continue;
            }
        };

        if bars.is_empty() {
            warn!(symbol = %symbol, "skipping symbol: no data");
            skipped.push(SkippedSymbol {
                symbol,
                reason: SkipReason::NoData,
            });
            continue;
        }

        if bars.len() < MIN_BARS {
            warn!(
                symbol = %symbol,
                bars = bars.len(),
                minimum = MIN_BARS,
                "skipping symbol: insufficient bars"
            );
            skipped.push(SkippedSymbol {
                symbol,
                reason: SkipReason::InsufficientBars { bars: bars.len() },
            });
            continue;
        }

        loaded.push((symbol, bars));
    }

    if loaded.is_empty() {
        return Err(SwingtraderError::InsufficientData {
            symbol: "all".to_string(),
            bars: 0,
            minimum: MIN_BARS,
        });
    }

    info!(loaded = loaded.len(), total, "universe loaded");

    Ok(LoadedUniverse {
        symbols: loaded,
        skipped,
    })
}

/// Benchmark bars, required non-empty.
pub fn load_benchmark(
    data_port: &dyn DataPort,
    symbol: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Vec<PriceBar>, SwingtraderError> {
    let bars = clean_bars(symbol, data_port.fetch_bars(symbol, start_date, end_date)?);
    if bars.is_empty() {
        return Err(SwingtraderError::NoData {
            symbol: symbol.to_string(),
        });
    }
    Ok(bars)
}
