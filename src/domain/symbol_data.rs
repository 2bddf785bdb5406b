//! Per-symbol bars with their precomputed snapshots, and the unified timeline.

use crate::domain::indicator::snapshot::{IndicatorSettings, IndicatorSnapshot, compute_snapshots};
use crate::domain::ohlcv::PriceBar;
use crate::domain::signal::SignalContext;
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct SymbolData {
    /// Position in the universe; also the tracker table index.
    pub id: usize,
    pub symbol: String,
    pub bars: Vec<PriceBar>,
    pub snapshots: Vec<IndicatorSnapshot>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl SymbolData {
    pub fn new(id: usize, symbol: String, bars: Vec<PriceBar>, snapshots: Vec<IndicatorSnapshot>) -> Self {
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            id,
            symbol,
            bars,
            snapshots,
            date_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&PriceBar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }

    pub fn get_bar_index(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    pub fn snapshot(&self, index: usize) -> Option<&IndicatorSnapshot> {
        self.snapshots.get(index)
    }

    pub fn is_last_bar(&self, index: usize) -> bool {
        index + 1 == self.bars.len()
    }

    pub fn context(&self, index: usize) -> SignalContext<'_> {
        SignalContext {
            symbol: &self.symbol,
            symbol_id: self.id,
            index,
            bars: &self.bars,
            snapshots: &self.snapshots,
        }
    }
}

/// Compute snapshots for every symbol in parallel. Ids follow input order.
pub fn precompute(
    universe: Vec<(String, Vec<PriceBar>)>,
    benchmark: Option<&[PriceBar]>,
    settings: &IndicatorSettings,
) -> Vec<SymbolData> {
    universe
        .into_par_iter()
        .enumerate()
        .map(|(id, (symbol, bars))| {
            let snapshots = compute_snapshots(&bars, benchmark, settings);
            SymbolData::new(id, symbol, bars, snapshots)
        })
        .collect()
}

pub fn build_unified_timeline(symbols: &[SymbolData]) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = symbols
        .iter()
        .flat_map(|sd| sd.bars.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}
