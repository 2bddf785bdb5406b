//! Entry signal generators.
//!
//! Each strategy's entry rule is a [`SignalGenerator`]. The simulation calls
//! [`SignalGenerator::observe`] for every symbol on every bar, then
//! [`SignalGenerator::evaluate`] only for symbols that are flat. A generator
//! emits at most one [`Signal`] per symbol per bar.

pub mod emergence;
pub mod pullback;
pub mod rotation;
pub mod squeeze;

use crate::domain::indicator::snapshot::IndicatorSnapshot;
use crate::domain::ohlcv::PriceBar;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub use emergence::{PerSymbolTrackerState, QuadrantEmergence, TrackerTable};
pub use pullback::PullbackContinuation;
pub use rotation::LeadingTransition;
pub use squeeze::SqueezeFade;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.write_str("Long"),
            Direction::Short => f.write_str("Short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    SqueezeFade,
    QuadrantEmergence,
    #[serde(rename = "pullback")]
    PullbackContinuation,
    LeadingTransition,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] = [
        SignalKind::SqueezeFade,
        SignalKind::QuadrantEmergence,
        SignalKind::PullbackContinuation,
        SignalKind::LeadingTransition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::SqueezeFade => "squeeze_fade",
            SignalKind::QuadrantEmergence => "quadrant_emergence",
            SignalKind::PullbackContinuation => "pullback",
            SignalKind::LeadingTransition => "leading_transition",
        }
    }

    /// Whether the generator reads the relative-rotation quadrant.
    pub fn needs_benchmark(&self) -> bool {
        !matches!(self, SignalKind::SqueezeFade)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        SignalKind::ALL
            .into_iter()
            .find(|k| k.as_str() == needle)
            .ok_or_else(|| {
                let names: Vec<&str> = SignalKind::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown signal '{}' (expected one of {})", s, names.join(", "))
            })
    }
}

/// A candidate entry, valid only for the bar it was produced on.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub symbol: String,
    pub bar_index: usize,
    pub date: NaiveDate,
    pub kind: SignalKind,
    pub direction: Direction,
}

/// Everything a generator may look at for one symbol at one bar.
///
/// `bars` and `snapshots` are the symbol's full history; only indices up to
/// and including `index` may be read.
#[derive(Debug, Clone, Copy)]
pub struct SignalContext<'a> {
    pub symbol: &'a str,
    pub symbol_id: usize,
    pub index: usize,
    pub bars: &'a [PriceBar],
    pub snapshots: &'a [IndicatorSnapshot],
}

impl<'a> SignalContext<'a> {
    pub fn bar(&self) -> Option<&'a PriceBar> {
        self.bars.get(self.index)
    }

    pub fn previous_bar(&self) -> Option<&'a PriceBar> {
        self.index.checked_sub(1).and_then(|i| self.bars.get(i))
    }

    pub fn snapshot(&self) -> Option<&'a IndicatorSnapshot> {
        self.snapshots.get(self.index)
    }

    pub fn previous_snapshot(&self) -> Option<&'a IndicatorSnapshot> {
        self.index.checked_sub(1).and_then(|i| self.snapshots.get(i))
    }

    pub fn signal(&self, kind: SignalKind, direction: Direction) -> Option<Signal> {
        let bar = self.bar()?;
        Some(Signal {
            symbol: self.symbol.to_string(),
            bar_index: self.index,
            date: bar.date,
            kind,
            direction,
        })
    }
}

pub trait SignalGenerator: Send {
    fn kind(&self) -> SignalKind;

    /// Bars of history required before `evaluate` may fire.
    fn min_history(&self) -> usize;

    /// Update per-symbol state. Called for every symbol on every bar.
    fn observe(&mut self, _ctx: &SignalContext<'_>) {}

    /// Candidate entry for a flat symbol, if any.
    fn evaluate(&mut self, ctx: &SignalContext<'_>) -> Option<Signal>;
}

/// Tunables shared by the generators.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalParams {
    pub squeeze_threshold: f64,
    pub emergence_days: u32,
    pub pullback_band_atr: f64,
    pub pullback_quadrant_gate: bool,
}

impl Default for SignalParams {
    fn default() -> Self {
        SignalParams {
            squeeze_threshold: 0.03,
            emergence_days: 2,
            pullback_band_atr: 0.5,
            pullback_quadrant_gate: true,
        }
    }
}

pub fn build_generator(kind: SignalKind, params: &SignalParams) -> Box<dyn SignalGenerator> {
    match kind {
        SignalKind::SqueezeFade => Box::new(SqueezeFade::new(params.squeeze_threshold)),
        SignalKind::QuadrantEmergence => Box::new(QuadrantEmergence::new(params.emergence_days)),
        SignalKind::PullbackContinuation => Box::new(PullbackContinuation::new(
            params.pullback_band_atr,
            params.pullback_quadrant_gate,
        )),
        SignalKind::LeadingTransition => Box::new(LeadingTransition),
    }
}
