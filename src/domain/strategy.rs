//! Strategy configuration: which signal to trade and how to manage the trade.

use crate::domain::signal::{SignalKind, SignalParams};
use crate::domain::trailing::TrailingRule;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// entry ∓ k·ATR
    AtrFromEntry,
    /// signal-bar low − k·ATR for longs, high + k·ATR for shorts
    Structural,
}

impl fmt::Display for StopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopMode::AtrFromEntry => f.write_str("atr"),
            StopMode::Structural => f.write_str("structural"),
        }
    }
}

impl FromStr for StopMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "atr" | "atr_from_entry" => Ok(StopMode::AtrFromEntry),
            "structural" => Ok(StopMode::Structural),
            other => Err(format!(
                "unknown stop mode '{}' (expected atr or structural)",
                other
            )),
        }
    }
}

/// Everything the trade state machine needs to size, protect and exit a trade.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskRules {
    /// Fraction of current capital committed per entry.
    pub position_size: f64,
    pub stop_mode: StopMode,
    pub stop_atr_mult: f64,
    /// TP1 distance in R. `None` disables the partial exit.
    pub tp1_r: Option<f64>,
    pub tp2_r: f64,
    pub breakeven_on_tp1: bool,
    pub trailing: TrailingRule,
    /// `None` disables the time exit.
    pub max_holding_bars: Option<u32>,
    /// Close when the rotation quadrant turns Lagging.
    pub quadrant_exit: bool,
    /// ATR used when the signal bar's ATR is undefined, as a fraction of entry.
    pub atr_fallback: f64,
}

impl Default for RiskRules {
    fn default() -> Self {
        RiskRules {
            position_size: 0.05,
            stop_mode: StopMode::AtrFromEntry,
            stop_atr_mult: 2.0,
            tp1_r: Some(1.5),
            tp2_r: 2.5,
            breakeven_on_tp1: true,
            trailing: TrailingRule::none(),
            max_holding_bars: Some(10),
            quadrant_exit: false,
            atr_fallback: 0.03,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub name: String,
    pub signal: SignalKind,
    pub signal_params: SignalParams,
    pub risk: RiskRules,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            name: "squeeze_fade".to_string(),
            signal: SignalKind::SqueezeFade,
            signal_params: SignalParams::default(),
            risk: RiskRules::default(),
        }
    }
}

impl StrategyConfig {
    pub fn needs_benchmark(&self) -> bool {
        self.signal.needs_benchmark() || self.risk.quadrant_exit
    }
}
