//! Named strategy presets.
//!
//! Each preset is a complete [`StrategyConfig`]. INI keys override individual
//! fields afterwards; presets are never merged with one another.

use crate::domain::signal::{SignalKind, SignalParams};
use crate::domain::strategy::{RiskRules, StopMode, StrategyConfig};
use crate::domain::trailing::TrailingRule;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Preset {
    #[default]
    SqueezeFade,
    QuadrantEmergence,
    LeadingRotation,
    RotationPullback,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::SqueezeFade,
        Preset::QuadrantEmergence,
        Preset::LeadingRotation,
        Preset::RotationPullback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::SqueezeFade => "squeeze_fade",
            Preset::QuadrantEmergence => "quadrant_emergence",
            Preset::LeadingRotation => "leading_rotation",
            Preset::RotationPullback => "rotation_pullback",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Preset::SqueezeFade => "fade band breaks out of a volatility squeeze",
            Preset::QuadrantEmergence => "ride emergence from the Lagging quadrant on an ATR ladder",
            Preset::LeadingRotation => "enter on transitions into the Leading quadrant",
            Preset::RotationPullback => "buy EMA pullbacks while rotation is Improving or Leading",
        }
    }

    pub fn strategy(&self) -> StrategyConfig {
        let signal_params = SignalParams::default();
        let (signal, risk) = match self {
            Preset::SqueezeFade => (SignalKind::SqueezeFade, RiskRules::default()),
            Preset::QuadrantEmergence => (
                SignalKind::QuadrantEmergence,
                RiskRules {
                    stop_mode: StopMode::AtrFromEntry,
                    stop_atr_mult: 4.0,
                    tp1_r: None,
                    tp2_r: 2.5,
                    breakeven_on_tp1: false,
                    trailing: TrailingRule::atr_ladder(),
                    max_holding_bars: None,
                    quadrant_exit: true,
                    ..RiskRules::default()
                },
            ),
            Preset::LeadingRotation => (
                SignalKind::LeadingTransition,
                RiskRules {
                    stop_mode: StopMode::Structural,
                    stop_atr_mult: 2.5,
                    tp1_r: Some(2.0),
                    tp2_r: 5.0,
                    breakeven_on_tp1: false,
                    trailing: TrailingRule::none(),
                    max_holding_bars: Some(30),
                    quadrant_exit: true,
                    ..RiskRules::default()
                },
            ),
            Preset::RotationPullback => (
                SignalKind::PullbackContinuation,
                RiskRules {
                    stop_mode: StopMode::Structural,
                    stop_atr_mult: 2.5,
                    tp1_r: Some(2.0),
                    tp2_r: 3.0,
                    breakeven_on_tp1: false,
                    trailing: TrailingRule::none(),
                    max_holding_bars: Some(60),
                    quadrant_exit: false,
                    ..RiskRules::default()
                },
            ),
        };
        StrategyConfig {
            name: self.as_str().to_string(),
            signal,
            signal_params,
            risk,
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase().replace('-', "_");
        Preset::ALL
            .into_iter()
            .find(|p| p.as_str() == needle)
            .ok_or_else(|| {
                let names: Vec<&str> = Preset::ALL.iter().map(|p| p.as_str()).collect();
                format!("unknown preset '{}' (expected one of {})", s, names.join(", "))
            })
    }
}
