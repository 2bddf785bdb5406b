//! Per-bar view over every indicator a strategy reads.

use crate::domain::indicator::atr::atr;
use crate::domain::indicator::bollinger::band_width;
use crate::domain::indicator::ema::{ema, ema_stack};
use crate::domain::indicator::rotation::relative_rotation;
use crate::domain::indicator::rsi::oscillator;
use crate::domain::indicator::{IndicatorSeries, IndicatorValue, Quadrant, TrendAlignment};
use crate::domain::ohlcv::PriceBar;

/// Indicator periods and multipliers.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSettings {
    pub band_period: usize,
    pub band_std: f64,
    pub atr_period: usize,
    pub oscillator_period: usize,
    pub ema_stack: Vec<usize>,
    pub pullback_fast: usize,
    pub pullback_slow: usize,
    pub ratio_short: usize,
    pub ratio_long: usize,
    pub momentum_short: usize,
    pub momentum_long: usize,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        IndicatorSettings {
            band_period: 20,
            band_std: 2.0,
            atr_period: 14,
            oscillator_period: 14,
            ema_stack: vec![10, 20, 60, 200],
            pullback_fast: 5,
            pullback_slow: 25,
            ratio_short: 10,
            ratio_long: 26,
            momentum_short: 1,
            momentum_long: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    pub ratio: f64,
    pub momentum: f64,
    pub quadrant: Quadrant,
}

/// Derived values for one bar. `None` means undefined at that bar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSnapshot {
    pub bands: Option<Bands>,
    pub atr: Option<f64>,
    pub oscillator: Option<f64>,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub trend: Option<TrendAlignment>,
    pub rotation: Option<Rotation>,
}

impl IndicatorSnapshot {
    pub fn quadrant(&self) -> Option<Quadrant> {
        self.rotation.map(|r| r.quadrant)
    }
}

fn bands_at(series: &IndicatorSeries, i: usize) -> Option<Bands> {
    match series.value_at(i) {
        Some(IndicatorValue::Bands {
            upper,
            middle,
            lower,
            width,
        }) => Some(Bands {
            upper: *upper,
            middle: *middle,
            lower: *lower,
            width: *width,
        }),
        _ => None,
    }
}

fn trend_at(series: &IndicatorSeries, i: usize) -> Option<TrendAlignment> {
    match series.value_at(i) {
        Some(IndicatorValue::Trend(t)) => Some(*t),
        _ => None,
    }
}

fn rotation_at(series: &IndicatorSeries, i: usize) -> Option<Rotation> {
    match series.value_at(i) {
        Some(IndicatorValue::Rotation {
            ratio,
            momentum,
            quadrant,
        }) => Some(Rotation {
            ratio: *ratio,
            momentum: *momentum,
            quadrant: *quadrant,
        }),
        _ => None,
    }
}

/// Compute every indicator for one symbol and zip them into per-bar snapshots.
///
/// Without a benchmark the rotation fields stay `None`.
pub fn compute_snapshots(
    bars: &[PriceBar],
    benchmark: Option<&[PriceBar]>,
    settings: &IndicatorSettings,
) -> Vec<IndicatorSnapshot> {
    let bands = band_width(bars, settings.band_period, settings.band_std);
    let atr = atr(bars, settings.atr_period);
    let osc = oscillator(bars, settings.oscillator_period);
    let fast = ema(bars, settings.pullback_fast);
    let slow = ema(bars, settings.pullback_slow);
    let stack = ema_stack(bars, &settings.ema_stack);
    let rotation = benchmark.map(|bench| {
        relative_rotation(
            bars,
            bench,
            settings.ratio_short,
            settings.ratio_long,
            settings.momentum_short,
            settings.momentum_long,
        )
    });

    (0..bars.len())
        .map(|i| IndicatorSnapshot {
            bands: bands_at(&bands, i),
            atr: atr.simple_at(i),
            oscillator: osc.simple_at(i),
            ema_fast: fast.simple_at(i),
            ema_slow: slow.simple_at(i),
            trend: trend_at(&stack.alignment, i),
            rotation: rotation.as_ref().and_then(|r| rotation_at(r, i)),
        })
        .collect()
}
