//! Technical indicator implementations.
//!
//! Every calculator takes a bar slice and returns an [`IndicatorSeries`] of the
//! same length. Points whose value is undefined (incomplete window, zero
//! denominator) carry `valid = false` and must never be read as numbers.
//!
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters
//! - `IndicatorSeries`: A time series of indicator values

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod rotation;
pub mod rsi;
pub mod snapshot;

pub use ema::TrendAlignment;
pub use rotation::Quadrant;

use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: IndicatorValue,
}

impl IndicatorPoint {
    pub fn invalid(date: NaiveDate) -> Self {
        IndicatorPoint {
            date,
            valid: false,
            value: IndicatorValue::Simple(0.0),
        }
    }

    pub fn simple(date: NaiveDate, value: f64) -> Self {
        IndicatorPoint {
            date,
            valid: value.is_finite(),
            value: IndicatorValue::Simple(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Bands {
        upper: f64,
        middle: f64,
        lower: f64,
        width: f64,
    },
    Trend(TrendAlignment),
    Rotation {
        ratio: f64,
        momentum: f64,
        quadrant: Quadrant,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Bands { period: usize, stddev_mult_x100: u32 },
    Atr(usize),
    Oscillator(usize),
    Ema(usize),
    EmaStack(Vec<usize>),
    Rotation {
        ratio_short: usize,
        ratio_long: usize,
        momentum_short: usize,
        momentum_long: usize,
    },
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// The value at `index`, only if it is valid.
    pub fn value_at(&self, index: usize) -> Option<&IndicatorValue> {
        self.values
            .get(index)
            .filter(|p| p.valid)
            .map(|p| &p.value)
    }

    /// The scalar at `index`, only if it is valid and scalar-shaped.
    pub fn simple_at(&self, index: usize) -> Option<f64> {
        match self.value_at(index) {
            Some(IndicatorValue::Simple(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|p| p.valid).count()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Bands {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BANDS({},{})", period, mult)
            }
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Oscillator(period) => write!(f, "RSI({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::EmaStack(periods) => {
                let joined: Vec<String> = periods.iter().map(|p| p.to_string()).collect();
                write!(f, "EMA_STACK({})", joined.join(","))
            }
            IndicatorType::Rotation {
                ratio_short,
                ratio_long,
                momentum_short,
                momentum_long,
            } => write!(
                f,
                "ROTATION({},{},{},{})",
                ratio_short, ratio_long, momentum_short, momentum_long
            ),
        }
    }
}

/// Simple moving average over a sequence with holes.
///
/// Output `i` is defined only when all `period` inputs ending at `i` are defined.
pub fn rolling_mean(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        let mut sum = 0.0;
        let mut complete = true;
        for v in window {
            match v {
                Some(x) => sum += x,
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if complete {
            out[i] = Some(sum / period as f64);
        }
    }
    out
}
