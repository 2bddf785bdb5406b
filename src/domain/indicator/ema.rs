//! Exponential moving averages and the EMA stack trend classification.
//!
//! k = 2/(n+1), seed with first SMA, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::PriceBar;
use serde::Serialize;
use std::fmt;

/// Ordering of a set of EMAs sorted by ascending period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrendAlignment {
    /// Every shorter average sits above every longer one.
    Bullish,
    /// Every shorter average sits below every longer one.
    Bearish,
    Transitional,
}

impl fmt::Display for TrendAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrendAlignment::Bullish => "Bullish",
            TrendAlignment::Bearish => "Bearish",
            TrendAlignment::Transitional => "Transitional",
        };
        f.write_str(label)
    }
}

pub fn ema(bars: &[PriceBar], period: usize) -> IndicatorSeries {
    if period == 0 || bars.is_empty() {
        return IndicatorSeries {
            indicator_type: IndicatorType::Ema(period),
            values: bars.iter().map(|b| IndicatorPoint::invalid(b.date)).collect(),
        };
    }

    let mut values = Vec::with_capacity(bars.len());
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        if i < period - 1 {
            sum += bar.close;
            values.push(IndicatorPoint::invalid(bar.date));
        } else if i == period - 1 {
            sum += bar.close;
            ema = sum / period as f64;
            values.push(IndicatorPoint::simple(bar.date, ema));
        } else {
            ema = bar.close * k + ema * (1.0 - k);
            values.push(IndicatorPoint::simple(bar.date, ema));
        }
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Ema(period),
        values,
    }
}

/// One EMA per period plus the per-bar alignment of the whole stack.
#[derive(Debug, Clone)]
pub struct EmaStack {
    pub emas: Vec<IndicatorSeries>,
    pub alignment: IndicatorSeries,
}

/// Classify values ordered by ascending period.
pub fn classify(values: &[f64]) -> TrendAlignment {
    if values.len() < 2 {
        return TrendAlignment::Transitional;
    }
    if values.windows(2).all(|w| w[0] > w[1]) {
        TrendAlignment::Bullish
    } else if values.windows(2).all(|w| w[0] < w[1]) {
        TrendAlignment::Bearish
    } else {
        TrendAlignment::Transitional
    }
}

pub fn ema_stack(bars: &[PriceBar], periods: &[usize]) -> EmaStack {
    let mut sorted = periods.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let emas: Vec<IndicatorSeries> = sorted.iter().map(|&p| ema(bars, p)).collect();

    let alignment_values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let current: Option<Vec<f64>> = emas.iter().map(|s| s.simple_at(i)).collect();
            match current {
                Some(vals) if !vals.is_empty() => IndicatorPoint {
                    date: bar.date,
                    valid: true,
                    value: IndicatorValue::Trend(classify(&vals)),
                },
                _ => IndicatorPoint::invalid(bar.date),
            }
        })
        .collect();

    EmaStack {
        emas,
        alignment: IndicatorSeries {
            indicator_type: IndicatorType::EmaStack(sorted),
            values: alignment_values,
        },
    }
}
