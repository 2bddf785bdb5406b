//! Volatility bands and normalized band width.
//!
//! - Middle: simple moving average of closes over n periods
//! - Upper/Lower: middle ± (multiplier × sample standard deviation, n-1 divisor)
//! - Width: (upper - lower) / middle
//!
//! Warmup: first (period-1) bars are invalid. A zero middle is invalid too.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::PriceBar;

pub fn band_width(bars: &[PriceBar], period: usize, num_std: f64) -> IndicatorSeries {
    let indicator_type = IndicatorType::Bands {
        period,
        stddev_mult_x100: (num_std * 100.0).round() as u32,
    };
    let mut values = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        if period < 2 || i + 1 < period {
            values.push(IndicatorPoint::invalid(bar.date));
            continue;
        }

        let window = &bars[i + 1 - period..=i];
        let middle: f64 = window.iter().map(|b| b.close).sum::<f64>() / period as f64;
        if middle == 0.0 || !middle.is_finite() {
            values.push(IndicatorPoint::invalid(bar.date));
            continue;
        }

        let variance: f64 = window
            .iter()
            .map(|b| {
                let diff = b.close - middle;
                diff * diff
            })
            .sum::<f64>()
            / (period - 1) as f64;
        let stddev = variance.sqrt();

        let upper = middle + num_std * stddev;
        let lower = middle - num_std * stddev;
        let width = (upper - lower) / middle;

        values.push(IndicatorPoint {
            date: bar.date,
            valid: width.is_finite(),
            value: IndicatorValue::Bands {
                upper,
                middle,
                lower,
                width,
            },
        });
    }

    IndicatorSeries {
        indicator_type,
        values,
    }
}
