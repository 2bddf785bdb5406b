//! Average True Range as a simple rolling mean of true range.
//!
//! TR[0] = high - low; TR[i] = max(H-L, |H-C[i-1]|, |L-C[i-1]|).
//! Warmup: first (period-1) bars are invalid.

use crate::domain::indicator::{rolling_mean, IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::PriceBar;

pub fn atr(bars: &[PriceBar], period: usize) -> IndicatorSeries {
    let true_ranges: Vec<Option<f64>> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let tr = if i == 0 {
                bar.high - bar.low
            } else {
                bar.true_range(bars[i - 1].close)
            };
            Some(tr)
        })
        .collect();

    let values = rolling_mean(&true_ranges, period)
        .into_iter()
        .zip(bars)
        .map(|(mean, bar)| match mean {
            Some(v) => IndicatorPoint::simple(bar.date, v),
            None => IndicatorPoint::invalid(bar.date),
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values,
    }
}
