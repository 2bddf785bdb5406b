//! RSI-style momentum oscillator.
//!
//! Uses simple rolling means of close-to-close gains and losses over n deltas:
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss)).
//!
//! Undefined while avg_loss == 0 (no down moves in the window) and during
//! warmup (the first n bars, since the first bar has no delta).

use crate::domain::indicator::{rolling_mean, IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::PriceBar;

pub fn oscillator(bars: &[PriceBar], period: usize) -> IndicatorSeries {
    let mut gains: Vec<Option<f64>> = Vec::with_capacity(bars.len());
    let mut losses: Vec<Option<f64>> = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        if i == 0 {
            gains.push(None);
            losses.push(None);
            continue;
        }
        let change = bar.close - bars[i - 1].close;
        gains.push(Some(change.max(0.0)));
        losses.push(Some((-change).max(0.0)));
    }

    let avg_gain = rolling_mean(&gains, period);
    let avg_loss = rolling_mean(&losses, period);

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| match (avg_gain[i], avg_loss[i]) {
            (Some(gain), Some(loss)) if loss > 0.0 => {
                IndicatorPoint::simple(bar.date, 100.0 - 100.0 / (1.0 + gain / loss))
            }
            _ => IndicatorPoint::invalid(bar.date),
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Oscillator(period),
        values,
    }
}
