//! Relative rotation of an asset against a benchmark.
//!
//! strength = asset close / benchmark close (matched by date)
//! ratio    = 100 * ((SMA_short(strength) - SMA_long(strength)) / SMA_long(strength) + 1)
//! momentum = the same transform over the ratio series with the momentum windows
//!
//! A point is valid once both windows are filled and no denominator is zero.

use crate::domain::indicator::{
    rolling_mean, IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue,
};
use crate::domain::ohlcv::PriceBar;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Quadrant {
    Leading,
    Improving,
    Lagging,
    Weakening,
}

impl Quadrant {
    pub fn classify(ratio: f64, momentum: f64) -> Quadrant {
        match (ratio >= 100.0, momentum >= 100.0) {
            (true, true) => Quadrant::Leading,
            (false, true) => Quadrant::Improving,
            (false, false) => Quadrant::Lagging,
            (true, false) => Quadrant::Weakening,
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Quadrant::Leading => "Leading",
            Quadrant::Improving => "Improving",
            Quadrant::Lagging => "Lagging",
            Quadrant::Weakening => "Weakening",
        };
        f.write_str(label)
    }
}

fn normalized_spread(short: &[Option<f64>], long: &[Option<f64>]) -> Vec<Option<f64>> {
    short
        .iter()
        .zip(long)
        .map(|(s, l)| match (s, l) {
            (Some(s), Some(l)) if *l != 0.0 => {
                let v = 100.0 * ((s - l) / l + 1.0);
                v.is_finite().then_some(v)
            }
            _ => None,
        })
        .collect()
}

pub fn relative_rotation(
    asset: &[PriceBar],
    benchmark: &[PriceBar],
    ratio_short: usize,
    ratio_long: usize,
    momentum_short: usize,
    momentum_long: usize,
) -> IndicatorSeries {
    let bench_close: HashMap<NaiveDate, f64> =
        benchmark.iter().map(|b| (b.date, b.close)).collect();

    let strength: Vec<Option<f64>> = asset
        .iter()
        .map(|bar| match bench_close.get(&bar.date) {
            Some(&bc) if bc != 0.0 => {
                let s = bar.close / bc;
                s.is_finite().then_some(s)
            }
            _ => None,
        })
        .collect();

    let ratio = normalized_spread(
        &rolling_mean(&strength, ratio_short),
        &rolling_mean(&strength, ratio_long),
    );
    let momentum = normalized_spread(
        &rolling_mean(&ratio, momentum_short),
        &rolling_mean(&ratio, momentum_long),
    );

    let values = asset
        .iter()
        .enumerate()
        .map(|(i, bar)| match (ratio[i], momentum[i]) {
            (Some(r), Some(m)) => IndicatorPoint {
                date: bar.date,
                valid: true,
                value: IndicatorValue::Rotation {
                    ratio: r,
                    momentum: m,
                    quadrant: Quadrant::classify(r, m),
                },
            },
            _ => IndicatorPoint::invalid(bar.date),
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Rotation {
            ratio_short,
            ratio_long,
            momentum_short,
            momentum_long,
        },
        values,
    }
}
