//! Volatility squeeze breakout fade.
//!
//! When the previous bar's band width was below the threshold, a close that
//! escapes the previous bar's bands is faded: above the upper band goes short,
//! below the lower band goes long.

use super::{Direction, Signal, SignalContext, SignalGenerator, SignalKind};

pub const SQUEEZE_MIN_HISTORY: usize = 30;

#[derive(Debug, Clone)]
pub struct SqueezeFade {
    threshold: f64,
}

impl SqueezeFade {
    pub fn new(threshold: f64) -> Self {
        SqueezeFade { threshold }
    }
}

impl SignalGenerator for SqueezeFade {
    fn kind(&self) -> SignalKind {
        SignalKind::SqueezeFade
    }

    fn min_history(&self) -> usize {
        SQUEEZE_MIN_HISTORY
    }

    fn evaluate(&mut self, ctx: &SignalContext<'_>) -> Option<Signal> {
        if ctx.index < SQUEEZE_MIN_HISTORY {
            return None;
        }
        let prev_bands = ctx.previous_snapshot()?.bands?;
        if prev_bands.width >= self.threshold {
            return None;
        }

        let close = ctx.bar()?.close;
        if close > prev_bands.upper {
            ctx.signal(self.kind(), Direction::Short)
        } else if close < prev_bands.lower {
            ctx.signal(self.kind(), Direction::Long)
        } else {
            None
        }
    }
}
