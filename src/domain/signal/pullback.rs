//! Moving-average pullback continuation.
//!
//! Fires long when the previous bar's low dipped under the fast EMA while
//! holding within an ATR band of the slow EMA, the fast EMA is at or above the
//! slow one, and the current close clears the previous bar's high.

use super::{Direction, Signal, SignalContext, SignalGenerator, SignalKind};
use crate::domain::indicator::Quadrant;

pub const PULLBACK_MIN_HISTORY: usize = 26;

#[derive(Debug, Clone)]
pub struct PullbackContinuation {
    band_atr: f64,
    quadrant_gate: bool,
}

impl PullbackContinuation {
    pub fn new(band_atr: f64, quadrant_gate: bool) -> Self {
        PullbackContinuation {
            band_atr,
            quadrant_gate,
        }
    }
}

impl SignalGenerator for PullbackContinuation {
    fn kind(&self) -> SignalKind {
        SignalKind::PullbackContinuation
    }

    fn min_history(&self) -> usize {
        PULLBACK_MIN_HISTORY
    }

    fn evaluate(&mut self, ctx: &SignalContext<'_>) -> Option<Signal> {
        if ctx.index < PULLBACK_MIN_HISTORY {
            return None;
        }
        let bar = ctx.bar()?;
        let prev_bar = ctx.previous_bar()?;
        let snap = ctx.snapshot()?;
        let prev = ctx.previous_snapshot()?;

        if self.quadrant_gate
            && !matches!(
                snap.quadrant(),
                Some(Quadrant::Improving) | Some(Quadrant::Leading)
            )
        {
            return None;
        }

        let fast = prev.ema_fast?;
        let slow = prev.ema_slow?;
        let atr = snap.atr?;
        let allowance = self.band_atr * atr;

        let dipped = prev_bar.low < fast;
        let near_slow = (prev_bar.low - slow).abs() <= allowance;
        let uptrend = fast >= slow;
        let breakout = bar.close > prev_bar.high;

        if dipped && near_slow && uptrend && breakout {
            ctx.signal(self.kind(), Direction::Long)
        } else {
            None
        }
    }
}
