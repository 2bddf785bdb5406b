//! Entry on a move into the Leading quadrant.
//!
//! Both Improving → Leading and Weakening → Leading go long; the second is a
//! bounce back into leadership.

use super::{Direction, Signal, SignalContext, SignalGenerator, SignalKind};
use crate::domain::indicator::Quadrant;

#[derive(Debug, Clone, Copy, Default)]
pub struct LeadingTransition;

impl SignalGenerator for LeadingTransition {
    fn kind(&self) -> SignalKind {
        SignalKind::LeadingTransition
    }

    fn min_history(&self) -> usize {
        2
    }

    fn evaluate(&mut self, ctx: &SignalContext<'_>) -> Option<Signal> {
        let current = ctx.snapshot()?.quadrant()?;
        let previous = ctx.previous_snapshot()?.quadrant()?;
        if current != Quadrant::Leading {
            return None;
        }
        match previous {
            Quadrant::Improving | Quadrant::Weakening => ctx.signal(self.kind(), Direction::Long),
            _ => None,
        }
    }
}
