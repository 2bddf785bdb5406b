//! Relative-rotation quadrant emergence.
//!
//! A symbol that climbs out of Lagging into Improving or Leading starts a
//! tracker. Each further bar outside Lagging adds a day; once the count reaches
//! the configured threshold the generator fires a long entry. Falling back to
//! Lagging clears the tracker without firing.

use super::{Direction, Signal, SignalContext, SignalGenerator, SignalKind};
use crate::domain::indicator::Quadrant;

/// Emergence progress for one symbol. Empty when `first_quadrant_seen` is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerSymbolTrackerState {
    pub consecutive_non_lagging_days: u32,
    pub first_quadrant_seen: Option<Quadrant>,
}

impl PerSymbolTrackerState {
    pub fn is_active(&self) -> bool {
        self.first_quadrant_seen.is_some()
    }

    pub fn reset(&mut self) {
        *self = PerSymbolTrackerState::default();
    }

    /// Advance one bar given the previous and current quadrant.
    pub fn advance(&mut self, previous: Option<Quadrant>, current: Quadrant) {
        match current {
            Quadrant::Lagging => self.reset(),
            Quadrant::Improving | Quadrant::Leading if previous == Some(Quadrant::Lagging) => {
                self.consecutive_non_lagging_days = 1;
                self.first_quadrant_seen = Some(current);
            }
            _ if self.is_active() => self.consecutive_non_lagging_days += 1,
            _ => {}
        }
    }
}

/// Tracker states indexed by symbol id.
#[derive(Debug, Clone, Default)]
pub struct TrackerTable {
    states: Vec<PerSymbolTrackerState>,
}

impl TrackerTable {
    pub fn new() -> Self {
        TrackerTable::default()
    }

    pub fn get(&self, symbol_id: usize) -> PerSymbolTrackerState {
        self.states.get(symbol_id).copied().unwrap_or_default()
    }

    pub fn get_mut(&mut self, symbol_id: usize) -> &mut PerSymbolTrackerState {
        if symbol_id >= self.states.len() {
            self.states
                .resize(symbol_id + 1, PerSymbolTrackerState::default());
        }
        &mut self.states[symbol_id]
    }

    pub fn active_count(&self) -> usize {
        self.states.iter().filter(|s| s.is_active()).count()
    }
}

#[derive(Debug, Clone)]
pub struct QuadrantEmergence {
    day_threshold: u32,
    trackers: TrackerTable,
}

impl QuadrantEmergence {
    pub fn new(day_threshold: u32) -> Self {
        QuadrantEmergence {
            day_threshold,
            trackers: TrackerTable::new(),
        }
    }

    pub fn trackers(&self) -> &TrackerTable {
        &self.trackers
    }
}

impl SignalGenerator for QuadrantEmergence {
    fn kind(&self) -> SignalKind {
        SignalKind::QuadrantEmergence
    }

    fn min_history(&self) -> usize {
        2
    }

    fn observe(&mut self, ctx: &SignalContext<'_>) {
        let Some(current) = ctx.snapshot().and_then(|s| s.quadrant()) else {
            return;
        };
        let previous = ctx.previous_snapshot().and_then(|s| s.quadrant());
        self.trackers.get_mut(ctx.symbol_id).advance(previous, current);
    }

    fn evaluate(&mut self, ctx: &SignalContext<'_>) -> Option<Signal> {
        let current = ctx.snapshot()?.quadrant()?;
        let state = self.trackers.get(ctx.symbol_id);
        if !state.is_active()
            || state.consecutive_non_lagging_days < self.day_threshold
            || current == Quadrant::Lagging
        {
            return None;
        }
        let signal = ctx.signal(self.kind(), Direction::Long)?;
        self.trackers.get_mut(ctx.symbol_id).reset();
        Some(signal)
    }
}
