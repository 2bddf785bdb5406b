//! ATR-excursion trailing stop ladder.
//!
//! A ladder is a list of `trigger:lock` steps in ATR units. Once a position's
//! best favorable excursion reaches `trigger`, the stop may move to
//! `entry ± lock × ATR`. The stop only ever tightens.

use crate::domain::signal::Direction;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailStep {
    pub trigger_atr: f64,
    pub lock_atr: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrailingRule {
    steps: Vec<TrailStep>,
}

impl TrailingRule {
    pub fn new(mut steps: Vec<TrailStep>) -> Self {
        steps.sort_by(|a, b| a.trigger_atr.total_cmp(&b.trigger_atr));
        TrailingRule { steps }
    }

    pub fn none() -> Self {
        TrailingRule::default()
    }

    /// 4→BE, 5→BE, 6→+1, 7→+2, 8→+3, 9→+4 ATR.
    pub fn atr_ladder() -> Self {
        TrailingRule::new(
            [(4.0, 0.0), (5.0, 0.0), (6.0, 1.0), (7.0, 2.0), (8.0, 3.0), (9.0, 4.0)]
                .into_iter()
                .map(|(trigger_atr, lock_atr)| TrailStep {
                    trigger_atr,
                    lock_atr,
                })
                .collect(),
        )
    }

    pub fn steps(&self) -> &[TrailStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Lock (in ATR) of the highest step reached by `max_excursion_atr`.
    pub fn lock_for(&self, max_excursion_atr: f64) -> Option<f64> {
        self.steps
            .iter()
            .filter(|s| max_excursion_atr >= s.trigger_atr)
            .map(|s| s.lock_atr)
            .reduce(f64::max)
    }
}

/// Tighten `current` toward `proposed` without ever loosening it.
pub fn ratchet(direction: Direction, current: f64, proposed: f64) -> f64 {
    match direction {
        Direction::Long => current.max(proposed),
        Direction::Short => current.min(proposed),
    }
}

impl fmt::Display for TrailingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return f.write_str("none");
        }
        let parts: Vec<String> = self
            .steps
            .iter()
            .map(|s| format!("{}:{}", s.trigger_atr, s.lock_atr))
            .collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for TrailingRule {
    type Err = String;

    /// Parses `"4:0,5:0,6:1"` or `"none"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            return Ok(TrailingRule::none());
        }
        let mut steps = Vec::new();
        for token in trimmed.split(',') {
            let (trigger, lock) = token
                .split_once(':')
                .ok_or_else(|| format!("step '{}' is not trigger:lock", token.trim()))?;
            let trigger_atr: f64 = trigger
                .trim()
                .parse()
                .map_err(|_| format!("invalid trigger '{}'", trigger.trim()))?;
            let lock_atr: f64 = lock
                .trim()
                .parse()
                .map_err(|_| format!("invalid lock '{}'", lock.trim()))?;
            if !(trigger_atr > 0.0) || !trigger_atr.is_finite() {
                return Err(format!("trigger must be positive, got {}", trigger_atr));
            }
            if lock_atr < 0.0 || !lock_atr.is_finite() {
                return Err(format!("lock must be non-negative, got {}", lock_atr));
            }
            if lock_atr >= trigger_atr {
                return Err(format!(
                    "lock {} must stay below its trigger {}",
                    lock_atr, trigger_atr
                ));
            }
            steps.push(TrailStep {
                trigger_atr,
                lock_atr,
            });
        }
        Ok(TrailingRule::new(steps))
    }
}
