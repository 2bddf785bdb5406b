//! Transaction costs and position sizing.
//!
//! Costs are proportional to traded notional and charged on the entry fill and
//! on every exit tranche. Slippage is folded into the cost rate rather than
//! moving the fill price, so stop and target levels fill exactly where they sit.

/// Per-side cost rates, as fractions of notional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub commission: f64,
    pub tax: f64,
    pub slippage: f64,
    /// Flat fee per fill, in currency units.
    pub commission_flat: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        CostModel {
            commission: 0.001,
            tax: 0.001,
            slippage: 0.002,
            commission_flat: 0.0,
        }
    }
}

impl CostModel {
    pub fn free() -> Self {
        CostModel {
            commission: 0.0,
            tax: 0.0,
            slippage: 0.0,
            commission_flat: 0.0,
        }
    }

    /// Combined proportional rate per side.
    pub fn rate(&self) -> f64 {
        self.commission + self.tax + self.slippage
    }

    /// Cost of one fill with the given notional.
    pub fn charge(&self, notional: f64) -> f64 {
        if notional == 0.0 {
            return 0.0;
        }
        self.commission_flat + notional.abs() * self.rate()
    }
}

/// Units bought with `capital × fraction` at `price`. Fractional units allowed.
pub fn position_size(capital: f64, fraction: f64, price: f64) -> f64 {
    if !(price > 0.0) || !(capital > 0.0) || !(fraction > 0.0) {
        return 0.0;
    }
    capital * fraction / price
}
