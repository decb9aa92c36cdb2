use rust_decimal::{Decimal, MathematicalOps};

use crate::error::BessEconError;
use crate::types::{Money, Rate};
use crate::BessEconResult;

/// Technology learning-curve model: the unit cost at year t is
/// `B × (1 - L)^t` for base cost B and annual learning rate L.
///
/// Used to price mid-life augmentation at the augmentation year, and to
/// project forward CapEx for multi-project analyses.
#[derive(Debug, Clone, Copy)]
pub struct LearningCurve {
    rate: Rate,
}

impl LearningCurve {
    pub fn new(rate: Rate) -> BessEconResult<Self> {
        if rate < Decimal::ZERO || rate >= Decimal::ONE {
            return Err(BessEconError::InvalidInput {
                field: "learning_rate".into(),
                reason: "Learning rate must be in [0, 1)".into(),
            });
        }
        Ok(LearningCurve { rate })
    }

    /// Projected unit cost `years` out from the base year.
    pub fn projected_cost(&self, base_cost: Money, years: u32) -> Money {
        if years == 0 || self.rate.is_zero() {
            return base_cost;
        }
        base_cost * (Decimal::ONE - self.rate).powi(years as i64)
    }

    /// Forward CapEx projection for fleet-expansion or replacement
    /// analyses. Identical decline curve applied to the installed cost.
    pub fn capex_at_year(&self, base_capex_per_kwh: Money, years_from_base: u32) -> Money {
        self.projected_cost(base_capex_per_kwh, years_from_base)
    }
}
