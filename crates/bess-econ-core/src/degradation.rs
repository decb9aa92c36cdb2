use rust_decimal::{Decimal, MathematicalOps};

use crate::error::BessEconError;
use crate::types::{Money, Rate};
use crate::BessEconResult;

/// Geometric capacity-fade model: capacity at year t is
/// `C0 × (1 - d)^t`.
#[derive(Debug, Clone, Copy)]
pub struct DegradationModel {
    rate: Rate,
}

impl DegradationModel {
    pub fn new(rate: Rate) -> BessEconResult<Self> {
        if rate < Decimal::ZERO || rate >= Decimal::ONE {
            return Err(BessEconError::InvalidInput {
                field: "degradation_rate_annual".into(),
                reason: "Degradation rate must be in [0, 1)".into(),
            });
        }
        Ok(DegradationModel { rate })
    }

    /// Remaining capacity fraction at year t. Exactly 1 at t = 0, and
    /// exactly 1 at every year when the rate is zero.
    pub fn factor(&self, year: u32) -> Rate {
        if year == 0 || self.rate.is_zero() {
            return Decimal::ONE;
        }
        (Decimal::ONE - self.rate).powi(year as i64)
    }

    pub fn capacity_at(&self, initial: Money, year: u32) -> Money {
        initial * self.factor(year)
    }

    /// Capacity at each year from 0 through `years` inclusive.
    pub fn schedule(&self, initial: Money, years: u32) -> Vec<Money> {
        (0..=years).map(|t| self.capacity_at(initial, t)).collect()
    }
}
