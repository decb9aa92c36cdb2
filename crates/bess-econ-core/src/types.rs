use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::BessEconError;
use crate::BessEconResult;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Multiples and ratios (e.g., a 2.1x benefit-cost ratio)
pub type Multiple = Decimal;

/// Year fractions or counts
pub type Years = Decimal;

/// Currency code. A run uses a single currency throughout; no conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    USD,
    GBP,
    EUR,
    CAD,
    AUD,
    Other(String),
}

/// One year of the project cash flow, decomposed into benefit and cost
/// subtotals. Costs are positive magnitudes; `net` is always
/// `benefits - costs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearFlow {
    pub year: u32,
    pub benefits: Money,
    pub costs: Money,
    pub net: Money,
}

/// Per-stream benefit values across the analysis horizon (index 0..=N,
/// year 0 always zero).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenefitSeries {
    pub name: String,
    pub values: Vec<Money>,
}

/// The year-by-year cash flow model produced by the builder.
///
/// Benefit and cost subtotals are retained per year because the
/// benefit-cost ratio must be computed from the decomposed columns,
/// never from net flows with mixed signs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowSeries {
    /// One entry per year, contiguous from year 0 through year N.
    pub flows: Vec<YearFlow>,
    /// Energy discharged per year in MWh (index 0..=N; year 0 is zero).
    pub annual_energy_mwh: Vec<Money>,
    /// Per-stream benefit decomposition for reporting and breakdowns.
    pub benefit_detail: Vec<BenefitSeries>,
    pub currency: Currency,
}

impl CashFlowSeries {
    /// Number of operating years N (the series holds N + 1 entries).
    pub fn analysis_years(&self) -> usize {
        self.flows.len().saturating_sub(1)
    }

    pub fn net_flows(&self) -> Vec<Money> {
        self.flows.iter().map(|f| f.net).collect()
    }

    pub fn benefit_flows(&self) -> Vec<Money> {
        self.flows.iter().map(|f| f.benefits).collect()
    }

    pub fn cost_flows(&self) -> Vec<Money> {
        self.flows.iter().map(|f| f.costs).collect()
    }

    /// Check the series shape: one entry per year, contiguous from year 0,
    /// net equal to benefits minus costs, and an aligned energy series.
    pub fn validate(&self) -> BessEconResult<()> {
        if self.flows.is_empty() {
            return Err(BessEconError::InvalidInput {
                field: "flows".into(),
                reason: "Cash flow series is empty".into(),
            });
        }
        for (t, flow) in self.flows.iter().enumerate() {
            if flow.year as usize != t {
                return Err(BessEconError::InvalidInput {
                    field: "flows".into(),
                    reason: format!("Expected year {t}, found year {}", flow.year),
                });
            }
            if flow.net != flow.benefits - flow.costs {
                return Err(BessEconError::InvalidInput {
                    field: "flows".into(),
                    reason: format!(
                        "Year {}: net {} does not equal benefits {} minus costs {}",
                        flow.year, flow.net, flow.benefits, flow.costs
                    ),
                });
            }
        }
        if self.annual_energy_mwh.len() != self.flows.len() {
            return Err(BessEconError::InvalidInput {
                field: "annual_energy_mwh".into(),
                reason: format!(
                    "Energy series has {} entries, expected {}",
                    self.annual_energy_mwh.len(),
                    self.flows.len()
                ),
            });
        }
        Ok(())
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
