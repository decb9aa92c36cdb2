//! Cost-benefit economics engine for utility-scale battery energy
//! storage (BESS) projects.
//!
//! The engine builds a year-by-year cash flow model from typed project
//! inputs (capital stack with investment tax credit, operating costs,
//! escalated benefit streams, capacity degradation, learning-curve
//! priced augmentation) and derives the standard investment metrics
//! from it: NPV, IRR, benefit-cost ratio, LCOS, payback, and breakeven
//! CapEx. All arithmetic is `rust_decimal`; no floating point touches a
//! dollar figure.

pub mod cashflow;
pub mod degradation;
pub mod error;
pub mod learning;
pub mod library;
pub mod metrics;
pub mod project;
pub mod sensitivity;
pub mod types;

pub use cashflow::build_cash_flows;
pub use degradation::DegradationModel;
pub use error::BessEconError;
pub use learning::LearningCurve;
pub use library::AssumptionPreset;
pub use metrics::{analyze_project, FinancialResults, IrrSolution};
pub use project::{Project, ProjectOverrides};
pub use sensitivity::{run_sensitivity, SensitivityInput, SensitivityOutput};
pub use types::{CashFlowSeries, ComputationOutput, Money, Rate};

pub type BessEconResult<T> = Result<T, BessEconError>;
