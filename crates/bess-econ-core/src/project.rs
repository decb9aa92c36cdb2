use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::BessEconError;
use crate::types::{Currency, Money, Rate};
use crate::BessEconResult;

/// Statutory ceiling on the combined investment tax credit rate.
pub const MAX_ITC_RATE: Decimal = dec!(0.50);

const KW_PER_MW: Decimal = dec!(1000);

/// Who owns the asset. Affects how downstream consumers treat the
/// results (rate-base vs merchant revenue framing); the engine carries
/// it through unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnershipType {
    #[default]
    Utility,
    Merchant,
}

/// Basic project identification and sizing parameters.
///
/// Immutable once a calculation run starts: the engine takes the project
/// by reference and never mutates or retains it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectBasics {
    pub name: String,
    pub location: String,
    /// Nameplate power capacity in MW. Must be positive.
    pub capacity_mw: Decimal,
    /// Storage duration in hours. Must be positive.
    pub duration_hours: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_service_date: Option<NaiveDate>,
    /// Economic analysis horizon in years (N). At least 1.
    pub analysis_period_years: u32,
    /// Nominal discount rate as a decimal, strictly between 0 and 1.
    pub discount_rate: Rate,
    pub ownership_type: OwnershipType,
    pub currency: Currency,
}

impl Default for ProjectBasics {
    fn default() -> Self {
        ProjectBasics {
            name: String::new(),
            location: String::new(),
            capacity_mw: dec!(100),
            duration_hours: dec!(4),
            in_service_date: None,
            analysis_period_years: 20,
            discount_rate: dec!(0.07),
            ownership_type: OwnershipType::Utility,
            currency: Currency::USD,
        }
    }
}

impl ProjectBasics {
    /// Energy capacity in MWh, derived as MW × hours.
    pub fn capacity_mwh(&self) -> Decimal {
        self.capacity_mw * self.duration_hours
    }

    pub fn capacity_kw(&self) -> Decimal {
        self.capacity_mw * KW_PER_MW
    }

    pub fn capacity_kwh(&self) -> Decimal {
        self.capacity_mwh() * KW_PER_MW
    }

    pub fn validate(&self) -> BessEconResult<()> {
        if self.capacity_mw <= Decimal::ZERO {
            return Err(invalid("capacity_mw", "Capacity must be positive"));
        }
        if self.duration_hours <= Decimal::ZERO {
            return Err(invalid("duration_hours", "Duration must be positive"));
        }
        if self.analysis_period_years < 1 {
            return Err(invalid(
                "analysis_period_years",
                "Analysis period must be at least 1 year",
            ));
        }
        if self.discount_rate <= Decimal::ZERO || self.discount_rate >= Decimal::ONE {
            return Err(invalid(
                "discount_rate",
                "Discount rate must be strictly between 0 and 1",
            ));
        }
        Ok(())
    }
}

/// Battery technology parameters feeding the throughput model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnologySpecs {
    pub chemistry: String,
    /// AC-AC round-trip efficiency, between 0.5 and 1.
    pub round_trip_efficiency: Rate,
    /// Assumed full cycles per day for the throughput and LCOS models.
    pub cycles_per_day: Decimal,
}

impl Default for TechnologySpecs {
    fn default() -> Self {
        TechnologySpecs {
            chemistry: "LFP".into(),
            round_trip_efficiency: dec!(0.85),
            cycles_per_day: Decimal::ONE,
        }
    }
}

impl TechnologySpecs {
    pub fn validate(&self) -> BessEconResult<()> {
        if self.round_trip_efficiency < dec!(0.5) || self.round_trip_efficiency > Decimal::ONE {
            return Err(invalid(
                "round_trip_efficiency",
                "Round-trip efficiency must be between 0.5 and 1.0",
            ));
        }
        if self.cycles_per_day <= Decimal::ZERO {
            return Err(invalid("cycles_per_day", "Cycle count must be positive"));
        }
        Ok(())
    }
}

/// Project cost parameters, in real (constant) currency units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostInputs {
    /// Installed battery capital cost per kWh of energy capacity.
    pub capex_per_kwh: Money,
    /// Interconnection and network upgrade costs per kW.
    pub interconnection_per_kw: Money,
    /// Land acquisition or capitalized lease cost per kW.
    pub land_per_kw: Money,
    /// Permitting and environmental review costs per kW.
    pub permitting_per_kw: Money,
    /// Fixed operations and maintenance cost per kW-year.
    pub fom_per_kw_year: Money,
    /// Variable O&M cost per MWh discharged.
    pub vom_per_mwh: Money,
    /// Annual escalation applied to fixed and variable O&M from year 2 on.
    pub om_escalation: Rate,
    /// Annual insurance as a fraction of as-built CapEx. Non-escalating.
    pub insurance_pct_of_capex: Rate,
    /// Annual property tax as a fraction of declining book value.
    pub property_tax_pct: Rate,
    /// End-of-life decommissioning cost per kW.
    pub decommissioning_per_kw: Money,
    /// Battery replacement (augmentation) base cost per kWh.
    pub augmentation_per_kwh: Money,
    /// Operating year in which augmentation occurs. Must fall within
    /// [1, analysis period]; checked at the project level.
    pub augmentation_year: u32,
    /// Annual technology cost decline fraction (0.10 = 10% per year).
    pub learning_rate: Rate,
    /// Annual capacity fade fraction.
    pub degradation_rate_annual: Rate,
}

impl Default for CostInputs {
    fn default() -> Self {
        CostInputs {
            capex_per_kwh: dec!(160),
            interconnection_per_kw: dec!(100),
            land_per_kw: dec!(10),
            permitting_per_kw: dec!(15),
            fom_per_kw_year: dec!(25),
            vom_per_mwh: Decimal::ZERO,
            om_escalation: Decimal::ZERO,
            insurance_pct_of_capex: dec!(0.005),
            property_tax_pct: dec!(0.01),
            decommissioning_per_kw: dec!(10),
            augmentation_per_kwh: dec!(55),
            augmentation_year: 12,
            learning_rate: dec!(0.10),
            degradation_rate_annual: dec!(0.025),
        }
    }
}

impl CostInputs {
    pub fn validate(&self) -> BessEconResult<()> {
        let non_negative: [(&str, Money); 8] = [
            ("capex_per_kwh", self.capex_per_kwh),
            ("interconnection_per_kw", self.interconnection_per_kw),
            ("land_per_kw", self.land_per_kw),
            ("permitting_per_kw", self.permitting_per_kw),
            ("fom_per_kw_year", self.fom_per_kw_year),
            ("vom_per_mwh", self.vom_per_mwh),
            ("decommissioning_per_kw", self.decommissioning_per_kw),
            ("augmentation_per_kwh", self.augmentation_per_kwh),
        ];
        for (field, value) in non_negative {
            if value < Decimal::ZERO {
                return Err(invalid(field, "Cost must be non-negative"));
            }
        }
        let unit_interval: [(&str, Rate); 4] = [
            ("insurance_pct_of_capex", self.insurance_pct_of_capex),
            ("property_tax_pct", self.property_tax_pct),
            ("learning_rate", self.learning_rate),
            ("degradation_rate_annual", self.degradation_rate_annual),
        ];
        for (field, value) in unit_interval {
            if value < Decimal::ZERO || value >= Decimal::ONE {
                return Err(invalid(field, "Rate must be in [0, 1)"));
            }
        }
        if self.om_escalation <= dec!(-1) {
            return Err(invalid(
                "om_escalation",
                "Escalation must be greater than -100%",
            ));
        }
        Ok(())
    }
}

/// Investment tax credit rates. The credit applies to battery CapEx
/// only, never to infrastructure costs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxCreditInputs {
    /// Base ITC rate (IRA base is 30%).
    pub itc_base_rate: Rate,
    pub energy_community_adder: Rate,
    pub domestic_content_adder: Rate,
    pub low_income_adder: Rate,
}

impl Default for TaxCreditInputs {
    fn default() -> Self {
        TaxCreditInputs {
            itc_base_rate: dec!(0.30),
            energy_community_adder: Decimal::ZERO,
            domestic_content_adder: Decimal::ZERO,
            low_income_adder: Decimal::ZERO,
        }
    }
}

impl TaxCreditInputs {
    /// Combined rate: base plus adders, capped at the statutory maximum.
    pub fn total_rate(&self) -> Rate {
        let combined = self.itc_base_rate
            + self.energy_community_adder
            + self.domestic_content_adder
            + self.low_income_adder;
        combined.min(MAX_ITC_RATE)
    }

    pub fn validate(&self) -> BessEconResult<()> {
        if self.itc_base_rate < Decimal::ZERO || self.itc_base_rate > MAX_ITC_RATE {
            return Err(invalid("itc_base_rate", "Base ITC rate must be in [0, 0.5]"));
        }
        let adders: [(&str, Rate); 3] = [
            ("energy_community_adder", self.energy_community_adder),
            ("domestic_content_adder", self.domestic_content_adder),
            ("low_income_adder", self.low_income_adder),
        ];
        for (field, value) in adders {
            if value < Decimal::ZERO || value > dec!(0.20) {
                return Err(invalid(field, "ITC adder must be in [0, 0.2]"));
            }
        }
        Ok(())
    }
}

/// Whether a benefit stream is common to all utility projects or
/// specific to battery storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BenefitCategory {
    #[default]
    Common,
    BessSpecific,
}

/// How a benefit stream responds to capacity fade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenefitLinkage {
    /// Scales with degraded energy capacity (e.g. arbitrage).
    Energy,
    /// Capacity payment; derated only when `derate` is set on the stream.
    Capacity,
    /// Paid regardless of capacity fade.
    #[default]
    Fixed,
}

/// A single benefit or revenue stream: a first-year value escalated
/// annually at its own rate over the analysis horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenefitStream {
    pub name: String,
    pub first_year_value: Money,
    #[serde(default)]
    pub escalation: Rate,
    #[serde(default)]
    pub category: BenefitCategory,
    #[serde(default)]
    pub linkage: BenefitLinkage,
    /// Only meaningful for capacity-linked streams: when set, the
    /// payment derates with capacity fade.
    #[serde(default)]
    pub derate: bool,
}

impl BenefitStream {
    pub fn new(
        name: impl Into<String>,
        first_year_value: Money,
        escalation: Rate,
        category: BenefitCategory,
        linkage: BenefitLinkage,
    ) -> Self {
        BenefitStream {
            name: name.into(),
            first_year_value,
            escalation,
            category,
            linkage,
            derate: false,
        }
    }

    pub fn resource_adequacy(value: Money, escalation: Rate) -> Self {
        Self::new(
            "Resource Adequacy",
            value,
            escalation,
            BenefitCategory::Common,
            BenefitLinkage::Capacity,
        )
    }

    pub fn energy_arbitrage(value: Money, escalation: Rate) -> Self {
        Self::new(
            "Energy Arbitrage",
            value,
            escalation,
            BenefitCategory::Common,
            BenefitLinkage::Energy,
        )
    }

    pub fn ancillary_services(value: Money, escalation: Rate) -> Self {
        Self::new(
            "Ancillary Services",
            value,
            escalation,
            BenefitCategory::Common,
            BenefitLinkage::Capacity,
        )
    }

    pub fn td_deferral(value: Money, escalation: Rate) -> Self {
        Self::new(
            "T&D Deferral",
            value,
            escalation,
            BenefitCategory::Common,
            BenefitLinkage::Fixed,
        )
    }

    pub fn resilience(value: Money, escalation: Rate) -> Self {
        Self::new(
            "Resilience",
            value,
            escalation,
            BenefitCategory::BessSpecific,
            BenefitLinkage::Fixed,
        )
    }

    pub fn renewable_integration(value: Money, escalation: Rate) -> Self {
        Self::new(
            "Renewable Integration",
            value,
            escalation,
            BenefitCategory::BessSpecific,
            BenefitLinkage::Energy,
        )
    }

    pub fn ghg_value(value: Money, escalation: Rate) -> Self {
        Self::new(
            "GHG Value",
            value,
            escalation,
            BenefitCategory::BessSpecific,
            BenefitLinkage::Energy,
        )
    }

    pub fn voltage_support(value: Money, escalation: Rate) -> Self {
        Self::new(
            "Voltage Support",
            value,
            escalation,
            BenefitCategory::BessSpecific,
            BenefitLinkage::Fixed,
        )
    }

    pub fn validate(&self) -> BessEconResult<()> {
        if self.name.is_empty() {
            return Err(invalid("benefits.name", "Benefit stream name is empty"));
        }
        if self.first_year_value < Decimal::ZERO {
            return Err(invalid(
                "benefits.first_year_value",
                "Benefit value must be non-negative",
            ));
        }
        if self.escalation <= dec!(-1) {
            return Err(invalid(
                "benefits.escalation",
                "Escalation must be greater than -100%",
            ));
        }
        Ok(())
    }
}

/// The full set of benefit streams for a project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenefitInputs {
    pub streams: Vec<BenefitStream>,
}

impl BenefitInputs {
    pub fn total_first_year(&self) -> Money {
        self.streams.iter().map(|s| s.first_year_value).sum()
    }

    pub fn validate(&self) -> BessEconResult<()> {
        for stream in &self.streams {
            stream.validate()?;
        }
        Ok(())
    }
}

/// Complete BESS project: all engine inputs in one caller-owned value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub basics: ProjectBasics,
    pub technology: TechnologySpecs,
    pub costs: CostInputs,
    pub tax_credits: TaxCreditInputs,
    pub benefits: BenefitInputs,
    /// Name of the assumption library last applied, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assumption_library: Option<String>,
}

impl Project {
    /// Run every field-level check plus the cross-field modeling
    /// constraints. Called before any computation begins; the engine
    /// performs no partial work on invalid input.
    pub fn validate(&self) -> BessEconResult<()> {
        self.basics.validate()?;
        self.technology.validate()?;
        self.costs.validate()?;
        self.tax_credits.validate()?;
        self.benefits.validate()?;

        let n = self.basics.analysis_period_years;
        if self.costs.augmentation_year == 0 || self.costs.augmentation_year > n {
            return Err(BessEconError::Configuration {
                field: "augmentation_year".into(),
                reason: format!(
                    "Augmentation year {} must fall within [1, {n}]",
                    self.costs.augmentation_year
                ),
            });
        }
        Ok(())
    }
}

/// Declared, typed overrides for individual project fields.
///
/// Every field is optional; set fields are merged into the project and
/// the result is revalidated as a whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectOverrides {
    pub capacity_mw: Option<Decimal>,
    pub duration_hours: Option<Decimal>,
    pub analysis_period_years: Option<u32>,
    pub discount_rate: Option<Rate>,
    pub capex_per_kwh: Option<Money>,
    pub fom_per_kw_year: Option<Money>,
    pub itc_base_rate: Option<Rate>,
    pub learning_rate: Option<Rate>,
    pub degradation_rate_annual: Option<Rate>,
}

impl ProjectOverrides {
    pub fn apply_to(&self, project: &mut Project) -> BessEconResult<()> {
        if let Some(v) = self.capacity_mw {
            project.basics.capacity_mw = v;
        }
        if let Some(v) = self.duration_hours {
            project.basics.duration_hours = v;
        }
        if let Some(v) = self.analysis_period_years {
            project.basics.analysis_period_years = v;
        }
        if let Some(v) = self.discount_rate {
            project.basics.discount_rate = v;
        }
        if let Some(v) = self.capex_per_kwh {
            project.costs.capex_per_kwh = v;
        }
        if let Some(v) = self.fom_per_kw_year {
            project.costs.fom_per_kw_year = v;
        }
        if let Some(v) = self.itc_base_rate {
            project.tax_credits.itc_base_rate = v;
        }
        if let Some(v) = self.learning_rate {
            project.costs.learning_rate = v;
        }
        if let Some(v) = self.degradation_rate_annual {
            project.costs.degradation_rate_annual = v;
        }
        project.validate()
    }
}

fn invalid(field: &str, reason: &str) -> BessEconError {
    BessEconError::InvalidInput {
        field: field.into(),
        reason: reason.into(),
    }
}
