use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::project::{BenefitStream, Project};
use crate::types::{Money, Rate};
use crate::BessEconResult;

/// Optional overrides for the cost block. Unset fields leave the
/// project's values alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CostOverrides {
    pub capex_per_kwh: Option<Money>,
    pub interconnection_per_kw: Option<Money>,
    pub land_per_kw: Option<Money>,
    pub permitting_per_kw: Option<Money>,
    pub fom_per_kw_year: Option<Money>,
    pub vom_per_mwh: Option<Money>,
    pub om_escalation: Option<Rate>,
    pub insurance_pct_of_capex: Option<Rate>,
    pub property_tax_pct: Option<Rate>,
    pub decommissioning_per_kw: Option<Money>,
    pub augmentation_per_kwh: Option<Money>,
    pub augmentation_year: Option<u32>,
    pub learning_rate: Option<Rate>,
    pub degradation_rate_annual: Option<Rate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnologyOverrides {
    pub chemistry: Option<String>,
    pub round_trip_efficiency: Option<Rate>,
    pub cycles_per_day: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxCreditOverrides {
    pub itc_base_rate: Option<Rate>,
    pub energy_community_adder: Option<Rate>,
    pub domestic_content_adder: Option<Rate>,
    pub low_income_adder: Option<Rate>,
}

/// A named, versioned set of default assumptions from a published
/// source. Applying a preset overlays its set fields onto a project
/// and revalidates the whole; the project records which preset was
/// applied last.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssumptionPreset {
    pub name: String,
    pub version: String,
    pub source: String,
    pub notes: String,
    pub costs: CostOverrides,
    pub technology: TechnologyOverrides,
    pub tax_credits: TaxCreditOverrides,
    /// When set, replaces the project's benefit streams wholesale.
    pub benefits: Option<Vec<BenefitStream>>,
}

impl AssumptionPreset {
    /// Utility-scale 4-hour LFP assumptions in the spirit of the NREL
    /// Annual Technology Baseline moderate case.
    pub fn atb_moderate_2024() -> Self {
        AssumptionPreset {
            name: "atb-moderate-2024".into(),
            version: "2024".into(),
            source: "NREL Annual Technology Baseline 2024, utility-scale battery storage".into(),
            notes: "Moderate-trajectory installed cost and O&M for 4-hour LFP".into(),
            costs: CostOverrides {
                capex_per_kwh: Some(dec!(160)),
                fom_per_kw_year: Some(dec!(25)),
                learning_rate: Some(dec!(0.10)),
                degradation_rate_annual: Some(dec!(0.025)),
                ..Default::default()
            },
            technology: TechnologyOverrides {
                chemistry: Some("LFP".into()),
                round_trip_efficiency: Some(dec!(0.85)),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Conservative merchant-market assumptions: higher costs, faster
    /// fade, no ITC adders.
    pub fn conservative_2024() -> Self {
        AssumptionPreset {
            name: "conservative-2024".into(),
            version: "2024".into(),
            source: "In-house conservative screening case".into(),
            notes: "High-cost, high-degradation bound for screening analyses".into(),
            costs: CostOverrides {
                capex_per_kwh: Some(dec!(200)),
                fom_per_kw_year: Some(dec!(30)),
                learning_rate: Some(dec!(0.05)),
                degradation_rate_annual: Some(dec!(0.035)),
                augmentation_per_kwh: Some(dec!(70)),
                ..Default::default()
            },
            tax_credits: TaxCreditOverrides {
                itc_base_rate: Some(dec!(0.30)),
                energy_community_adder: Some(Decimal::ZERO),
                domestic_content_adder: Some(Decimal::ZERO),
                low_income_adder: Some(Decimal::ZERO),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// All presets shipped with the engine, looked up by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "atb-moderate-2024" => Some(Self::atb_moderate_2024()),
            "conservative-2024" => Some(Self::conservative_2024()),
            _ => None,
        }
    }

    pub fn builtin_names() -> Vec<&'static str> {
        vec!["atb-moderate-2024", "conservative-2024"]
    }

    /// Overlay the preset onto a project, then validate the merged
    /// result. On validation failure the project may hold a partial
    /// merge; callers wanting transactional behavior should clone
    /// first.
    pub fn apply_to(&self, project: &mut Project) -> BessEconResult<()> {
        let c = &self.costs;
        merge(&mut project.costs.capex_per_kwh, &c.capex_per_kwh);
        merge(
            &mut project.costs.interconnection_per_kw,
            &c.interconnection_per_kw,
        );
        merge(&mut project.costs.land_per_kw, &c.land_per_kw);
        merge(&mut project.costs.permitting_per_kw, &c.permitting_per_kw);
        merge(&mut project.costs.fom_per_kw_year, &c.fom_per_kw_year);
        merge(&mut project.costs.vom_per_mwh, &c.vom_per_mwh);
        merge(&mut project.costs.om_escalation, &c.om_escalation);
        merge(
            &mut project.costs.insurance_pct_of_capex,
            &c.insurance_pct_of_capex,
        );
        merge(&mut project.costs.property_tax_pct, &c.property_tax_pct);
        merge(
            &mut project.costs.decommissioning_per_kw,
            &c.decommissioning_per_kw,
        );
        merge(
            &mut project.costs.augmentation_per_kwh,
            &c.augmentation_per_kwh,
        );
        merge(&mut project.costs.augmentation_year, &c.augmentation_year);
        merge(&mut project.costs.learning_rate, &c.learning_rate);
        merge(
            &mut project.costs.degradation_rate_annual,
            &c.degradation_rate_annual,
        );

        let t = &self.technology;
        merge(&mut project.technology.chemistry, &t.chemistry);
        merge(
            &mut project.technology.round_trip_efficiency,
            &t.round_trip_efficiency,
        );
        merge(&mut project.technology.cycles_per_day, &t.cycles_per_day);

        let tc = &self.tax_credits;
        merge(&mut project.tax_credits.itc_base_rate, &tc.itc_base_rate);
        merge(
            &mut project.tax_credits.energy_community_adder,
            &tc.energy_community_adder,
        );
        merge(
            &mut project.tax_credits.domestic_content_adder,
            &tc.domestic_content_adder,
        );
        merge(
            &mut project.tax_credits.low_income_adder,
            &tc.low_income_adder,
        );

        if let Some(streams) = &self.benefits {
            project.benefits.streams = streams.clone();
        }

        project.validate()?;
        project.assumption_library = Some(self.name.clone());
        Ok(())
    }
}

fn merge<T: Clone>(target: &mut T, source: &Option<T>) {
    if let Some(value) = source {
        *target = value.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_preset_overlays_only_set_fields() {
        let mut project = Project::default();
        project.costs.vom_per_mwh = dec!(2);
        let preset = AssumptionPreset::conservative_2024();
        preset.apply_to(&mut project).unwrap();

        assert_eq!(project.costs.capex_per_kwh, dec!(200));
        assert_eq!(project.costs.degradation_rate_annual, dec!(0.035));
        // Unset in the preset: survives untouched.
        assert_eq!(project.costs.vom_per_mwh, dec!(2));
        assert_eq!(project.costs.augmentation_year, 12);
        assert_eq!(
            project.assumption_library.as_deref(),
            Some("conservative-2024")
        );
    }

    #[test]
    fn test_preset_benefit_replacement() {
        let mut project = Project::default();
        project.benefits.streams = vec![BenefitStream::resource_adequacy(
            dec!(1_000_000),
            Decimal::ZERO,
        )];
        let mut preset = AssumptionPreset::atb_moderate_2024();
        preset.benefits = Some(vec![
            BenefitStream::energy_arbitrage(dec!(5_000_000), dec!(0.02)),
            BenefitStream::td_deferral(dec!(2_000_000), Decimal::ZERO),
        ]);
        preset.apply_to(&mut project).unwrap();
        assert_eq!(project.benefits.streams.len(), 2);
        assert_eq!(project.benefits.streams[0].name, "Energy Arbitrage");
    }

    #[test]
    fn test_invalid_preset_fails_validation() {
        let mut project = Project::default();
        let preset = AssumptionPreset {
            name: "broken".into(),
            costs: CostOverrides {
                degradation_rate_annual: Some(dec!(1.5)),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(preset.apply_to(&mut project).is_err());
    }

    #[test]
    fn test_builtin_lookup() {
        assert!(AssumptionPreset::builtin("atb-moderate-2024").is_some());
        assert!(AssumptionPreset::builtin("no-such-preset").is_none());
        assert_eq!(AssumptionPreset::builtin_names().len(), 2);
    }

    #[test]
    fn test_preset_serde_round_trip() {
        let preset = AssumptionPreset::atb_moderate_2024();
        let json = serde_json::to_string(&preset).unwrap();
        let back: AssumptionPreset = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, preset.name);
        assert_eq!(back.costs.capex_per_kwh, preset.costs.capex_per_kwh);
    }
}
