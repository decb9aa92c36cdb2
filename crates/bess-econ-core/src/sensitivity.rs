use std::time::Instant;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::BessEconError;
use crate::metrics::{analyze_project, FinancialResults};
use crate::project::Project;
use crate::types::{with_metadata, ComputationOutput};
use crate::BessEconResult;

const DEFAULT_MAX_COMBINATIONS: usize = 1000;

/// The project inputs exposed to sensitivity sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepParameter {
    CapexPerKwh,
    FomPerKwYear,
    VomPerMwh,
    AugmentationPerKwh,
    LearningRate,
    DegradationRate,
    DiscountRate,
    ItcBaseRate,
    RoundTripEfficiency,
    /// Uniform multiplier on every benefit stream's first-year value.
    BenefitScale,
}

impl SweepParameter {
    pub fn name(&self) -> &'static str {
        match self {
            SweepParameter::CapexPerKwh => "capex_per_kwh",
            SweepParameter::FomPerKwYear => "fom_per_kw_year",
            SweepParameter::VomPerMwh => "vom_per_mwh",
            SweepParameter::AugmentationPerKwh => "augmentation_per_kwh",
            SweepParameter::LearningRate => "learning_rate",
            SweepParameter::DegradationRate => "degradation_rate_annual",
            SweepParameter::DiscountRate => "discount_rate",
            SweepParameter::ItcBaseRate => "itc_base_rate",
            SweepParameter::RoundTripEfficiency => "round_trip_efficiency",
            SweepParameter::BenefitScale => "benefit_scale",
        }
    }

    /// The parameter's current value in the unperturbed project.
    fn base_value(&self, project: &Project) -> Decimal {
        match self {
            SweepParameter::CapexPerKwh => project.costs.capex_per_kwh,
            SweepParameter::FomPerKwYear => project.costs.fom_per_kw_year,
            SweepParameter::VomPerMwh => project.costs.vom_per_mwh,
            SweepParameter::AugmentationPerKwh => project.costs.augmentation_per_kwh,
            SweepParameter::LearningRate => project.costs.learning_rate,
            SweepParameter::DegradationRate => project.costs.degradation_rate_annual,
            SweepParameter::DiscountRate => project.basics.discount_rate,
            SweepParameter::ItcBaseRate => project.tax_credits.itc_base_rate,
            SweepParameter::RoundTripEfficiency => project.technology.round_trip_efficiency,
            SweepParameter::BenefitScale => Decimal::ONE,
        }
    }

    fn apply(&self, project: &mut Project, value: Decimal) {
        match self {
            SweepParameter::CapexPerKwh => project.costs.capex_per_kwh = value,
            SweepParameter::FomPerKwYear => project.costs.fom_per_kw_year = value,
            SweepParameter::VomPerMwh => project.costs.vom_per_mwh = value,
            SweepParameter::AugmentationPerKwh => project.costs.augmentation_per_kwh = value,
            SweepParameter::LearningRate => project.costs.learning_rate = value,
            SweepParameter::DegradationRate => project.costs.degradation_rate_annual = value,
            SweepParameter::DiscountRate => project.basics.discount_rate = value,
            SweepParameter::ItcBaseRate => project.tax_credits.itc_base_rate = value,
            SweepParameter::RoundTripEfficiency => {
                project.technology.round_trip_efficiency = value
            }
            SweepParameter::BenefitScale => {
                for stream in &mut project.benefits.streams {
                    stream.first_year_value *= value;
                }
            }
        }
    }
}

/// How a sweep setting perturbs the parameter's base value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perturbation {
    /// Replace the base value outright.
    Absolute(Decimal),
    /// Shift the base value by a fraction: 0.20 means +20%.
    RelativePct(Decimal),
}

impl Perturbation {
    pub fn resolve(&self, base: Decimal) -> Decimal {
        match self {
            Perturbation::Absolute(value) => *value,
            Perturbation::RelativePct(pct) => base * (Decimal::ONE + pct),
        }
    }
}

/// One swept variable: a parameter and the settings to try for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepVariable {
    pub parameter: SweepParameter,
    pub settings: Vec<Perturbation>,
}

impl SweepVariable {
    pub fn new(parameter: SweepParameter, settings: Vec<Perturbation>) -> Self {
        SweepVariable {
            parameter,
            settings,
        }
    }

    /// Conventional three-point sweep: -pct, base, +pct.
    pub fn low_base_high(parameter: SweepParameter, pct: Decimal) -> Self {
        SweepVariable {
            parameter,
            settings: vec![
                Perturbation::RelativePct(-pct),
                Perturbation::RelativePct(Decimal::ZERO),
                Perturbation::RelativePct(pct),
            ],
        }
    }
}

/// Sensitivity run definition: the variables to sweep and a guard on the
/// size of the cartesian product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityInput {
    pub variables: Vec<SweepVariable>,
    #[serde(default = "default_max_combinations")]
    pub max_combinations: usize,
}

fn default_max_combinations() -> usize {
    DEFAULT_MAX_COMBINATIONS
}

impl SensitivityInput {
    pub fn new(variables: Vec<SweepVariable>) -> Self {
        SensitivityInput {
            variables,
            max_combinations: DEFAULT_MAX_COMBINATIONS,
        }
    }

    fn validate(&self) -> BessEconResult<usize> {
        if self.variables.is_empty() {
            return Err(BessEconError::Configuration {
                field: "variables".into(),
                reason: "Sensitivity run has no swept variables".into(),
            });
        }
        let mut total: usize = 1;
        for (i, variable) in self.variables.iter().enumerate() {
            if variable.settings.is_empty() {
                return Err(BessEconError::Configuration {
                    field: "variables".into(),
                    reason: format!(
                        "Variable {} has no settings",
                        variable.parameter.name()
                    ),
                });
            }
            if self.variables[..i]
                .iter()
                .any(|v| v.parameter == variable.parameter)
            {
                return Err(BessEconError::Configuration {
                    field: "variables".into(),
                    reason: format!("Duplicate swept parameter {}", variable.parameter.name()),
                });
            }
            total = total.saturating_mul(variable.settings.len());
        }
        if total > self.max_combinations {
            return Err(BessEconError::Configuration {
                field: "max_combinations".into(),
                reason: format!(
                    "Sweep produces {total} combinations, above the limit of {}",
                    self.max_combinations
                ),
            });
        }
        Ok(total)
    }
}

/// A resolved parameter setting as applied in one grid cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedSetting {
    pub parameter: SweepParameter,
    pub value: Decimal,
}

/// One cell of the sensitivity grid: the settings applied and the full
/// metric set under them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityCell {
    pub settings: Vec<AppliedSetting>,
    pub results: FinancialResults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityOutput {
    pub base_case: FinancialResults,
    pub cells: Vec<SensitivityCell>,
}

/// Evaluate the full cartesian product of the swept settings.
///
/// Each setting resolves against the ORIGINAL project's base value, so
/// relative perturbations never compound across cells. Cells whose
/// perturbed project fails validation or analysis are skipped with a
/// warning rather than aborting the run.
pub fn run_sensitivity(
    project: &Project,
    input: &SensitivityInput,
) -> BessEconResult<ComputationOutput<SensitivityOutput>> {
    let start = Instant::now();
    let total = input.validate()?;
    let mut warnings = Vec::new();

    let base_output = analyze_project(project)?;
    warnings.extend(
        base_output
            .warnings
            .iter()
            .map(|w| format!("base case: {w}")),
    );

    let base_values: Vec<Decimal> = input
        .variables
        .iter()
        .map(|v| v.parameter.base_value(project))
        .collect();

    let mut cells = Vec::with_capacity(total);
    for index in 0..total {
        let mut remainder = index;
        let mut perturbed = project.clone();
        let mut settings = Vec::with_capacity(input.variables.len());
        for (variable, base) in input.variables.iter().zip(&base_values) {
            let setting_index = remainder % variable.settings.len();
            remainder /= variable.settings.len();
            let value = variable.settings[setting_index].resolve(*base);
            variable.parameter.apply(&mut perturbed, value);
            settings.push(AppliedSetting {
                parameter: variable.parameter,
                value,
            });
        }
        match analyze_project(&perturbed) {
            Ok(output) => cells.push(SensitivityCell {
                settings,
                results: output.result,
            }),
            Err(e) => {
                let described: Vec<String> = settings
                    .iter()
                    .map(|s| format!("{}={}", s.parameter.name(), s.value))
                    .collect();
                warnings.push(format!(
                    "Skipped cell [{}]: {e}",
                    described.join(", ")
                ));
            }
        }
    }

    let output = SensitivityOutput {
        base_case: base_output.result,
        cells,
    };

    Ok(with_metadata(
        "One-at-a-time and cartesian-product sensitivity over the full metric set",
        input,
        warnings,
        start.elapsed().as_micros() as u64,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::BenefitStream;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn project_with_benefits() -> Project {
        let mut project = Project::default();
        project.benefits.streams = vec![
            BenefitStream::resource_adequacy(dec!(12_000_000), dec!(0.02)),
            BenefitStream::energy_arbitrage(dec!(9_300_000), dec!(0.02)),
        ];
        project
    }

    #[test]
    fn test_perturbation_resolution() {
        assert_eq!(Perturbation::Absolute(dec!(120)).resolve(dec!(160)), dec!(120));
        assert_eq!(
            Perturbation::RelativePct(dec!(0.25)).resolve(dec!(160)),
            dec!(200)
        );
        assert_eq!(
            Perturbation::RelativePct(dec!(-0.25)).resolve(dec!(160)),
            dec!(120)
        );
    }

    #[test]
    fn test_grid_size_is_settings_product() {
        let project = project_with_benefits();
        let input = SensitivityInput::new(vec![
            SweepVariable::low_base_high(SweepParameter::CapexPerKwh, dec!(0.2)),
            SweepVariable::low_base_high(SweepParameter::DiscountRate, dec!(0.2)),
        ]);
        let output = run_sensitivity(&project, &input).unwrap();
        assert_eq!(output.result.cells.len(), 9);
    }

    #[test]
    fn test_npv_falls_as_capex_rises() {
        let project = project_with_benefits();
        let input = SensitivityInput::new(vec![SweepVariable::new(
            SweepParameter::CapexPerKwh,
            vec![
                Perturbation::Absolute(dec!(120)),
                Perturbation::Absolute(dec!(160)),
                Perturbation::Absolute(dec!(200)),
            ],
        )]);
        let output = run_sensitivity(&project, &input).unwrap();
        let npvs: Vec<_> = output.result.cells.iter().map(|c| c.results.npv).collect();
        assert!(npvs[0] > npvs[1]);
        assert!(npvs[1] > npvs[2]);
    }

    #[test]
    fn test_base_setting_reproduces_base_case() {
        let project = project_with_benefits();
        let input = SensitivityInput::new(vec![SweepVariable::new(
            SweepParameter::DiscountRate,
            vec![Perturbation::RelativePct(Decimal::ZERO)],
        )]);
        let output = run_sensitivity(&project, &input).unwrap();
        assert_eq!(output.result.cells.len(), 1);
        assert_eq!(output.result.cells[0].results.npv, output.result.base_case.npv);
    }

    #[test]
    fn test_benefit_scale_sweeps_all_streams() {
        let project = project_with_benefits();
        let input = SensitivityInput::new(vec![SweepVariable::new(
            SweepParameter::BenefitScale,
            vec![Perturbation::Absolute(dec!(0.5)), Perturbation::Absolute(dec!(1))],
        )]);
        let output = run_sensitivity(&project, &input).unwrap();
        let halved = &output.result.cells[0].results;
        let full = &output.result.cells[1].results;
        let delta = (halved.pv_benefits - full.pv_benefits / dec!(2)).abs();
        assert!(delta < dec!(0.01), "delta: {delta}");
    }

    #[test]
    fn test_combination_limit_enforced() {
        let project = project_with_benefits();
        let mut input = SensitivityInput::new(vec![
            SweepVariable::low_base_high(SweepParameter::CapexPerKwh, dec!(0.2)),
            SweepVariable::low_base_high(SweepParameter::DiscountRate, dec!(0.2)),
        ]);
        input.max_combinations = 8;
        assert!(matches!(
            run_sensitivity(&project, &input),
            Err(BessEconError::Configuration { .. })
        ));
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let project = project_with_benefits();
        let input = SensitivityInput::new(vec![
            SweepVariable::low_base_high(SweepParameter::CapexPerKwh, dec!(0.1)),
            SweepVariable::low_base_high(SweepParameter::CapexPerKwh, dec!(0.2)),
        ]);
        assert!(matches!(
            run_sensitivity(&project, &input),
            Err(BessEconError::Configuration { .. })
        ));
    }

    #[test]
    fn test_invalid_cells_skipped_with_warning() {
        let project = project_with_benefits();
        let input = SensitivityInput::new(vec![SweepVariable::new(
            SweepParameter::DiscountRate,
            vec![
                Perturbation::Absolute(dec!(0.07)),
                // Out of the valid (0, 1) range; this cell must be skipped.
                Perturbation::Absolute(dec!(1.5)),
            ],
        )]);
        let output = run_sensitivity(&project, &input).unwrap();
        assert_eq!(output.result.cells.len(), 1);
        assert!(output.warnings.iter().any(|w| w.contains("Skipped cell")));
    }

    #[test]
    fn test_empty_variables_rejected() {
        let project = project_with_benefits();
        let input = SensitivityInput::new(vec![]);
        assert!(run_sensitivity(&project, &input).is_err());
    }
}
