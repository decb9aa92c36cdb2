use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use bess_econ_core::sensitivity::{self, SensitivityInput, SweepParameter, SweepVariable};

use crate::commands::analyze::{load_project, AnalyzeArgs};
use crate::input;

/// Arguments for a sensitivity run. The sweep comes either from a JSON
/// file describing the full grid, or from `--var` flags that build a
/// conventional low/base/high sweep per parameter.
#[derive(Args)]
pub struct SensitivityArgs {
    #[command(flatten)]
    pub project: AnalyzeArgs,

    /// Path to a JSON sweep definition (variables and settings)
    #[arg(long)]
    pub sweep: Option<String>,

    /// Parameter to sweep low/base/high, repeatable
    /// (e.g. --var capex_per_kwh --var discount_rate)
    #[arg(long = "var", conflicts_with = "sweep")]
    pub vars: Vec<String>,

    /// Relative swing for --var sweeps (0.2 = -20% / base / +20%)
    #[arg(long, default_value = "0.2")]
    pub swing: Decimal,

    /// Cap on the total number of grid cells
    #[arg(long)]
    pub max_combinations: Option<usize>,
}

fn parse_parameter(name: &str) -> Result<SweepParameter, Box<dyn std::error::Error>> {
    serde_json::from_value(Value::String(name.to_string()))
        .map_err(|_| format!("Unknown sweep parameter '{name}'").into())
}

pub fn run_sensitivity(args: SensitivityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let project = load_project(&args.project)?;

    let mut input: SensitivityInput = match &args.sweep {
        Some(path) => input::read_json(path)?,
        None => {
            if args.vars.is_empty() {
                return Err("Provide either --sweep FILE or at least one --var PARAMETER".into());
            }
            if args.swing <= Decimal::ZERO {
                return Err("--swing must be positive".into());
            }
            let swing = args.swing;
            let variables = args
                .vars
                .iter()
                .map(|name| {
                    parse_parameter(name).map(|p| SweepVariable::low_base_high(p, swing))
                })
                .collect::<Result<Vec<_>, _>>()?;
            SensitivityInput::new(variables)
        }
    };

    if let Some(cap) = args.max_combinations {
        input.max_combinations = cap;
    }

    let output = sensitivity::run_sensitivity(&project, &input)?;
    Ok(serde_json::to_value(&output)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bess_econ_core::sensitivity::Perturbation;
    use std::str::FromStr;

    #[test]
    fn test_parse_parameter_names() {
        assert!(matches!(
            parse_parameter("capex_per_kwh").unwrap(),
            SweepParameter::CapexPerKwh
        ));
        assert!(matches!(
            parse_parameter("benefit_scale").unwrap(),
            SweepParameter::BenefitScale
        ));
        assert!(parse_parameter("not_a_parameter").is_err());
    }

    #[test]
    fn test_var_flags_build_low_base_high() {
        let parameter = parse_parameter("discount_rate").unwrap();
        let variable = SweepVariable::low_base_high(parameter, Decimal::from_str("0.2").unwrap());
        assert_eq!(variable.settings.len(), 3);
        assert!(matches!(variable.settings[1], Perturbation::RelativePct(p) if p.is_zero()));
    }
}
