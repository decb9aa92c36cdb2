use clap::Args;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use bess_econ_core::cashflow::build_cash_flows;
use bess_econ_core::library::AssumptionPreset;
use bess_econ_core::metrics::analyze_project;
use bess_econ_core::project::{Project, ProjectOverrides};

use crate::input;

/// Arguments shared by the analysis commands: where the project comes
/// from and what gets overlaid on it before the run.
#[derive(Args)]
pub struct AnalyzeArgs {
    /// Path to a project JSON file. Omitted fields take the engine
    /// defaults (100 MW / 4 h / 20 years at 7%).
    #[arg(long)]
    pub input: Option<String>,

    /// Built-in assumption preset to overlay (see `bessa presets`)
    #[arg(long)]
    pub preset: Option<String>,

    /// Path to a JSON assumption preset file
    #[arg(long, conflicts_with = "preset")]
    pub preset_file: Option<String>,

    /// Override nameplate capacity in MW
    #[arg(long)]
    pub capacity_mw: Option<Decimal>,

    /// Override storage duration in hours
    #[arg(long)]
    pub duration_hours: Option<Decimal>,

    /// Override the analysis horizon in years
    #[arg(long)]
    pub analysis_period_years: Option<u32>,

    /// Override the discount rate (e.g. 0.07 for 7%)
    #[arg(long)]
    pub discount_rate: Option<Decimal>,

    /// Override battery CapEx in $/kWh
    #[arg(long)]
    pub capex_per_kwh: Option<Decimal>,

    /// Override fixed O&M in $/kW-year
    #[arg(long)]
    pub fom_per_kw_year: Option<Decimal>,

    /// Override the base ITC rate (e.g. 0.30 for 30%)
    #[arg(long)]
    pub itc_base_rate: Option<Decimal>,

    /// Override the annual technology learning rate
    #[arg(long)]
    pub learning_rate: Option<Decimal>,

    /// Override the annual capacity fade rate
    #[arg(long)]
    pub degradation_rate: Option<Decimal>,
}

#[derive(Args)]
pub struct CashFlowsArgs {
    #[command(flatten)]
    pub project: AnalyzeArgs,
}

/// Resolve the project from file, preset, and flag overrides, in that
/// order of application.
pub fn load_project(args: &AnalyzeArgs) -> Result<Project, Box<dyn std::error::Error>> {
    let mut project: Project = match &args.input {
        Some(path) => input::read_json(path)?,
        None => Project::default(),
    };

    if let Some(name) = &args.preset {
        let preset = AssumptionPreset::builtin(name)
            .ok_or_else(|| format!("Unknown preset '{name}' (see `bessa presets`)"))?;
        preset.apply_to(&mut project)?;
    } else if let Some(path) = &args.preset_file {
        let preset: AssumptionPreset = input::read_json(path)?;
        preset.apply_to(&mut project)?;
    }

    let overrides = ProjectOverrides {
        capacity_mw: args.capacity_mw,
        duration_hours: args.duration_hours,
        analysis_period_years: args.analysis_period_years,
        discount_rate: args.discount_rate,
        capex_per_kwh: args.capex_per_kwh,
        fom_per_kw_year: args.fom_per_kw_year,
        itc_base_rate: args.itc_base_rate,
        learning_rate: args.learning_rate,
        degradation_rate_annual: args.degradation_rate,
    };
    overrides.apply_to(&mut project)?;
    Ok(project)
}

pub fn run_analyze(args: AnalyzeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let project = load_project(&args)?;
    let output = analyze_project(&project)?;
    Ok(serde_json::to_value(&output)?)
}

pub fn run_cash_flows(args: CashFlowsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let project = load_project(&args.project)?;
    let series = build_cash_flows(&project)?;

    let mut cumulative = Decimal::ZERO;
    let rows: Vec<Value> = series
        .flows
        .iter()
        .map(|flow| {
            cumulative += flow.net;
            json!({
                "year": flow.year,
                "benefits": flow.benefits,
                "costs": flow.costs,
                "net": flow.net,
                "cumulative": cumulative,
                "energy_mwh": series.annual_energy_mwh[flow.year as usize],
            })
        })
        .collect();

    Ok(json!({
        "results": rows,
        "currency": series.currency,
    }))
}

pub fn run_presets() -> Result<Value, Box<dyn std::error::Error>> {
    let rows: Vec<Value> = AssumptionPreset::builtin_names()
        .into_iter()
        .filter_map(AssumptionPreset::builtin)
        .map(|p| {
            json!({
                "name": p.name,
                "version": p.version,
                "source": p.source,
                "notes": p.notes,
            })
        })
        .collect();
    Ok(json!({ "results": rows }))
}
