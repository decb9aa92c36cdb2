mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::analyze::{AnalyzeArgs, CashFlowsArgs};
use commands::sensitivity::SensitivityArgs;

/// BESS project cost-benefit analysis
#[derive(Parser)]
#[command(
    name = "bessa",
    version,
    about = "Cost-benefit analysis for utility-scale battery storage projects",
    long_about = "Builds a year-by-year cash flow model for a battery energy storage \
                  project (degradation, learning-curve augmentation, investment tax \
                  credit) and reports NPV, IRR, benefit-cost ratio, LCOS, payback, \
                  and breakeven CapEx, with decimal precision throughout."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full financial analysis for a project
    Analyze(AnalyzeArgs),
    /// Print the year-by-year cash flow model without metrics
    CashFlows(CashFlowsArgs),
    /// Sweep project inputs and report metrics per grid cell
    Sensitivity(SensitivityArgs),
    /// List the built-in assumption presets
    Presets,
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Analyze(args) => commands::analyze::run_analyze(args),
        Commands::CashFlows(args) => commands::analyze::run_cash_flows(args),
        Commands::Sensitivity(args) => commands::sensitivity::run_sensitivity(args),
        Commands::Presets => commands::analyze::run_presets(),
        Commands::Version => {
            println!("bessa {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
