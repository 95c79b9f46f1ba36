pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "pricedesk",
    about = "Pricedesk operator CLI",
    long_about = "Operate Pricedesk migrations, demo data, config inspection, readiness checks, and scoring statistics.",
    after_help = "Examples:\n  pricedesk doctor --json\n  pricedesk config\n  pricedesk stats --output data/normalization_stats.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo catalog, customers, and draft quotation (idempotent)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, DB connectivity, scoring statistics, and mail settings")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Recompute customer normalization statistics from stored invoices")]
    Stats {
        #[arg(long, help = "Write to this path instead of pricing.normalization_stats_path")]
        output: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Stats { output } => commands::stats::run(output),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
