//! Sheetmap CLI entry point.

use anyhow::Result;
use clap::Parser;
use sheetmap::cli::{handle_analyze_command, Cli, Commands};
use sheetmap::observability::init_tracing;

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze {
            path,
            format,
            output,
            top_drivers,
            include_values,
            no_anomalies,
            no_cost_drivers,
            fold_string_concat,
            jobs,
            job_id,
        } => handle_analyze_command(
            &path,
            format,
            output.as_deref(),
            top_drivers,
            include_values,
            no_anomalies,
            no_cost_drivers,
            fold_string_concat,
            jobs,
            job_id,
        ),
    }
}
