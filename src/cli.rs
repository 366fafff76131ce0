//! Command-line surface.

pub mod commands;
pub mod setup;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub use commands::handle_analyze_command;
pub use setup::{configure_thread_pool, get_worker_count};

#[derive(Parser, Debug)]
#[command(name = "sheetmap")]
#[command(about = "Spreadsheet dependency and anomaly analyzer", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a workbook dump for structure, anomalies, and cost drivers
    Analyze {
        /// Path to the workbook dump (JSON)
        path: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of top cost drivers to report
        #[arg(long, default_value = "50")]
        top_drivers: usize,

        /// Include literal cell values in the emitted graph
        #[arg(long)]
        include_values: bool,

        /// Skip the anomaly detector
        #[arg(long)]
        no_anomalies: bool,

        /// Skip the cost-driver analyzer
        #[arg(long)]
        no_cost_drivers: bool,

        /// Fold constant string concatenation inside INDIRECT arguments
        #[arg(long)]
        fold_string_concat: bool,

        /// Worker threads (0 = all cores)
        #[arg(short, long, default_value = "0")]
        jobs: usize,

        /// Job identity carried into the result document
        #[arg(long)]
        job_id: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Terminal,
}

impl From<OutputFormat> for crate::io::OutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => crate::io::OutputFormat::Json,
            OutputFormat::Terminal => crate::io::OutputFormat::Terminal,
        }
    }
}
