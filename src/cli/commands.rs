//! Command implementations.

use crate::analysis::analyze;
use crate::cli::{setup, OutputFormat};
use crate::config::AnalysisOptions;
use crate::io::create_writer;
use crate::reader::JsonWorkbookReader;
use anyhow::Context;
use std::path::{Path, PathBuf};

#[allow(clippy::too_many_arguments)]
pub fn handle_analyze_command(
    path: &Path,
    format: OutputFormat,
    output: Option<&Path>,
    top_drivers: usize,
    include_values: bool,
    no_anomalies: bool,
    no_cost_drivers: bool,
    fold_string_concat: bool,
    jobs: usize,
    job_id: Option<String>,
) -> anyhow::Result<()> {
    setup::configure_thread_pool(jobs);
    log::info!(
        "analyzing {} with {} workers",
        path.display(),
        setup::get_worker_count(jobs)
    );

    let options = AnalysisOptions {
        job_id: job_id.unwrap_or_else(|| default_job_id(path)),
        include_values,
        detect_anomalies: !no_anomalies,
        identify_cost_drivers: !no_cost_drivers,
        top_drivers_count: top_drivers,
        fold_string_concat,
        ..Default::default()
    };

    let reader = JsonWorkbookReader::from_path(path)
        .with_context(|| format!("reading workbook dump {}", path.display()))?;
    let result = analyze(&reader, &options).context("analysis failed")?;

    match output {
        Some(file) => {
            let json = serde_json::to_string_pretty(&result)?;
            std::fs::write(file, json + "\n")
                .with_context(|| format!("writing {}", file.display()))?;
            log::info!("wrote results to {}", file.display());
        }
        None => {
            create_writer(format.into()).write_results(&result)?;
        }
    }
    Ok(())
}

fn default_job_id(path: &Path) -> String {
    PathBuf::from(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
