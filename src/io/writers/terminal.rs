use crate::core::types::{AnalysisResult, Severity};
use crate::io::output::OutputWriter;
use colored::*;

pub struct TerminalWriter;

impl Default for TerminalWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalWriter {
    pub fn new() -> Self {
        Self
    }
}

impl OutputWriter for TerminalWriter {
    fn write_results(&mut self, results: &AnalysisResult) -> anyhow::Result<()> {
        print_header(results);
        print_graph_summary(results);
        print_anomalies(results);
        print_cost_drivers(results);
        Ok(())
    }
}

fn print_header(results: &AnalysisResult) {
    let divider = "═══════════════════════════════════════════".cyan();
    println!("{divider}");
    println!("{}", "        WORKBOOK ANALYSIS REPORT".bold().cyan());
    if !results.job_id.is_empty() {
        println!("        job: {}", results.job_id);
    }
    println!("{divider}");
    println!();
}

fn print_graph_summary(results: &AnalysisResult) {
    let g = &results.graph.metrics;
    let m = &results.metrics;
    println!("{}", "Dependency Graph".bold());
    println!("───────────────────────────────────────────");
    println!("Sheets:          {}", m.sheet_count);
    println!("Cells:           {}", g.node_count);
    println!("Edges:           {}", g.edge_count);
    println!("Formulas:        {}", m.formula_count);
    println!("Inputs:          {}", g.input_count);
    println!("Outputs:         {}", g.output_count);
    println!("Max depth:       {}", g.max_depth);
    println!("Avg complexity:  {:.2}", m.avg_complexity);
    println!();
}

fn print_anomalies(results: &AnalysisResult) {
    let summary = &results.anomalies;
    println!("{}", "Anomalies".bold());
    println!("───────────────────────────────────────────");
    if summary.total_count == 0 {
        println!("{}", "No structural anomalies detected".green());
        println!();
        return;
    }
    for (severity, label) in [
        ("high", "high".red().bold()),
        ("medium", "medium".yellow()),
        ("low", "low".normal()),
    ] {
        if let Some(count) = summary.by_severity.get(severity) {
            println!("{label:>8}: {count}");
        }
    }
    println!();
    for anomaly in summary.anomalies.iter().take(20) {
        let tag = match anomaly.severity {
            Severity::High => anomaly.anomaly_type.as_str().red(),
            Severity::Medium => anomaly.anomaly_type.as_str().yellow(),
            Severity::Low => anomaly.anomaly_type.as_str().normal(),
        };
        println!(
            "  [{tag}] {} - {}",
            anomaly.cell_address, anomaly.description
        );
    }
    if summary.total_count > 20 {
        println!("  ... and {} more", summary.total_count - 20);
    }
    println!();
}

fn print_cost_drivers(results: &AnalysisResult) {
    let summary = &results.cost_drivers;
    println!("{}", "Top Cost Drivers".bold());
    println!("───────────────────────────────────────────");
    if summary.top_drivers.is_empty() {
        println!("None identified");
        println!();
        return;
    }
    // Join back to the node list so input parameters stand out.
    for (rank, driver) in summary.top_drivers.iter().take(10).enumerate() {
        let is_input = results
            .graph
            .nodes
            .iter()
            .find(|n| n.id == driver.cell_address)
            .map_or(false, |n| n.is_input);
        let marker = if is_input { " (input)".green() } else { "".normal() };
        println!(
            "{:>3}. {:<16} impact {:.4}  {}{}",
            rank + 1,
            driver.cell_address.to_a1(),
            driver.impact_score,
            driver.description,
            marker,
        );
    }
    println!();
}
