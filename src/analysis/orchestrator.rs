//! End-to-end analysis pipeline.
//!
//! `analyze` is a pure function from a workbook reader to the result
//! document: drain the reader, tokenize and extract in parallel, resolve
//! dynamics, build the graph serially, then run the anomaly and cost-driver
//! passes concurrently over the frozen graph. Equal inputs produce
//! byte-identical documents.

use crate::analysis::anomalies::AnomalyDetector;
use crate::analysis::cost_drivers::{CostDriverAnalyzer, DriverAnalysis};
use crate::analysis::{Annotations, FormulaAnnotation};
use crate::config::AnalysisOptions;
use crate::core::addr::{CellAddress, MAX_COL, MAX_ROW};
use crate::core::cancel::CancelToken;
use crate::core::errors::{AnalysisError, Result};
use crate::core::types::{
    AnalysisResult, AnomalySummary, Cell, CostDriverSummary, GraphData, GraphMetrics, NodeData,
    Value, WorkbookMetrics,
};
use crate::graph::builder::{GraphBuilder, NamedRangeTable};
use crate::graph::cycles::analyze_cycles;
use crate::parse::{extract, resolve_dynamics, ParsedFormula, RefTarget, Reference, DYNAMIC_FUNCTIONS};
use crate::reader::WorkbookReader;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;

/// Run the full analysis with a fresh cancellation token.
pub fn analyze<R: WorkbookReader + Sync>(
    reader: &R,
    options: &AnalysisOptions,
) -> Result<AnalysisResult> {
    analyze_with_cancel(reader, options, &CancelToken::new())
}

/// Run the full analysis, polling `cancel` at phase boundaries and inside
/// long algorithms. Cancellation yields `AnalysisError::Cancelled` with no
/// partial result.
pub fn analyze_with_cancel<R: WorkbookReader + Sync>(
    reader: &R,
    options: &AnalysisOptions,
    cancel: &CancelToken,
) -> Result<AnalysisResult> {
    options
        .validate()
        .map_err(AnalysisError::Configuration)?;
    let started = Instant::now();

    // Phase 1: drain the reader into the cell table.
    let (cells, literals) = drain_reader(reader)?;
    let sheet_names = reader.sheet_names()?;
    log::info!(
        "read {} cells across {} sheets",
        cells.len(),
        sheet_names.len()
    );
    cancel.check()?;

    // Tokenize + extract, embarrassingly parallel across formula cells.
    let formula_cells: Vec<(CellAddress, String)> = cells
        .iter()
        .filter_map(|(addr, cell)| {
            cell.formula
                .as_ref()
                .map(|f| (addr.clone(), f.clone()))
        })
        .collect();
    let parsed: Vec<(CellAddress, ParsedFormula)> = formula_cells
        .par_iter()
        .map(|(addr, formula)| (addr.clone(), extract(formula, &addr.sheet)))
        .collect();
    cancel.check()?;
    log::debug!("parsed {} formulas", parsed.len());

    // Named-range table; immutable for the rest of the run.
    let named_table = NamedRangeTable::from_pairs(reader.named_ranges()?);
    if !named_table.is_empty() {
        log::debug!("named-range table holds {} entries", named_table.len());
    }

    // Dynamic resolution, parallel over cells against the frozen literal map.
    let resolved: Vec<(CellAddress, Vec<Reference>, bool)> = parsed
        .par_iter()
        .map(|(addr, formula)| {
            let outcome =
                resolve_dynamics(formula, &addr.sheet, &literals, options.fold_string_concat);
            let mut references = outcome.references;
            sort_references(&mut references);
            (addr.clone(), references, outcome.unresolved_dynamic)
        })
        .collect();
    cancel.check()?;

    let annotations = build_annotations(&parsed, &resolved);

    // Serialized edge construction: one writer consumes the sorted stream.
    let mut builder = GraphBuilder::new(options, &named_table, cells);
    for (source, references, _) in &resolved {
        builder.add_references(source, references);
    }
    let (graph, named_failures, unknown_names) = builder.finish()?;
    cancel.check()?;
    log::info!(
        "graph built: {} nodes, {} edges",
        graph.node_count(),
        graph.edge_count()
    );

    let cycles = analyze_cycles(&graph, cancel)?;
    if !cycles.cycles.is_empty() {
        log::warn!("circular references detected: {}", cycles.cycles.len());
    }

    // Anomaly and cost-driver passes are read-only over the frozen graph.
    let (anomaly_result, driver_result) = rayon::join(
        || -> Result<Option<Vec<crate::core::types::Anomaly>>> {
            if !options.detect_anomalies {
                return Ok(None);
            }
            let detector = AnomalyDetector::new(
                &graph,
                &cycles,
                &annotations,
                &named_failures,
                &unknown_names,
                &options.thresholds,
            );
            detector.detect_all(cancel).map(Some)
        },
        || -> Result<Option<DriverAnalysis>> {
            if !options.identify_cost_drivers {
                return Ok(None);
            }
            CostDriverAnalyzer::new(&graph, options)
                .analyze(cancel)
                .map(Some)
        },
    );
    let anomalies = anomaly_result?;
    let drivers = driver_result?;
    cancel.check()?;

    let result = assemble(
        options,
        &sheet_names,
        &graph,
        cycles.max_depth,
        &annotations,
        anomalies,
        drivers,
    );
    log::info!(
        "analysis complete in {:.1?}: {} anomalies, {} drivers",
        started.elapsed(),
        result.anomalies.total_count,
        result.cost_drivers.total_drivers
    );
    Ok(result)
}

type CellTable = BTreeMap<CellAddress, Cell>;
type LiteralTable = BTreeMap<CellAddress, Value>;

fn drain_reader<R: WorkbookReader>(reader: &R) -> Result<(CellTable, LiteralTable)> {
    let mut cells = BTreeMap::new();
    for record in reader.records()? {
        let record = record?;
        if record.row == 0 || record.col == 0 {
            return Err(AnalysisError::reader(format!(
                "cell coordinates are 1-based, got row {} col {} on sheet {:?}",
                record.row, record.col, record.sheet
            )));
        }
        if record.row > MAX_ROW || record.col > MAX_COL {
            return Err(AnalysisError::reader(format!(
                "cell {}:{} on sheet {:?} exceeds the grid bounds",
                record.row, record.col, record.sheet
            )));
        }
        if record.raw_value.is_none() && record.formula.is_none() {
            continue;
        }
        let address = CellAddress::new(record.sheet, record.row, record.col);
        let cell = Cell::new(address.clone(), record.raw_value, record.formula);
        if cells.insert(address.clone(), cell).is_some() {
            log::warn!("duplicate record for {address}; keeping the last one");
        }
    }
    let literals = cells
        .values()
        .filter(|c| c.flags.is_input())
        .filter_map(|c| c.raw_value.clone().map(|v| (c.address.clone(), v)))
        .collect();
    Ok((cells, literals))
}

/// Deterministic per-cell reference order: `(target, kind)`.
fn sort_references(references: &mut [Reference]) {
    references.sort_by(|a, b| {
        target_key(&a.target)
            .cmp(&target_key(&b.target))
            .then(a.kind.cmp(&b.kind))
    });
}

fn target_key(target: &RefTarget) -> (u8, String) {
    match target {
        RefTarget::Cell(a) => (0, a.to_a1()),
        RefTarget::Range(r) => (1, r.to_a1()),
        RefTarget::Name(n) => (2, n.to_lowercase()),
    }
}

fn build_annotations(
    parsed: &[(CellAddress, ParsedFormula)],
    resolved: &[(CellAddress, Vec<Reference>, bool)],
) -> Annotations {
    let mut annotations = Annotations::new();
    for ((addr, formula), (_, _, unresolved)) in parsed.iter().zip(resolved) {
        let dynamic_functions: Vec<String> = formula
            .functions
            .iter()
            .filter(|f| DYNAMIC_FUNCTIONS.contains(&f.as_str()))
            .cloned()
            .collect();
        annotations.insert(
            addr.clone(),
            FormulaAnnotation {
                complexity: formula.complexity,
                parse_error: formula.parse_error,
                has_error_literal: formula.has_error_literal,
                unresolved_dynamic: *unresolved,
                dynamic_functions,
            },
        );
    }
    annotations
}

fn assemble(
    options: &AnalysisOptions,
    sheet_names: &[String],
    graph: &crate::graph::DependencyGraph,
    max_depth: usize,
    annotations: &Annotations,
    anomalies: Option<Vec<crate::core::types::Anomaly>>,
    drivers: Option<DriverAnalysis>,
) -> AnalysisResult {
    let mut input_count = 0;
    let mut output_count = 0;
    let mut formula_count = 0;
    let nodes: Vec<NodeData> = graph
        .cells()
        .map(|cell| {
            let flags = cell.flags;
            if flags.is_input() {
                input_count += 1;
            }
            if flags.is_output() {
                output_count += 1;
            }
            if flags.has_formula() {
                formula_count += 1;
            }
            NodeData {
                id: cell.address.clone(),
                sheet: cell.address.sheet.clone(),
                row: cell.address.row,
                col: cell.address.col,
                value: if options.include_values {
                    cell.raw_value.clone()
                } else {
                    None
                },
                formula: cell.formula.clone(),
                has_formula: flags.has_formula(),
                is_input: flags.is_input(),
                is_output: flags.is_output(),
                has_error: flags.has_error(),
            }
        })
        .collect();

    let avg_complexity = if annotations.is_empty() {
        0.0
    } else {
        let total: u64 = annotations.values().map(|a| a.complexity as u64).sum();
        round4(total as f64 / annotations.len() as f64)
    };

    AnalysisResult {
        job_id: options.job_id.clone(),
        graph: GraphData {
            metrics: GraphMetrics {
                node_count: nodes.len(),
                edge_count: graph.edge_count(),
                max_depth,
                input_count,
                output_count,
            },
            nodes,
            edges: graph.edges().to_vec(),
        },
        anomalies: anomalies.map(AnomalySummary::from_anomalies).unwrap_or_default(),
        cost_drivers: drivers
            .map(|d| CostDriverSummary {
                total_drivers: d.total_drivers,
                top_drivers: d.top_drivers,
            })
            .unwrap_or_default(),
        metrics: WorkbookMetrics {
            sheet_count: sheet_names.len(),
            formula_count,
            input_count,
            avg_complexity,
        },
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}
