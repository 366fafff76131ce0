//! Determinism and document invariants.

use sheetmap::analysis::analyze;
use sheetmap::config::AnalysisOptions;
use sheetmap::core::{AnalysisResult, CellAddress};
use sheetmap::reader::MemoryWorkbook;
use std::collections::BTreeSet;

/// A workbook with a bit of everything: chains, ranges, cross-sheet edges,
/// a cycle, an orphan, and a broken reference.
fn mixed_workbook() -> MemoryWorkbook {
    let mut wb = MemoryWorkbook::new();
    for row in 1..=20u32 {
        wb = wb.number("Data", row, 1, row as f64);
        wb = wb.formula("Data", row, 2, "=A1*2");
    }
    wb.formula("Model", 1, 1, "=SUM(Data!A1:A20)")
        .formula("Model", 2, 1, "=A1/20")
        .formula("Model", 3, 1, "=A2+Missing!Z1")
        .formula("Model", 4, 1, "=B4")
        .formula("Model", 4, 2, "=A4")
        .formula("Model", 9, 9, "=42*2")
        .named_range("Inputs", "Data!A1:A20")
}

fn run(workbook: &MemoryWorkbook) -> AnalysisResult {
    let options = AnalysisOptions {
        job_id: "determinism".to_string(),
        include_values: true,
        ..Default::default()
    };
    analyze(workbook, &options).unwrap()
}

#[test]
fn reruns_serialize_byte_identically() {
    let workbook = mixed_workbook();
    let first = serde_json::to_string_pretty(&run(&workbook)).unwrap();
    let second = serde_json::to_string_pretty(&run(&workbook)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn every_edge_endpoint_is_a_node() {
    let result = run(&mixed_workbook());
    let nodes: BTreeSet<&CellAddress> = result.graph.nodes.iter().map(|n| &n.id).collect();
    for edge in &result.graph.edges {
        assert!(nodes.contains(&edge.source), "{} missing", edge.source);
        assert!(nodes.contains(&edge.target), "{} missing", edge.target);
    }
}

#[test]
fn output_flag_matches_dependent_absence() {
    let result = run(&mixed_workbook());
    let targeted: BTreeSet<&CellAddress> =
        result.graph.edges.iter().map(|e| &e.target).collect();
    for node in &result.graph.nodes {
        let expected = node.has_formula && !targeted.contains(&node.id);
        assert_eq!(node.is_output, expected, "is_output wrong for {}", node.id);
    }
}

#[test]
fn input_flag_implies_value_without_formula() {
    let result = run(&mixed_workbook());
    for node in &result.graph.nodes {
        if node.is_input {
            assert!(!node.has_formula);
            assert!(node.value.is_some());
        }
    }
}

#[test]
fn cycle_metadata_cells_are_connected() {
    let result = run(&mixed_workbook());
    let edges: BTreeSet<(String, String)> = result
        .graph
        .edges
        .iter()
        .map(|e| (e.source.to_a1(), e.target.to_a1()))
        .collect();
    for anomaly in &result.anomalies.anomalies {
        if anomaly.anomaly_type != sheetmap::core::AnomalyType::CircularReference {
            continue;
        }
        let cycle: Vec<String> = anomaly.metadata["cycle"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        for (i, cell) in cycle.iter().enumerate() {
            let next = &cycle[(i + 1) % cycle.len()];
            assert!(
                edges.contains(&(cell.clone(), next.clone())),
                "cycle edge {cell} -> {next} not in graph"
            );
        }
    }
}

#[test]
fn driver_scores_are_bounded_and_sorted() {
    let result = run(&mixed_workbook());
    let n = result.graph.metrics.node_count;
    let drivers = &result.cost_drivers.top_drivers;
    assert!(drivers.len() <= 50);
    for d in drivers {
        assert!((0.0..=1.0).contains(&d.centrality_score));
        assert!((0.0..=1.0).contains(&d.impact_score));
        assert!(d.dependent_count <= n - 1);
    }
    for pair in drivers.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            a.impact_score > b.impact_score
                || (a.impact_score == b.impact_score
                    && (a.dependent_count > b.dependent_count
                        || (a.dependent_count == b.dependent_count
                            && a.cell_address < b.cell_address))),
            "driver order violated between {} and {}",
            a.cell_address,
            b.cell_address
        );
    }
}

#[test]
fn top_driver_count_is_clamped_to_eligible() {
    let workbook = MemoryWorkbook::new()
        .number("S", 1, 1, 1.0)
        .formula("S", 2, 1, "=A1");
    let options = AnalysisOptions {
        top_drivers_count: 500,
        ..Default::default()
    };
    let result = analyze(&workbook, &options).unwrap();
    assert_eq!(
        result.cost_drivers.top_drivers.len(),
        result.cost_drivers.total_drivers.min(500)
    );
}

#[test]
fn anomaly_rerun_is_stable() {
    // Running detection twice over the same built graph is the same as
    // running the whole engine twice: the catalogue must not change.
    let workbook = mixed_workbook();
    let first = run(&workbook).anomalies;
    let second = run(&workbook).anomalies;
    assert_eq!(first, second);
}

#[test]
fn cancellation_aborts_without_result() {
    use sheetmap::core::{AnalysisError, CancelToken};
    let token = CancelToken::new();
    token.cancel();
    let err = sheetmap::analysis::analyze_with_cancel(
        &mixed_workbook(),
        &AnalysisOptions::default(),
        &token,
    )
    .unwrap_err();
    assert!(matches!(err, AnalysisError::Cancelled));
}
