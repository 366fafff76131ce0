//! Named-range resolution through the full pipeline.

use sheetmap::analysis::analyze;
use sheetmap::config::AnalysisOptions;
use sheetmap::core::{AnomalyType, CellAddress, EdgeKind};
use sheetmap::reader::MemoryWorkbook;

fn addr(s: &str) -> CellAddress {
    CellAddress::parse_a1(s).unwrap()
}

#[test]
fn named_range_expands_to_named_edges() {
    let workbook = MemoryWorkbook::new()
        .number("Data", 1, 2, 0.05)
        .number("Data", 2, 2, 0.07)
        .formula("Model", 1, 1, "=SUM(Rates)")
        .named_range("Rates", "Data!B1:B2");
    let result = analyze(&workbook, &AnalysisOptions::default()).unwrap();

    let named: Vec<(String, String)> = result
        .graph
        .edges
        .iter()
        .filter(|e| e.kind == EdgeKind::Named)
        .map(|e| (e.source.to_a1(), e.target.to_a1()))
        .collect();
    assert_eq!(
        named,
        [
            ("Model!A1".to_string(), "Data!B1".to_string()),
            ("Model!A1".to_string(), "Data!B2".to_string()),
        ]
    );
    assert_eq!(result.anomalies.total_count, 0);
}

#[test]
fn named_lookup_is_case_insensitive() {
    let workbook = MemoryWorkbook::new()
        .number("Data", 1, 1, 1.0)
        .formula("Model", 1, 1, "=TAXRATE*2")
        .named_range("TaxRate", "Data!A1");
    let result = analyze(&workbook, &AnalysisOptions::default()).unwrap();

    assert_eq!(result.graph.metrics.edge_count, 1);
    assert_eq!(result.graph.edges[0].kind, EdgeKind::Named);
    assert_eq!(result.graph.edges[0].target, addr("Data!A1"));
}

#[test]
fn nested_named_formula_resolves() {
    let workbook = MemoryWorkbook::new()
        .number("Data", 1, 1, 10.0)
        .formula("Model", 1, 1, "=Total+1")
        .named_range("Total", "=Base*2")
        .named_range("Base", "Data!A1");
    let result = analyze(&workbook, &AnalysisOptions::default()).unwrap();

    assert_eq!(result.graph.metrics.edge_count, 1);
    assert_eq!(result.graph.edges[0].target, addr("Data!A1"));
    assert_eq!(result.graph.edges[0].kind, EdgeKind::Named);
}

#[test]
fn circular_named_definitions_are_reported() {
    let workbook = MemoryWorkbook::new()
        .formula("Model", 1, 1, "=Loop")
        .named_range("Loop", "=Other+1")
        .named_range("Other", "=Loop+1");
    let result = analyze(&workbook, &AnalysisOptions::default()).unwrap();

    let missing: Vec<_> = result
        .anomalies
        .anomalies
        .iter()
        .filter(|a| a.anomaly_type == AnomalyType::MissingDependency)
        .collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].cell_address, addr("Model!A1"));
    assert_eq!(missing[0].metadata["named_range"], "Loop");
}

#[test]
fn undefined_name_is_a_broken_reference() {
    let workbook = MemoryWorkbook::new().formula("Model", 1, 1, "=Ghost*2");
    let result = analyze(&workbook, &AnalysisOptions::default()).unwrap();

    let broken: Vec<_> = result
        .anomalies
        .anomalies
        .iter()
        .filter(|a| a.anomaly_type == AnomalyType::BrokenReference)
        .collect();
    assert_eq!(broken.len(), 1);
    assert_eq!(broken[0].metadata["name"], "Ghost");
}
