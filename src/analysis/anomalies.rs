//! Structural anomaly detection.
//!
//! Scans the built graph plus per-cell attributes; never evaluates formulas.
//! The produced list is deterministic: sorted by severity descending, then
//! type, then cell address.

use crate::config::AnomalyThresholds;
use crate::core::addr::CellAddress;
use crate::core::cancel::{CancelToken, CANCEL_POLL_INTERVAL};
use crate::core::errors::Result;
use crate::core::types::{Anomaly, AnomalyType, Severity};
use crate::graph::builder::{NamedFailure, NamedFailureKind};
use crate::graph::cycles::CycleInfo;
use crate::graph::dependency_graph::DependencyGraph;
use crate::analysis::Annotations;
use serde_json::json;
use std::cmp::Reverse;
use std::collections::BTreeMap;

const FORMULA_SNIPPET_LEN: usize = 100;

/// Detects structural defects in a built graph.
pub struct AnomalyDetector<'a> {
    graph: &'a DependencyGraph,
    cycles: &'a CycleInfo,
    annotations: &'a Annotations,
    named_failures: &'a [NamedFailure],
    unknown_names: &'a [(CellAddress, String)],
    thresholds: &'a AnomalyThresholds,
}

impl<'a> AnomalyDetector<'a> {
    pub fn new(
        graph: &'a DependencyGraph,
        cycles: &'a CycleInfo,
        annotations: &'a Annotations,
        named_failures: &'a [NamedFailure],
        unknown_names: &'a [(CellAddress, String)],
        thresholds: &'a AnomalyThresholds,
    ) -> Self {
        Self {
            graph,
            cycles,
            annotations,
            named_failures,
            unknown_names,
            thresholds,
        }
    }

    /// Run every detection method and return the sorted catalogue.
    pub fn detect_all(&self, cancel: &CancelToken) -> Result<Vec<Anomaly>> {
        let mut anomalies = Vec::new();

        self.detect_circular_references(&mut anomalies);
        cancel.check()?;
        self.detect_broken_references(&mut anomalies);
        self.detect_missing_dependencies(&mut anomalies);
        cancel.check()?;
        self.detect_hard_coded_overwrites(&mut anomalies, cancel)?;
        self.detect_unused_formulas(&mut anomalies);
        self.detect_high_complexity(&mut anomalies);
        self.detect_dynamic_unresolved(&mut anomalies);

        anomalies.sort_by(|a, b| {
            (Reverse(a.severity), a.anomaly_type, &a.cell_address).cmp(&(
                Reverse(b.severity),
                b.anomaly_type,
                &b.cell_address,
            ))
        });
        log::debug!("anomaly detection found {} anomalies", anomalies.len());
        Ok(anomalies)
    }

    fn detect_circular_references(&self, out: &mut Vec<Anomaly>) {
        for cycle in &self.cycles.cycles {
            let anchor = &cycle[0];
            let path: Vec<String> = cycle.iter().map(CellAddress::to_a1).collect();
            let display = if cycle.len() == 1 {
                format!("{} -> {}", path[0], path[0])
            } else {
                format!("{} -> {}", path.join(" -> "), path[0])
            };
            let mut metadata = BTreeMap::new();
            metadata.insert("cycle".to_string(), json!(path));
            out.push(Anomaly {
                anomaly_type: AnomalyType::CircularReference,
                cell_address: anchor.clone(),
                sheet: anchor.sheet.clone(),
                severity: Severity::High,
                description: format!("Part of circular reference: {display}"),
                suggestion: Some(
                    "Break the circular dependency by restructuring the formulas involved"
                        .to_string(),
                ),
                metadata,
            });
        }
    }

    fn detect_broken_references(&self, out: &mut Vec<Anomaly>) {
        for (addr, annotation) in self.annotations {
            let formula = self
                .graph
                .get(addr)
                .and_then(|c| c.formula.as_deref())
                .unwrap_or_default();
            if annotation.parse_error {
                let mut metadata = BTreeMap::new();
                metadata.insert("formula".to_string(), json!(snippet(formula)));
                out.push(self.broken(addr, "Formula could not be fully tokenized", metadata));
            } else if annotation.has_error_literal {
                let mut metadata = BTreeMap::new();
                metadata.insert("formula".to_string(), json!(snippet(formula)));
                out.push(self.broken(
                    addr,
                    "Formula references an error literal (#REF! or #NAME?)",
                    metadata,
                ));
            }
        }

        // A never-populated target combined with an error value on the source
        // points at a reference that already failed in the workbook.
        for edge in self.graph.edges() {
            if self.graph.is_implicit(&edge.target) {
                let source_has_error = self
                    .graph
                    .get(&edge.source)
                    .map_or(false, |c| c.flags.has_error());
                if source_has_error {
                    let mut metadata = BTreeMap::new();
                    metadata.insert("missing_cell".to_string(), json!(edge.target.to_a1()));
                    out.push(self.broken(
                        &edge.source,
                        &format!("References {} which was never populated", edge.target),
                        metadata,
                    ));
                }
            }
        }

        for (addr, name) in self.unknown_names {
            let mut metadata = BTreeMap::new();
            metadata.insert("name".to_string(), json!(name));
            out.push(self.broken(
                addr,
                &format!("References undefined name: {name}"),
                metadata,
            ));
        }
    }

    fn broken(
        &self,
        addr: &CellAddress,
        description: &str,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Anomaly {
        Anomaly {
            anomaly_type: AnomalyType::BrokenReference,
            cell_address: addr.clone(),
            sheet: addr.sheet.clone(),
            severity: Severity::High,
            description: description.to_string(),
            suggestion: Some(
                "Check formula references and ensure all referenced cells exist".to_string(),
            ),
            metadata,
        }
    }

    fn detect_missing_dependencies(&self, out: &mut Vec<Anomaly>) {
        for edge in self.graph.edges() {
            if self.graph.is_implicit(&edge.target) {
                let source_has_error = self
                    .graph
                    .get(&edge.source)
                    .map_or(false, |c| c.flags.has_error());
                if !source_has_error {
                    // An oversized range is summarized behind its anchor
                    // cell; report the whole range, not just the anchor.
                    let summary = self
                        .graph
                        .range_summaries()
                        .iter()
                        .find(|s| s.source == edge.source && *s.range.top_left() == edge.target);
                    let mut metadata = BTreeMap::new();
                    metadata.insert("missing_cell".to_string(), json!(edge.target.to_a1()));
                    let description = match summary {
                        Some(s) => {
                            metadata.insert("range".to_string(), json!(s.range.to_a1()));
                            metadata.insert("cell_count".to_string(), json!(s.cell_count));
                            format!("References unpopulated range: {}", s.range)
                        }
                        None => format!("References non-existent cell: {}", edge.target),
                    };
                    out.push(Anomaly {
                        anomaly_type: AnomalyType::MissingDependency,
                        cell_address: edge.source.clone(),
                        sheet: edge.source.sheet.clone(),
                        severity: Severity::High,
                        description,
                        suggestion: Some(
                            "Check if the referenced cell was deleted or moved".to_string(),
                        ),
                        metadata,
                    });
                }
            }
        }

        for failure in self.named_failures {
            let description = match failure.kind {
                NamedFailureKind::Cycle => {
                    format!("Named range '{}' has a circular definition", failure.name)
                }
                NamedFailureKind::DepthExceeded => format!(
                    "Named range '{}' nests deeper than the resolution limit",
                    failure.name
                ),
            };
            let mut metadata = BTreeMap::new();
            metadata.insert("named_range".to_string(), json!(failure.name));
            out.push(Anomaly {
                anomaly_type: AnomalyType::MissingDependency,
                cell_address: failure.source.clone(),
                sheet: failure.source.sheet.clone(),
                severity: Severity::High,
                description,
                suggestion: Some("Simplify the named range definition".to_string()),
                metadata,
            });
        }
    }

    fn detect_hard_coded_overwrites(
        &self,
        out: &mut Vec<Anomaly>,
        cancel: &CancelToken,
    ) -> Result<()> {
        // (sheet, row, col) -> has_formula, over populated cells only.
        let mut by_position: BTreeMap<(&str, u32, u32), bool> = BTreeMap::new();
        for cell in self.graph.cells() {
            if self.graph.is_implicit(&cell.address) {
                continue;
            }
            by_position.insert(
                (cell.address.sheet.as_str(), cell.address.row, cell.address.col),
                cell.flags.has_formula(),
            );
        }

        let window = self.thresholds.hard_coded_overwrite_window;
        let ratio = self.thresholds.hard_coded_overwrite_ratio;

        for (i, cell) in self.graph.cells().enumerate() {
            if i % CANCEL_POLL_INTERVAL == 0 {
                cancel.check()?;
            }
            if !cell.flags.is_input() {
                continue;
            }
            let addr = &cell.address;
            let row_stats = neighborhood(
                &by_position,
                addr,
                window,
                Axis::Row,
            );
            let col_stats = neighborhood(
                &by_position,
                addr,
                window,
                Axis::Col,
            );
            let (Some(row_ratio), Some(col_ratio)) = (row_stats, col_stats) else {
                continue;
            };
            if row_ratio >= ratio && col_ratio >= ratio {
                let mut metadata = BTreeMap::new();
                metadata.insert("row_formula_ratio".to_string(), json!(round4(row_ratio)));
                metadata.insert("col_formula_ratio".to_string(), json!(round4(col_ratio)));
                if let Some(value) = &cell.raw_value {
                    metadata.insert("value".to_string(), json!(value.as_text()));
                }
                out.push(Anomaly {
                    anomaly_type: AnomalyType::HardCodedOverwrite,
                    cell_address: addr.clone(),
                    sheet: addr.sheet.clone(),
                    severity: Severity::Medium,
                    description: "Hard-coded value amid formula neighbors".to_string(),
                    suggestion: Some(
                        "Verify whether this cell should contain a formula like its neighbors"
                            .to_string(),
                    ),
                    metadata,
                });
            }
        }
        Ok(())
    }

    fn detect_unused_formulas(&self, out: &mut Vec<Anomaly>) {
        for cell in self.graph.cells() {
            if !cell.flags.has_formula() {
                continue;
            }
            let addr = &cell.address;
            // A formula whose references never resolved is reported as
            // dynamic_unresolved, not as dead logic.
            if self
                .annotations
                .get(addr)
                .map_or(false, |a| a.unresolved_dynamic)
            {
                continue;
            }
            if self.graph.out_degree(addr) == 0 && self.graph.in_degree(addr) == 0 {
                let mut metadata = BTreeMap::new();
                if let Some(formula) = &cell.formula {
                    metadata.insert("formula".to_string(), json!(snippet(formula)));
                }
                out.push(Anomaly {
                    anomaly_type: AnomalyType::UnusedFormula,
                    cell_address: addr.clone(),
                    sheet: addr.sheet.clone(),
                    severity: Severity::Low,
                    description: "Formula is not used by any other cell".to_string(),
                    suggestion: Some(
                        "Consider removing this formula if it is not needed for output".to_string(),
                    ),
                    metadata,
                });
            }
        }
    }

    fn detect_high_complexity(&self, out: &mut Vec<Anomaly>) {
        for (addr, annotation) in self.annotations {
            if annotation.complexity > self.thresholds.high_complexity_operators {
                let mut metadata = BTreeMap::new();
                metadata.insert("operator_count".to_string(), json!(annotation.complexity));
                out.push(Anomaly {
                    anomaly_type: AnomalyType::HighComplexity,
                    cell_address: addr.clone(),
                    sheet: addr.sheet.clone(),
                    severity: Severity::Medium,
                    description: format!(
                        "Formula uses {} structural operators",
                        annotation.complexity
                    ),
                    suggestion: Some(
                        "Consider splitting the formula across intermediate cells".to_string(),
                    ),
                    metadata,
                });
            }
        }
    }

    fn detect_dynamic_unresolved(&self, out: &mut Vec<Anomaly>) {
        for (addr, annotation) in self.annotations {
            if annotation.unresolved_dynamic {
                let mut metadata = BTreeMap::new();
                metadata.insert("functions".to_string(), json!(annotation.dynamic_functions));
                out.push(Anomaly {
                    anomaly_type: AnomalyType::DynamicUnresolved,
                    cell_address: addr.clone(),
                    sheet: addr.sheet.clone(),
                    severity: Severity::Low,
                    description: "Dynamic reference could not be statically resolved".to_string(),
                    suggestion: Some(
                        "Arguments to INDIRECT/OFFSET/INDEX are not literal; the dependency \
                         graph may be incomplete here"
                            .to_string(),
                    ),
                    metadata,
                });
            }
        }
    }
}

enum Axis {
    Row,
    Col,
}

/// Formula ratio among populated peers along one axis within the window.
/// `None` when the cell has no peers on that axis.
fn neighborhood(
    by_position: &BTreeMap<(&str, u32, u32), bool>,
    addr: &CellAddress,
    window: u32,
    axis: Axis,
) -> Option<f64> {
    let mut peers = 0usize;
    let mut formulas = 0usize;
    let (fixed, moving) = match axis {
        Axis::Row => (addr.row, addr.col),
        Axis::Col => (addr.col, addr.row),
    };
    let lo = moving.saturating_sub(window).max(1);
    let hi = moving.saturating_add(window);
    for offset in lo..=hi {
        if offset == moving {
            continue;
        }
        let key = match axis {
            Axis::Row => (addr.sheet.as_str(), fixed, offset),
            Axis::Col => (addr.sheet.as_str(), offset, fixed),
        };
        if let Some(has_formula) = by_position.get(&key) {
            peers += 1;
            if *has_formula {
                formulas += 1;
            }
        }
    }
    if peers == 0 {
        None
    } else {
        Some(formulas as f64 / peers as f64)
    }
}

fn snippet(formula: &str) -> String {
    formula.chars().take(FORMULA_SNIPPET_LEN).collect()
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}
