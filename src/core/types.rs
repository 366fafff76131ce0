//! Common type definitions used across the analysis engine.

use crate::core::addr::{CellAddress, CellRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Error literals a workbook can surface in place of a computed value.
pub const ERROR_LITERALS: &[&str] = &[
    "#REF!", "#NAME?", "#DIV/0!", "#VALUE!", "#N/A", "#NULL!", "#NUM!",
];

/// A literal cell value as reported by the reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Value {
    /// Text form used for error-literal matching and display.
    pub fn as_text(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => String::from(if *b { "TRUE" } else { "FALSE" }),
        }
    }

    pub fn is_error_literal(&self) -> bool {
        matches!(self, Value::Text(s) if ERROR_LITERALS.contains(&s.trim()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// Per-cell attribute bitset; the single source of truth for cell roles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellFlags(u8);

impl CellFlags {
    pub const HAS_FORMULA: u8 = 1;
    pub const IS_INPUT: u8 = 1 << 1;
    pub const IS_OUTPUT: u8 = 1 << 2;
    pub const HAS_ERROR: u8 = 1 << 3;

    pub fn set(&mut self, flag: u8, on: bool) {
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    pub fn has_formula(&self) -> bool {
        self.0 & Self::HAS_FORMULA != 0
    }

    pub fn is_input(&self) -> bool {
        self.0 & Self::IS_INPUT != 0
    }

    pub fn is_output(&self) -> bool {
        self.0 & Self::IS_OUTPUT != 0
    }

    pub fn has_error(&self) -> bool {
        self.0 & Self::HAS_ERROR != 0
    }
}

/// One addressable unit of the workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub address: CellAddress,
    pub raw_value: Option<Value>,
    pub formula: Option<String>,
    pub flags: CellFlags,
}

impl Cell {
    /// Build a populated cell, deriving `has_formula`, `is_input`, `has_error`.
    ///
    /// `is_output` is assigned only after graph construction.
    pub fn new(address: CellAddress, raw_value: Option<Value>, formula: Option<String>) -> Self {
        let formula = formula.filter(|f| !f.trim().is_empty());
        let mut flags = CellFlags::default();
        flags.set(CellFlags::HAS_FORMULA, formula.is_some());
        flags.set(
            CellFlags::IS_INPUT,
            formula.is_none() && raw_value.is_some(),
        );
        flags.set(
            CellFlags::HAS_ERROR,
            raw_value.as_ref().is_some_and(Value::is_error_literal),
        );
        Self {
            address,
            raw_value,
            formula,
            flags,
        }
    }

    /// A node referenced by some formula but never populated by the reader.
    pub fn implicit(address: CellAddress) -> Self {
        Self {
            address,
            raw_value: None,
            formula: None,
            flags: CellFlags::default(),
        }
    }
}

/// How a dependency edge was established.
///
/// When multi-edges between the same pair coalesce, the strongest kind wins
/// in the order `direct > dynamic > range_member > named`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Direct,
    Dynamic,
    RangeMember,
    Named,
}

impl EdgeKind {
    /// Coalescing strength; higher wins.
    pub fn strength(self) -> u8 {
        match self {
            EdgeKind::Direct => 3,
            EdgeKind::Dynamic => 2,
            EdgeKind::RangeMember => 1,
            EdgeKind::Named => 0,
        }
    }
}

/// Directed dependency: `source` is the formula's home cell, `target` a cell
/// it reads.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: CellAddress,
    pub target: CellAddress,
    pub kind: EdgeKind,
}

/// A range too large to expand edge-per-member; kept for the anomaly pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSummary {
    pub source: CellAddress,
    pub range: CellRange,
    pub cell_count: u64,
}

/// Severity levels for anomalies, ordered so that `High` sorts largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Structural defects the detector can classify.
///
/// Declared alphabetically; the derived order is the deterministic tie-break
/// order for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    BrokenReference,
    CircularReference,
    DynamicUnresolved,
    HardCodedOverwrite,
    HighComplexity,
    MissingDependency,
    UnusedFormula,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::BrokenReference => "broken_reference",
            AnomalyType::CircularReference => "circular_reference",
            AnomalyType::DynamicUnresolved => "dynamic_unresolved",
            AnomalyType::HardCodedOverwrite => "hard_coded_overwrite",
            AnomalyType::HighComplexity => "high_complexity",
            AnomalyType::MissingDependency => "missing_dependency",
            AnomalyType::UnusedFormula => "unused_formula",
        }
    }
}

/// One detected structural defect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub cell_address: CellAddress,
    pub sheet: String,
    pub severity: Severity,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// A cell with disproportionate downstream influence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostDriver {
    pub cell_address: CellAddress,
    pub centrality_score: f64,
    pub impact_score: f64,
    pub dependent_count: usize,
    pub description: String,
}

/// One node of the emitted graph document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub id: CellAddress,
    pub sheet: String,
    pub row: u32,
    pub col: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    pub has_formula: bool,
    pub is_input: bool,
    pub is_output: bool,
    pub has_error: bool,
}

/// Aggregate figures over the emitted graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub max_depth: usize,
    pub input_count: usize,
    pub output_count: usize,
}

/// The dependency graph portion of the result document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<NodeData>,
    pub edges: Vec<DependencyEdge>,
    pub metrics: GraphMetrics,
}

/// Anomaly catalogue with per-type and per-severity tallies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub total_count: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub anomalies: Vec<Anomaly>,
}

impl AnomalySummary {
    pub fn from_anomalies(anomalies: Vec<Anomaly>) -> Self {
        let mut by_type = BTreeMap::new();
        let mut by_severity = BTreeMap::new();
        for a in &anomalies {
            *by_type.entry(a.anomaly_type.as_str().to_string()).or_insert(0) += 1;
            let sev = match a.severity {
                Severity::High => "high",
                Severity::Medium => "medium",
                Severity::Low => "low",
            };
            *by_severity.entry(sev.to_string()).or_insert(0) += 1;
        }
        Self {
            total_count: anomalies.len(),
            by_type,
            by_severity,
            anomalies,
        }
    }
}

/// Ranked cost-driver portion of the result document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostDriverSummary {
    pub total_drivers: usize,
    pub top_drivers: Vec<CostDriver>,
}

/// Workbook-level figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkbookMetrics {
    pub sheet_count: usize,
    pub formula_count: usize,
    pub input_count: usize,
    pub avg_complexity: f64,
}

/// The complete analysis document.
///
/// Serialization is deterministic: equal inputs produce byte-identical JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub job_id: String,
    pub graph: GraphData,
    pub anomalies: AnomalySummary,
    pub cost_drivers: CostDriverSummary,
    pub metrics: WorkbookMetrics,
}
