//! Analysis passes over the frozen graph, and the orchestrator driving them.

pub mod anomalies;
pub mod cost_drivers;
pub mod orchestrator;

pub use anomalies::AnomalyDetector;
pub use cost_drivers::CostDriverAnalyzer;
pub use orchestrator::{analyze, analyze_with_cancel};

use crate::core::addr::CellAddress;
use std::collections::BTreeMap;

/// Per-formula facts carried from parsing into the anomaly pass.
#[derive(Debug, Clone, Default)]
pub struct FormulaAnnotation {
    pub complexity: u32,
    pub parse_error: bool,
    pub has_error_literal: bool,
    pub unresolved_dynamic: bool,
    /// Dynamic function names present in the formula.
    pub dynamic_functions: Vec<String>,
}

/// Annotations keyed by formula cell, in address order.
pub type Annotations = BTreeMap<CellAddress, FormulaAnnotation>;
