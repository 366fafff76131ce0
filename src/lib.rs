//! # Sheetmap
//!
//! A spreadsheet dependency analyzer: it ingests a workbook through a
//! pluggable reader, parses every formula, builds the cell dependency graph,
//! and reports structural anomalies and impact-ranked cost drivers as a
//! deterministic document.
//!
//! Unlike a recalculation engine, sheetmap never evaluates a formula. It
//! answers structural questions:
//!
//! 1. **"What does this workbook actually compute from?"** - the dependency
//!    graph, with inputs, outputs, cross-sheet edges, and cycles made explicit
//! 2. **"Where is it broken or fragile?"** - broken references, hard-coded
//!    overwrites, circular references, dead formulas
//! 3. **"Which cells matter most?"** - cost drivers ranked by betweenness
//!    centrality and transitive downstream impact
//!
//! ## Quick start
//!
//! ```rust
//! use sheetmap::analysis::analyze;
//! use sheetmap::config::AnalysisOptions;
//! use sheetmap::reader::MemoryWorkbook;
//!
//! let workbook = MemoryWorkbook::new()
//!     .number("Model", 1, 1, 120.0)
//!     .number("Model", 2, 1, 80.0)
//!     .formula("Model", 3, 1, "=A1+A2");
//!
//! let result = analyze(&workbook, &AnalysisOptions::default()).unwrap();
//! assert_eq!(result.graph.metrics.node_count, 3);
//! assert_eq!(result.graph.metrics.edge_count, 2);
//! ```
//!
//! The engine is a pure function from reader to result: no global state, and
//! equal inputs serialize to byte-identical documents.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod core;
pub mod graph;
pub mod io;
pub mod observability;
pub mod parse;
pub mod reader;

pub use crate::analysis::{analyze, analyze_with_cancel};
pub use crate::config::{AnalysisOptions, AnomalyThresholds};
pub use crate::core::{
    AnalysisError, AnalysisResult, Anomaly, AnomalyType, CancelToken, CellAddress, CellRange,
    CostDriver, DependencyEdge, EdgeKind, Result, Severity, Value,
};
pub use crate::reader::{CellRecord, JsonWorkbookReader, MemoryWorkbook, WorkbookReader};
