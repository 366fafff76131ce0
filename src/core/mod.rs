//! Core data model: addresses, cells, edges, anomalies, errors.

pub mod addr;
pub mod cancel;
pub mod errors;
pub mod types;

pub use addr::{column_index, column_label, AddressParseError, CellAddress, CellRange};
pub use cancel::{CancelToken, CANCEL_POLL_INTERVAL};
pub use errors::{AnalysisError, Result};
pub use types::{
    AnalysisResult, Anomaly, AnomalySummary, AnomalyType, Cell, CellFlags, CostDriver,
    CostDriverSummary, DependencyEdge, EdgeKind, GraphData, GraphMetrics, NodeData, RangeSummary,
    Severity, Value, WorkbookMetrics,
};
