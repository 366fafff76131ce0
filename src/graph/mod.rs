//! Dependency graph construction and structural algorithms.

pub mod builder;
pub mod cycles;
pub mod dependency_graph;

pub use builder::{GraphBuilder, NamedFailure, NamedFailureKind, NamedRangeTable};
pub use cycles::{analyze_cycles, CycleInfo};
pub use dependency_graph::DependencyGraph;
