//! Two-phase graph construction.
//!
//! Phase 1 (node table) happens in the orchestrator while draining the
//! reader; this module is the serialized phase 2: it consumes the resolved
//! reference stream, materializes implicit nodes, expands ranges under the
//! fan-out cap, chases named ranges, and deduplicates edges keeping the
//! strongest kind.

use crate::config::AnalysisOptions;
use crate::core::addr::{CellAddress, CellRange};
use crate::core::errors::{AnalysisError, Result};
use crate::core::types::{Cell, EdgeKind, RangeSummary};
use crate::graph::dependency_graph::DependencyGraph;
use crate::parse::{extract, RefTarget, Reference};
use im::HashSet;
use std::collections::{BTreeMap, HashMap};

/// Workbook-scoped named-range table; lookups are case-insensitive while the
/// original casing is preserved for output.
#[derive(Debug, Clone, Default)]
pub struct NamedRangeTable {
    entries: HashMap<String, NamedEntry>,
}

#[derive(Debug, Clone)]
pub struct NamedEntry {
    pub name: String,
    pub definition: String,
}

impl NamedRangeTable {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut entries = HashMap::new();
        for (name, definition) in pairs {
            entries.insert(name.to_lowercase(), NamedEntry { name, definition });
        }
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&NamedEntry> {
        self.entries.get(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Why a named reference failed to resolve into edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedFailureKind {
    Cycle,
    DepthExceeded,
}

/// A named reference the builder could not reduce; reported as a
/// missing-dependency anomaly on the triggering formula.
#[derive(Debug, Clone)]
pub struct NamedFailure {
    pub source: CellAddress,
    pub name: String,
    pub kind: NamedFailureKind,
}

/// Serialized edge-construction state; a single writer consumes the parallel
/// extraction output through [`GraphBuilder::add_references`].
pub struct GraphBuilder<'a> {
    options: &'a AnalysisOptions,
    named: &'a NamedRangeTable,
    nodes: BTreeMap<CellAddress, Cell>,
    edge_map: HashMap<(CellAddress, CellAddress), EdgeKind>,
    implicit: HashSet<CellAddress>,
    range_summaries: Vec<RangeSummary>,
    named_failures: Vec<NamedFailure>,
    unknown_names: Vec<(CellAddress, String)>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        options: &'a AnalysisOptions,
        named: &'a NamedRangeTable,
        nodes: BTreeMap<CellAddress, Cell>,
    ) -> Self {
        Self {
            options,
            named,
            nodes,
            edge_map: HashMap::new(),
            implicit: HashSet::new(),
            range_summaries: Vec::new(),
            named_failures: Vec::new(),
            unknown_names: Vec::new(),
        }
    }

    /// Feed one formula cell's resolved references.
    pub fn add_references(&mut self, source: &CellAddress, references: &[Reference]) {
        for reference in references {
            match &reference.target {
                RefTarget::Cell(target) => {
                    self.add_cell_edge(source, target, reference.kind);
                }
                RefTarget::Range(range) => {
                    self.add_range_edges(source, range, reference.kind);
                }
                RefTarget::Name(name) => {
                    let mut path = Vec::new();
                    self.resolve_named(source, name, 0, &mut path);
                }
            }
        }
    }

    fn add_cell_edge(&mut self, source: &CellAddress, target: &CellAddress, kind: EdgeKind) {
        self.ensure_node(target);
        self.insert_edge(source, target, kind);
    }

    fn add_range_edges(&mut self, source: &CellAddress, range: &CellRange, kind: EdgeKind) {
        // Members of a plain range become range_member edges; dynamically or
        // namedly reached ranges keep their reaching kind.
        let member_kind = match kind {
            EdgeKind::Direct => EdgeKind::RangeMember,
            other => other,
        };
        if range.len() > self.options.range_fanout_cap {
            log::debug!(
                "range {} has {} cells, above the fan-out cap; summarizing",
                range,
                range.len()
            );
            self.range_summaries.push(RangeSummary {
                source: source.clone(),
                range: range.clone(),
                cell_count: range.len(),
            });
            let anchor = range.top_left().clone();
            self.ensure_node(&anchor);
            self.insert_edge(source, &anchor, member_kind);
            return;
        }
        for member in range.cells() {
            self.ensure_node(&member);
            self.insert_edge(source, &member, member_kind);
        }
    }

    /// Bounded-depth named resolution with cycle detection along the current
    /// resolution path.
    fn resolve_named(
        &mut self,
        source: &CellAddress,
        name: &str,
        depth: u32,
        path: &mut Vec<String>,
    ) {
        let key = name.to_lowercase();
        if path.contains(&key) {
            self.named_failures.push(NamedFailure {
                source: source.clone(),
                name: name.to_string(),
                kind: NamedFailureKind::Cycle,
            });
            return;
        }
        if depth >= self.options.named_range_depth {
            self.named_failures.push(NamedFailure {
                source: source.clone(),
                name: name.to_string(),
                kind: NamedFailureKind::DepthExceeded,
            });
            return;
        }
        let entry = match self.named.get(name) {
            Some(entry) => entry.clone(),
            None => {
                self.unknown_names.push((source.clone(), name.to_string()));
                return;
            }
        };

        path.push(key);
        if let Ok(range) = CellRange::parse_range(&entry.definition) {
            self.add_range_edges(source, &range, EdgeKind::Named);
        } else {
            // Not an address: a named formula. References without a sheet
            // qualifier have no home sheet and cannot bind.
            let parsed = extract(&entry.definition, "");
            for reference in &parsed.references {
                match &reference.target {
                    RefTarget::Cell(target) if !target.sheet.is_empty() => {
                        self.add_cell_edge(source, target, EdgeKind::Named);
                    }
                    RefTarget::Range(range) if !range.sheet().is_empty() => {
                        self.add_range_edges(source, range, EdgeKind::Named);
                    }
                    RefTarget::Name(nested) => {
                        self.resolve_named(source, nested, depth + 1, path);
                    }
                    _ => {}
                }
            }
        }
        path.pop();
    }

    fn ensure_node(&mut self, addr: &CellAddress) {
        if !self.nodes.contains_key(addr) {
            self.nodes.insert(addr.clone(), Cell::implicit(addr.clone()));
            self.implicit.insert(addr.clone());
        }
    }

    fn insert_edge(&mut self, source: &CellAddress, target: &CellAddress, kind: EdgeKind) {
        self.edge_map
            .entry((source.clone(), target.clone()))
            .and_modify(|existing| {
                if kind.strength() > existing.strength() {
                    *existing = kind;
                }
            })
            .or_insert(kind);
    }

    /// Freeze into the read-only graph, checking edge endpoints.
    pub fn finish(
        self,
    ) -> Result<(DependencyGraph, Vec<NamedFailure>, Vec<(CellAddress, String)>)> {
        for (source, target) in self.edge_map.keys() {
            if !self.nodes.contains_key(source) {
                return Err(AnalysisError::InternalInvariant(format!(
                    "edge source {source} is not a graph node"
                )));
            }
            if !self.nodes.contains_key(target) {
                return Err(AnalysisError::InternalInvariant(format!(
                    "edge target {target} is not a graph node"
                )));
            }
        }
        let graph = DependencyGraph::from_parts(
            self.nodes,
            self.edge_map,
            self.implicit,
            self.range_summaries,
        );
        Ok((graph, self.named_failures, self.unknown_names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Value;

    fn addr(s: &str) -> CellAddress {
        CellAddress::parse_a1(s).unwrap()
    }

    fn formula_cell(s: &str) -> (CellAddress, Cell) {
        let a = addr(s);
        (a.clone(), Cell::new(a, None, Some("=X".into())))
    }

    fn literal_cell(s: &str) -> (CellAddress, Cell) {
        let a = addr(s);
        (a.clone(), Cell::new(a, Some(Value::Number(1.0)), None))
    }

    fn build(
        nodes: Vec<(CellAddress, Cell)>,
        named: &NamedRangeTable,
        refs: Vec<(CellAddress, Vec<Reference>)>,
        options: &AnalysisOptions,
    ) -> (DependencyGraph, Vec<NamedFailure>, Vec<(CellAddress, String)>) {
        let mut builder = GraphBuilder::new(options, named, nodes.into_iter().collect());
        for (source, references) in &refs {
            builder.add_references(source, references);
        }
        builder.finish().unwrap()
    }

    fn direct(target: &str) -> Reference {
        Reference {
            kind: EdgeKind::Direct,
            target: RefTarget::Cell(addr(target)),
            in_function: None,
        }
    }

    fn range(text: &str) -> Reference {
        Reference {
            kind: EdgeKind::Direct,
            target: RefTarget::Range(CellRange::parse_range(text).unwrap()),
            in_function: None,
        }
    }

    fn named(name: &str) -> Reference {
        Reference {
            kind: EdgeKind::Named,
            target: RefTarget::Name(name.to_string()),
            in_function: None,
        }
    }

    #[test]
    fn implicit_nodes_appear_for_unpopulated_targets() {
        let options = AnalysisOptions::default();
        let (g, _, _) = build(
            vec![formula_cell("S!A1")],
            &NamedRangeTable::default(),
            vec![(addr("S!A1"), vec![direct("Missing!X9")])],
            &options,
        );
        assert_eq!(g.node_count(), 2);
        assert!(g.is_implicit(&addr("Missing!X9")));
        assert!(!g.get(&addr("Missing!X9")).unwrap().flags.is_input());
    }

    #[test]
    fn range_expands_row_major_and_coalesces_with_direct() {
        let options = AnalysisOptions::default();
        let (g, _, _) = build(
            vec![formula_cell("S!C1"), literal_cell("S!A1")],
            &NamedRangeTable::default(),
            vec![(addr("S!C1"), vec![direct("S!A1"), range("S!A1:A1")])],
            &options,
        );
        // The direct edge wins the coalesce against the range membership.
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.edges()[0].kind, EdgeKind::Direct);
    }

    #[test]
    fn oversized_range_is_summarized() {
        let options = AnalysisOptions {
            range_fanout_cap: 4,
            ..Default::default()
        };
        let (g, _, _) = build(
            vec![formula_cell("S!Z1")],
            &NamedRangeTable::default(),
            vec![(addr("S!Z1"), vec![range("S!A1:A9")])],
            &options,
        );
        assert_eq!(g.range_summaries().len(), 1);
        assert_eq!(g.range_summaries()[0].cell_count, 9);
        // One anchor edge instead of nine member edges.
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.edges()[0].target, addr("S!A1"));
    }

    #[test]
    fn named_range_resolves_to_named_edges() {
        let options = AnalysisOptions::default();
        let table =
            NamedRangeTable::from_pairs(vec![("Rates".to_string(), "S!B1:B2".to_string())]);
        let (g, failures, unknown) = build(
            vec![formula_cell("S!A1")],
            &table,
            vec![(addr("S!A1"), vec![named("rates")])],
            &options,
        );
        assert!(failures.is_empty() && unknown.is_empty());
        assert_eq!(g.edge_count(), 2);
        assert!(g.edges().iter().all(|e| e.kind == EdgeKind::Named));
    }

    #[test]
    fn named_cycle_is_detected() {
        let options = AnalysisOptions::default();
        let table = NamedRangeTable::from_pairs(vec![
            ("A".to_string(), "=B+1".to_string()),
            ("B".to_string(), "=A+1".to_string()),
        ]);
        let (_, failures, _) = build(
            vec![formula_cell("S!A1")],
            &table,
            vec![(addr("S!A1"), vec![named("A")])],
            &options,
        );
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, NamedFailureKind::Cycle);
    }

    #[test]
    fn unknown_name_is_reported() {
        let options = AnalysisOptions::default();
        let (_, _, unknown) = build(
            vec![formula_cell("S!A1")],
            &NamedRangeTable::default(),
            vec![(addr("S!A1"), vec![named("Ghost")])],
            &options,
        );
        assert_eq!(unknown, vec![(addr("S!A1"), "Ghost".to_string())]);
    }

    #[test]
    fn dynamic_range_members_keep_dynamic_kind() {
        let options = AnalysisOptions::default();
        let dynamic_range = Reference {
            kind: EdgeKind::Dynamic,
            target: RefTarget::Range(CellRange::parse_range("S!B1:B2").unwrap()),
            in_function: Some("OFFSET".to_string()),
        };
        let (g, _, _) = build(
            vec![formula_cell("S!A1")],
            &NamedRangeTable::default(),
            vec![(addr("S!A1"), vec![dynamic_range])],
            &options,
        );
        assert!(g.edges().iter().all(|e| e.kind == EdgeKind::Dynamic));
    }
}
