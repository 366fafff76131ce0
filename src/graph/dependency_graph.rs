//! The frozen cell dependency graph.
//!
//! Nodes are cells (populated or implicit), edges point from a formula's
//! home cell to each cell it reads. After construction the graph is
//! read-only; both analysis passes walk it concurrently without locks.

use crate::core::addr::CellAddress;
use crate::core::types::{Cell, CellFlags, DependencyEdge, EdgeKind, RangeSummary};
use im::{HashMap, HashSet};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<CellAddress, Cell>,
    /// Sorted by `(source, target, kind)` for deterministic iteration.
    edges: Vec<DependencyEdge>,
    /// source → set of cells the source reads.
    reads_index: HashMap<CellAddress, HashSet<CellAddress>>,
    /// target → set of cells reading the target.
    dependents_index: HashMap<CellAddress, HashSet<CellAddress>>,
    /// Addresses referenced by formulas but never populated by the reader.
    implicit: HashSet<CellAddress>,
    /// Oversized ranges kept summarized instead of expanded.
    range_summaries: Vec<RangeSummary>,
}

impl DependencyGraph {
    pub(crate) fn from_parts(
        nodes: BTreeMap<CellAddress, Cell>,
        edge_map: std::collections::HashMap<(CellAddress, CellAddress), EdgeKind>,
        implicit: HashSet<CellAddress>,
        range_summaries: Vec<RangeSummary>,
    ) -> Self {
        let mut edges: Vec<DependencyEdge> = edge_map
            .into_iter()
            .map(|((source, target), kind)| DependencyEdge {
                source,
                target,
                kind,
            })
            .collect();
        edges.sort();

        let mut reads_index: HashMap<CellAddress, HashSet<CellAddress>> = HashMap::new();
        let mut dependents_index: HashMap<CellAddress, HashSet<CellAddress>> = HashMap::new();
        for edge in &edges {
            reads_index
                .entry(edge.source.clone())
                .or_default()
                .insert(edge.target.clone());
            dependents_index
                .entry(edge.target.clone())
                .or_default()
                .insert(edge.source.clone());
        }

        let mut graph = Self {
            nodes,
            edges,
            reads_index,
            dependents_index,
            implicit,
            range_summaries,
        };
        graph.assign_outputs();
        graph
    }

    /// `is_output` holds for formula cells no other cell depends on.
    fn assign_outputs(&mut self) {
        let mut outputs = Vec::new();
        for (addr, cell) in &self.nodes {
            if cell.flags.has_formula()
                && self
                    .dependents_index
                    .get(addr)
                    .map_or(true, |readers| readers.is_empty())
            {
                outputs.push(addr.clone());
            }
        }
        for addr in outputs {
            if let Some(cell) = self.nodes.get_mut(&addr) {
                cell.flags.set(CellFlags::IS_OUTPUT, true);
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn get(&self, addr: &CellAddress) -> Option<&Cell> {
        self.nodes.get(addr)
    }

    /// Cells in address order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.nodes.values()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &CellAddress> {
        self.nodes.keys()
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn is_implicit(&self, addr: &CellAddress) -> bool {
        self.implicit.contains(addr)
    }

    pub fn implicit_nodes(&self) -> Vec<CellAddress> {
        let mut v: Vec<CellAddress> = self.implicit.iter().cloned().collect();
        v.sort();
        v
    }

    pub fn range_summaries(&self) -> &[RangeSummary] {
        &self.range_summaries
    }

    /// Cells `addr` reads, directly or (with `transitive`) through any chain.
    pub fn dependencies_of(&self, addr: &CellAddress, transitive: bool) -> Vec<CellAddress> {
        self.reach(addr, &self.reads_index, transitive)
    }

    /// Cells reading `addr`, directly or (with `transitive`) through any chain.
    pub fn dependents_of(&self, addr: &CellAddress, transitive: bool) -> Vec<CellAddress> {
        self.reach(addr, &self.dependents_index, transitive)
    }

    fn reach(
        &self,
        addr: &CellAddress,
        index: &HashMap<CellAddress, HashSet<CellAddress>>,
        transitive: bool,
    ) -> Vec<CellAddress> {
        let mut out: Vec<CellAddress> = if !transitive {
            index
                .get(addr)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default()
        } else {
            let mut seen: HashSet<CellAddress> = HashSet::new();
            let mut queue: Vec<CellAddress> = vec![addr.clone()];
            while let Some(current) = queue.pop() {
                if let Some(next) = index.get(&current) {
                    for n in next {
                        if !seen.contains(n) && n != addr {
                            seen.insert(n.clone());
                            queue.push(n.clone());
                        }
                    }
                }
            }
            seen.into_iter().collect()
        };
        out.sort();
        out
    }

    pub fn out_degree(&self, addr: &CellAddress) -> usize {
        self.reads_index.get(addr).map_or(0, HashSet::len)
    }

    pub fn in_degree(&self, addr: &CellAddress) -> usize {
        self.dependents_index.get(addr).map_or(0, HashSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn addr(s: &str) -> CellAddress {
        CellAddress::parse_a1(s).unwrap()
    }

    fn graph_of(edges: &[(&str, &str, EdgeKind)]) -> DependencyGraph {
        let mut nodes = BTreeMap::new();
        let mut edge_map = StdHashMap::new();
        for (src, tgt, kind) in edges {
            let (s, t) = (addr(src), addr(tgt));
            nodes
                .entry(s.clone())
                .or_insert_with(|| Cell::new(s.clone(), None, Some("=X".into())));
            nodes
                .entry(t.clone())
                .or_insert_with(|| Cell::implicit(t.clone()));
            edge_map.insert((s, t), *kind);
        }
        DependencyGraph::from_parts(nodes, edge_map, HashSet::new(), Vec::new())
    }

    #[test]
    fn edges_are_sorted_for_determinism() {
        let g = graph_of(&[
            ("S!B1", "S!A1", EdgeKind::Direct),
            ("S!A2", "S!A1", EdgeKind::Direct),
        ]);
        let order: Vec<String> = g.edges().iter().map(|e| e.source.to_a1()).collect();
        assert_eq!(order, ["S!A2", "S!B1"]);
    }

    #[test]
    fn transitive_reach_walks_chains() {
        let g = graph_of(&[
            ("S!C1", "S!B1", EdgeKind::Direct),
            ("S!B1", "S!A1", EdgeKind::Direct),
        ]);
        let deps = g.dependencies_of(&addr("S!C1"), true);
        assert_eq!(deps, vec![addr("S!A1"), addr("S!B1")]);
        let dependents = g.dependents_of(&addr("S!A1"), true);
        assert_eq!(dependents, vec![addr("S!B1"), addr("S!C1")]);
    }

    #[test]
    fn outputs_are_formula_cells_nobody_reads() {
        let g = graph_of(&[("S!B1", "S!A1", EdgeKind::Direct)]);
        assert!(g.get(&addr("S!B1")).unwrap().flags.is_output());
        assert!(!g.get(&addr("S!A1")).unwrap().flags.is_output());
    }

    #[test]
    fn cycle_reach_terminates() {
        let g = graph_of(&[
            ("S!A1", "S!B1", EdgeKind::Direct),
            ("S!B1", "S!A1", EdgeKind::Direct),
        ]);
        assert_eq!(g.dependencies_of(&addr("S!A1"), true), vec![addr("S!B1")]);
    }
}
