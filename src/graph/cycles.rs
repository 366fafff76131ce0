//! Cycle detection and depth metrics over the frozen graph.
//!
//! The dependency graph is projected into a petgraph `DiGraph` for Tarjan's
//! SCC algorithm; `max_depth` is computed on the condensation, treating each
//! SCC as a single node weighted by its size.

use crate::core::addr::CellAddress;
use crate::core::cancel::{CancelToken, CANCEL_POLL_INTERVAL};
use crate::core::errors::Result;
use crate::graph::dependency_graph::DependencyGraph;
use petgraph::algo::{condensation, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Cycle catalogue plus the condensation depth metric.
#[derive(Debug, Clone, Default)]
pub struct CycleInfo {
    /// One entry per SCC of size >= 2 and per self-loop; each is the cycle
    /// walk starting from the SCC's smallest address.
    pub cycles: Vec<Vec<CellAddress>>,
    /// Longest dependency chain: max over condensation paths of the summed
    /// SCC sizes minus one. Zero for an empty graph.
    pub max_depth: usize,
}

/// Project the dependency graph into petgraph form. Node indices follow
/// address order so equal inputs build identical projections.
pub(crate) fn project(
    graph: &DependencyGraph,
) -> (DiGraph<(), ()>, Vec<CellAddress>, HashMap<CellAddress, NodeIndex>) {
    let mut pg = DiGraph::new();
    let addresses: Vec<CellAddress> = graph.addresses().cloned().collect();
    let mut node_map = HashMap::with_capacity(addresses.len());
    for addr in &addresses {
        let idx = pg.add_node(());
        node_map.insert(addr.clone(), idx);
    }
    for edge in graph.edges() {
        pg.add_edge(node_map[&edge.source], node_map[&edge.target], ());
    }
    (pg, addresses, node_map)
}

/// Find all cycles and compute `max_depth`.
pub fn analyze_cycles(graph: &DependencyGraph, cancel: &CancelToken) -> Result<CycleInfo> {
    if graph.node_count() == 0 {
        return Ok(CycleInfo::default());
    }
    cancel.check()?;

    let (pg, addresses, _node_map) = project(graph);
    let sccs = tarjan_scc(&pg);

    let mut cycles = Vec::new();
    for (i, scc) in sccs.iter().enumerate() {
        if i % CANCEL_POLL_INTERVAL == 0 {
            cancel.check()?;
        }
        let is_cycle = scc.len() >= 2
            || pg.contains_edge(scc[0], scc[0]);
        if is_cycle {
            cycles.push(cycle_walk(graph, &addresses, scc));
        }
    }
    // One canonical report order regardless of Tarjan's discovery order.
    cycles.sort();

    let max_depth = condensation_depth(&pg, cancel)?;

    Ok(CycleInfo { cycles, max_depth })
}

/// Walk the SCC along its edges starting from the smallest member address.
fn cycle_walk(
    graph: &DependencyGraph,
    addresses: &[CellAddress],
    scc: &[NodeIndex],
) -> Vec<CellAddress> {
    let mut members: Vec<CellAddress> = scc
        .iter()
        .map(|idx| addresses[idx.index()].clone())
        .collect();
    members.sort();
    let member_set: std::collections::BTreeSet<&CellAddress> = members.iter().collect();

    let start = members[0].clone();
    let mut path = vec![start.clone()];
    let mut visited = std::collections::BTreeSet::new();
    visited.insert(start.clone());
    let mut current = start;
    loop {
        let next = graph
            .dependencies_of(&current, false)
            .into_iter()
            .find(|n| member_set.contains(n) && !visited.contains(n));
        match next {
            Some(n) => {
                visited.insert(n.clone());
                path.push(n.clone());
                current = n;
            }
            None => break,
        }
    }
    path
}

/// Longest weighted path over the condensation DAG.
fn condensation_depth(pg: &DiGraph<(), ()>, cancel: &CancelToken) -> Result<usize> {
    let condensed = condensation(pg.clone(), true);
    if condensed.node_count() == 0 {
        return Ok(0);
    }
    let order = toposort(&condensed, None).map_err(|_| {
        crate::core::errors::AnalysisError::InternalInvariant(
            "condensation produced a cyclic graph".to_string(),
        )
    })?;

    // Longest path ending computation in reverse topological order:
    // f(n) = weight(n) + max over successors f(succ).
    let mut best: Vec<usize> = vec![0; condensed.node_count()];
    for (i, node) in order.iter().rev().enumerate() {
        if i % CANCEL_POLL_INTERVAL == 0 {
            cancel.check()?;
        }
        let weight = condensed[*node].len();
        let succ_best = condensed
            .neighbors(*node)
            .map(|succ| best[succ.index()])
            .max()
            .unwrap_or(0);
        best[node.index()] = weight + succ_best;
    }
    Ok(best.iter().copied().max().unwrap_or(0).saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Cell, EdgeKind};
    use im::HashSet;
    use std::collections::{BTreeMap, HashMap as StdHashMap};

    fn addr(s: &str) -> CellAddress {
        CellAddress::parse_a1(s).unwrap()
    }

    fn graph_of(edges: &[(&str, &str)]) -> DependencyGraph {
        let mut nodes = BTreeMap::new();
        let mut edge_map = StdHashMap::new();
        for (src, tgt) in edges {
            for s in [src, tgt] {
                let a = addr(s);
                nodes
                    .entry(a.clone())
                    .or_insert_with(|| Cell::new(a, None, Some("=X".into())));
            }
            edge_map.insert((addr(src), addr(tgt)), EdgeKind::Direct);
        }
        DependencyGraph::from_parts(nodes, edge_map, HashSet::new(), Vec::new())
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let info = analyze_cycles(&graph_of(&[("S!A3", "S!A1"), ("S!A3", "S!A2")]), &CancelToken::new())
            .unwrap();
        assert!(info.cycles.is_empty());
        assert_eq!(info.max_depth, 1);
    }

    #[test]
    fn two_cell_cycle_is_reported_from_smallest() {
        let info = analyze_cycles(&graph_of(&[("S!B1", "S!A1"), ("S!A1", "S!B1")]), &CancelToken::new())
            .unwrap();
        assert_eq!(info.cycles.len(), 1);
        let cycle: Vec<String> = info.cycles[0].iter().map(|a| a.to_a1()).collect();
        assert_eq!(cycle, ["S!A1", "S!B1"]);
        // One two-cell SCC condenses to a single node of weight two.
        assert_eq!(info.max_depth, 1);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let info =
            analyze_cycles(&graph_of(&[("S!A1", "S!A1")]), &CancelToken::new()).unwrap();
        assert_eq!(info.cycles.len(), 1);
        assert_eq!(info.cycles[0], vec![addr("S!A1")]);
    }

    #[test]
    fn chain_depth_counts_edges() {
        let info = analyze_cycles(
            &graph_of(&[("S!A3", "S!A2"), ("S!A2", "S!A1")]),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(info.max_depth, 2);
    }

    #[test]
    fn cancelled_run_stops() {
        let token = CancelToken::new();
        token.cancel();
        assert!(analyze_cycles(&graph_of(&[("S!A2", "S!A1")]), &token).is_err());
    }
}
