//! Cost-driver ranking: centrality plus downstream impact.
//!
//! Centrality is approximate betweenness via Brandes' algorithm over the
//! influence direction of the graph (value flows from a cell to the formulas
//! reading it). Dependent counts come from a reverse-reachability pass on the
//! condensation. Large graphs switch to seeded sampling so runs stay
//! reproducible.

use crate::config::AnalysisOptions;
use crate::core::addr::CellAddress;
use crate::core::cancel::{CancelToken, CANCEL_POLL_INTERVAL};
use crate::core::errors::Result;
use crate::core::types::CostDriver;
use crate::graph::dependency_graph::DependencyGraph;
use fixedbitset::FixedBitSet;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::DiGraph;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Above this node count, Brandes runs on a sampled source set.
const CENTRALITY_SAMPLING_THRESHOLD: usize = 5_000;
/// Above this node count, dependent counting switches to sampling.
const REACH_SAMPLING_THRESHOLD: usize = 20_000;
/// Upper bound on sampled sources.
const SAMPLE_CAP: usize = 500;

/// Ranked driver output: the truncated top list plus the eligible total.
#[derive(Debug, Clone, Default)]
pub struct DriverAnalysis {
    pub total_drivers: usize,
    pub top_drivers: Vec<CostDriver>,
}

/// Analyzes the frozen graph for cells with disproportionate influence.
pub struct CostDriverAnalyzer<'a> {
    graph: &'a DependencyGraph,
    options: &'a AnalysisOptions,
}

impl<'a> CostDriverAnalyzer<'a> {
    pub fn new(graph: &'a DependencyGraph, options: &'a AnalysisOptions) -> Self {
        Self { graph, options }
    }

    pub fn analyze(&self, cancel: &CancelToken) -> Result<DriverAnalysis> {
        let addresses: Vec<CellAddress> = self.graph.addresses().cloned().collect();
        let n = addresses.len();
        if n == 0 {
            return Ok(DriverAnalysis::default());
        }
        cancel.check()?;

        let index: HashMap<&CellAddress, usize> = addresses
            .iter()
            .enumerate()
            .map(|(i, a)| (a, i))
            .collect();

        // Influence adjacency (target -> its readers) and its reverse
        // (reader -> what it reads).
        let mut influence: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut reads: Vec<Vec<usize>> = vec![Vec::new(); n];
        for edge in self.graph.edges() {
            influence[index[&edge.target]].push(index[&edge.source]);
            reads[index[&edge.source]].push(index[&edge.target]);
        }
        for next in influence.iter_mut().chain(reads.iter_mut()) {
            next.sort_unstable();
        }

        let centrality = self.betweenness(&influence, n, cancel)?;
        cancel.check()?;
        let reach = self.dependent_reach(&addresses, &influence, &reads, n, cancel)?;
        cancel.check()?;

        let mut drivers: Vec<CostDriver> = Vec::new();
        for (i, addr) in addresses.iter().enumerate() {
            let has_formula = self
                .graph
                .get(addr)
                .map_or(false, |c| c.flags.has_formula());
            let dependent_count = reach.counts[i];
            if !has_formula && dependent_count == 0 {
                continue;
            }
            let centrality_score = centrality[i].clamp(0.0, 1.0);
            let reach_share = if n > 1 {
                dependent_count as f64 / (n - 1) as f64
            } else {
                0.0
            };
            let impact_score = (0.6 * centrality_score + 0.4 * reach_share).clamp(0.0, 1.0);
            drivers.push(CostDriver {
                cell_address: addr.clone(),
                centrality_score: round4(centrality_score),
                impact_score: round4(impact_score),
                dependent_count,
                description: format!(
                    "Affects {} cells across {} sheet(s)",
                    dependent_count, reach.sheet_counts[i]
                ),
            });
        }

        drivers.sort_by(|a, b| {
            b.impact_score
                .partial_cmp(&a.impact_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.dependent_count.cmp(&a.dependent_count))
                .then(a.cell_address.cmp(&b.cell_address))
        });

        let total_drivers = drivers.len();
        drivers.truncate(self.options.effective_top_drivers());
        log::debug!(
            "cost-driver analysis ranked {total_drivers} cells, reporting {}",
            drivers.len()
        );
        Ok(DriverAnalysis {
            total_drivers,
            top_drivers: drivers,
        })
    }

    /// Brandes betweenness, normalized to `[0, 1]` by `(N-1)(N-2)/2`.
    fn betweenness(
        &self,
        influence: &[Vec<usize>],
        n: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<f64>> {
        if n <= 2 {
            return Ok(vec![0.0; n]);
        }

        let sources: Vec<usize> = if n > CENTRALITY_SAMPLING_THRESHOLD {
            let k = SAMPLE_CAP.min(n / 4);
            let mut rng = StdRng::seed_from_u64(self.options.sampling_seed);
            let mut sampled = rand::seq::index::sample(&mut rng, n, k).into_vec();
            sampled.sort_unstable();
            sampled
        } else {
            (0..n).collect()
        };
        let scale = n as f64 / sources.len() as f64;

        // Per-thread partial accumulators, merged at the end.
        let accumulated = sources
            .par_iter()
            .fold(
                || vec![0.0f64; n],
                |mut acc, &source| {
                    if !cancel.is_cancelled() {
                        brandes_from_source(influence, source, &mut acc);
                    }
                    acc
                },
            )
            .reduce(
                || vec![0.0f64; n],
                |mut left, right| {
                    for (l, r) in left.iter_mut().zip(right) {
                        *l += r;
                    }
                    left
                },
            );
        cancel.check()?;

        let normalizer = ((n - 1) * (n - 2)) as f64 / 2.0;
        Ok(accumulated
            .into_iter()
            .map(|b| (b * scale / normalizer).clamp(0.0, 1.0))
            .collect())
    }

    fn dependent_reach(
        &self,
        addresses: &[CellAddress],
        influence: &[Vec<usize>],
        reads: &[Vec<usize>],
        n: usize,
        cancel: &CancelToken,
    ) -> Result<Reach> {
        if n > REACH_SAMPLING_THRESHOLD {
            self.sampled_reach(addresses, reads, n, cancel)
        } else {
            exact_reach(addresses, influence, n, cancel)
        }
    }

    /// Sampled counting: probe K seeded readers; each probe's transitive
    /// dependency set marks every cell it ultimately depends on, and the hit
    /// tallies scale up to estimated dependent counts.
    fn sampled_reach(
        &self,
        addresses: &[CellAddress],
        reads: &[Vec<usize>],
        n: usize,
        cancel: &CancelToken,
    ) -> Result<Reach> {
        let k = SAMPLE_CAP.min(n / 4).max(1);
        let mut rng = StdRng::seed_from_u64(self.options.sampling_seed);
        let mut probes = rand::seq::index::sample(&mut rng, n, k).into_vec();
        probes.sort_unstable();

        let sheet_ids = sheet_index(addresses);
        let sheet_count = sheet_ids.len();
        let mut hits = vec![0usize; n];
        let mut sheet_hits = vec![FixedBitSet::with_capacity(sheet_count); n];
        let mut seen = FixedBitSet::with_capacity(n);
        let mut queue = VecDeque::new();

        for (iter, &probe) in probes.iter().enumerate() {
            if iter % 8 == 0 {
                cancel.check()?;
            }
            seen.clear();
            queue.clear();
            seen.insert(probe);
            queue.push_back(probe);
            let probe_sheet = sheet_ids[addresses[probe].sheet.as_str()];
            while let Some(current) = queue.pop_front() {
                for &dependency in &reads[current] {
                    if !seen.contains(dependency) {
                        seen.insert(dependency);
                        queue.push_back(dependency);
                        hits[dependency] += 1;
                        sheet_hits[dependency].insert(probe_sheet);
                    }
                }
            }
        }

        let scale = n as f64 / probes.len() as f64;
        let counts: Vec<usize> = hits
            .iter()
            .map(|&h| (((h as f64) * scale).round() as usize).min(n.saturating_sub(1)))
            .collect();
        let sheet_counts: Vec<usize> = sheet_hits
            .iter()
            .map(|b| b.count_ones(..))
            .collect();
        Ok(Reach {
            counts,
            sheet_counts,
        })
    }
}

/// Exact dependent counts via condensation DP with descendant bitsets.
fn exact_reach(
    addresses: &[CellAddress],
    influence: &[Vec<usize>],
    n: usize,
    cancel: &CancelToken,
) -> Result<Reach> {
    let mut pg: DiGraph<(), ()> = DiGraph::new();
    let nodes: Vec<_> = (0..n).map(|_| pg.add_node(())).collect();
    for (from, nexts) in influence.iter().enumerate() {
        for &to in nexts {
            pg.add_edge(nodes[from], nodes[to], ());
        }
    }

    let sccs = tarjan_scc(&pg);
    let num_sccs = sccs.len();
    let mut scc_of = vec![0usize; n];
    for (id, scc) in sccs.iter().enumerate() {
        for node in scc {
            scc_of[node.index()] = id;
        }
    }

    // Condensed adjacency in the influence direction.
    let mut cond: DiGraph<(), ()> = DiGraph::new();
    let cond_nodes: Vec<_> = (0..num_sccs).map(|_| cond.add_node(())).collect();
    let mut seen_pairs = std::collections::HashSet::new();
    for (from, nexts) in influence.iter().enumerate() {
        for &to in nexts {
            let (a, b) = (scc_of[from], scc_of[to]);
            if a != b && seen_pairs.insert((a, b)) {
                cond.add_edge(cond_nodes[a], cond_nodes[b], ());
            }
        }
    }
    let order = toposort(&cond, None).map_err(|_| {
        crate::core::errors::AnalysisError::InternalInvariant(
            "SCC condensation is not acyclic".to_string(),
        )
    })?;

    let sheet_ids = sheet_index(addresses);
    let sheet_count = sheet_ids.len();
    let mut scc_size = vec![0usize; num_sccs];
    let mut scc_sheets = vec![FixedBitSet::with_capacity(sheet_count); num_sccs];
    for (i, &scc) in scc_of.iter().enumerate() {
        scc_size[scc] += 1;
        scc_sheets[scc].insert(sheet_ids[addresses[i].sheet.as_str()]);
    }

    // Reverse-topological DP: descendants of an SCC in influence direction
    // are the cells depending on its members.
    let mut desc: Vec<FixedBitSet> = vec![FixedBitSet::with_capacity(num_sccs); num_sccs];
    for (i, node) in order.iter().rev().enumerate() {
        if i % CANCEL_POLL_INTERVAL == 0 {
            cancel.check()?;
        }
        let id = node.index();
        let mut bits = FixedBitSet::with_capacity(num_sccs);
        for succ in cond.neighbors(*node) {
            bits.insert(succ.index());
            bits.union_with(&desc[succ.index()]);
        }
        desc[id] = bits;
    }

    let mut counts = vec![0usize; n];
    let mut sheet_counts = vec![0usize; n];
    for (i, &scc) in scc_of.iter().enumerate() {
        let mut count = scc_size[scc] - 1;
        let mut sheets = if scc_size[scc] > 1 {
            scc_sheets[scc].clone()
        } else {
            FixedBitSet::with_capacity(sheet_count)
        };
        for d in desc[scc].ones() {
            count += scc_size[d];
            sheets.union_with(&scc_sheets[d]);
        }
        counts[i] = count;
        sheet_counts[i] = sheets.count_ones(..);
    }

    Ok(Reach {
        counts,
        sheet_counts,
    })
}

struct Reach {
    counts: Vec<usize>,
    /// Distinct sheets among each cell's transitive dependents.
    sheet_counts: Vec<usize>,
}

fn sheet_index<'a>(addresses: &'a [CellAddress]) -> BTreeMap<&'a str, usize> {
    let mut ids = BTreeMap::new();
    for addr in addresses {
        let next = ids.len();
        ids.entry(addr.sheet.as_str()).or_insert(next);
    }
    ids
}

/// One source iteration of Brandes' algorithm (unweighted).
fn brandes_from_source(influence: &[Vec<usize>], source: usize, acc: &mut [f64]) {
    let n = influence.len();
    let mut stack = Vec::with_capacity(n);
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![-1i64; n];
    let mut queue = VecDeque::new();

    sigma[source] = 1.0;
    dist[source] = 0;
    queue.push_back(source);

    while let Some(v) = queue.pop_front() {
        stack.push(v);
        for &w in &influence[v] {
            if dist[w] < 0 {
                dist[w] = dist[v] + 1;
                queue.push_back(w);
            }
            if dist[w] == dist[v] + 1 {
                sigma[w] += sigma[v];
                preds[w].push(v);
            }
        }
    }

    let mut delta = vec![0.0f64; n];
    while let Some(w) = stack.pop() {
        for &v in &preds[w] {
            delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
        }
        if w != source {
            acc[w] += delta[w];
        }
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
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

    /// `edges` as (reader, read); literal leaf cells get values.
    fn graph_of(formulas: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let mut nodes = BTreeMap::new();
        let mut edge_map = StdHashMap::new();
        for (src, tgt) in edges {
            for s in [src, tgt] {
                let a = addr(s);
                let is_formula = formulas.contains(s);
                nodes.entry(a.clone()).or_insert_with(|| {
                    if is_formula {
                        Cell::new(a, None, Some("=X".into()))
                    } else {
                        Cell::new(a, Some(crate::core::types::Value::Number(1.0)), None)
                    }
                });
            }
            edge_map.insert((addr(src), addr(tgt)), EdgeKind::Direct);
        }
        DependencyGraph::from_parts(nodes, edge_map, HashSet::new(), Vec::new())
    }

    fn analyze(graph: &DependencyGraph) -> DriverAnalysis {
        let options = AnalysisOptions::default();
        CostDriverAnalyzer::new(graph, &options)
            .analyze(&CancelToken::new())
            .unwrap()
    }

    #[test]
    fn empty_graph_yields_no_drivers() {
        let g = DependencyGraph::default();
        let out = analyze(&g);
        assert_eq!(out.total_drivers, 0);
        assert!(out.top_drivers.is_empty());
    }

    #[test]
    fn chain_ranks_the_bridge_highest() {
        // C1 reads B1, B1 reads A1: B1 carries all influence through it.
        let g = graph_of(&["S!B1", "S!C1"], &[("S!C1", "S!B1"), ("S!B1", "S!A1")]);
        let out = analyze(&g);
        // B1 is the only intermediary: full betweenness plus one dependent.
        assert_eq!(out.top_drivers[0].cell_address, addr("S!B1"));
        assert_eq!(out.top_drivers[0].centrality_score, 1.0);
        assert_eq!(out.top_drivers[0].impact_score, 0.8);
    }

    #[test]
    fn dependent_counts_are_transitive() {
        let g = graph_of(&["S!B1", "S!C1"], &[("S!C1", "S!B1"), ("S!B1", "S!A1")]);
        let out = analyze(&g);
        let by_addr: StdHashMap<String, usize> = out
            .top_drivers
            .iter()
            .map(|d| (d.cell_address.to_a1(), d.dependent_count))
            .collect();
        assert_eq!(by_addr["S!A1"], 2);
        assert_eq!(by_addr["S!B1"], 1);
        assert_eq!(by_addr["S!C1"], 0);
    }

    #[test]
    fn literal_leaves_without_dependents_are_excluded() {
        let g = graph_of(&["S!B1"], &[("S!B1", "S!A1")]);
        let out = analyze(&g);
        // A1 (literal, 1 dependent) and B1 (formula) qualify.
        assert_eq!(out.total_drivers, 2);

        // An isolated literal must not appear.
        let g = graph_of(&["S!B1"], &[("S!B1", "S!A1"), ("S!B1", "S!A2")]);
        let out = analyze(&g);
        assert!(out
            .top_drivers
            .iter()
            .all(|d| d.cell_address != addr("S!Z9")));
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let g = graph_of(
            &["S!B1", "S!C1", "S!D1"],
            &[
                ("S!B1", "S!A1"),
                ("S!C1", "S!B1"),
                ("S!D1", "S!C1"),
                ("S!D1", "S!A1"),
            ],
        );
        let out = analyze(&g);
        for d in &out.top_drivers {
            assert!((0.0..=1.0).contains(&d.centrality_score));
            assert!((0.0..=1.0).contains(&d.impact_score));
            assert!(d.dependent_count <= g.node_count() - 1);
        }
    }

    #[test]
    fn cross_sheet_dependents_count_sheets() {
        let g = graph_of(
            &["T!B1", "S!B1"],
            &[("T!B1", "S!A1"), ("S!B1", "S!A1")],
        );
        let out = analyze(&g);
        let a1 = out
            .top_drivers
            .iter()
            .find(|d| d.cell_address == addr("S!A1"))
            .unwrap();
        assert_eq!(a1.dependent_count, 2);
        assert_eq!(a1.description, "Affects 2 cells across 2 sheet(s)");
    }

    #[test]
    fn ranking_is_deterministic() {
        let g = graph_of(
            &["S!B1", "S!B2"],
            &[("S!B1", "S!A1"), ("S!B2", "S!A2")],
        );
        let first = analyze(&g);
        let second = analyze(&g);
        assert_eq!(first.top_drivers, second.top_drivers);
        // Equal scores fall back to address order.
        assert!(first.top_drivers[0].cell_address < first.top_drivers[1].cell_address);
    }

    #[test]
    fn cycle_members_depend_on_each_other() {
        let g = graph_of(&["S!A1", "S!B1"], &[("S!A1", "S!B1"), ("S!B1", "S!A1")]);
        let out = analyze(&g);
        for d in &out.top_drivers {
            assert_eq!(d.dependent_count, 1);
        }
    }
}
