//! Community detection over the nearest-neighbor graph.
//!
//! The emitted edge list is directed and may repeat pairs, so it is first
//! collapsed into a simple undirected `petgraph` graph. Two partitioners
//! run on that graph:
//!
//! * greedy modularity: start from singletons and repeatedly merge the two
//!   adjacent communities with the largest modularity gain, keeping the
//!   best partition seen along the way.
//! * edge betweenness: repeatedly delete the edge carrying the most
//!   shortest paths, keeping the connected-component partition with the
//!   best modularity.
//!
//! Both ignore edge weights. Isolated nodes always end up alone.

use crate::neighbors::NearestNeighborGraph;
use clap::ValueEnum;
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::stable_graph::StableUnGraph;
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, info};

const GAIN_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterAlgorithm {
    #[default]
    ModularityGreedy,
    EdgeBetweenness,
}

impl ClusterAlgorithm {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ModularityGreedy => "modularity-greedy",
            Self::EdgeBetweenness => "edge-betweenness",
        }
    }
}

/// Handle → group id. Ids are contiguous from zero, numbered in node order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    pub algorithm: ClusterAlgorithm,
    pub modularity: f64,
    groups: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterRow {
    pub handle: String,
    pub group: usize,
}

impl ClusterAssignment {
    pub fn group_of(&self, handle: &str) -> Option<usize> {
        self.groups.get(handle).copied()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn group_count(&self) -> usize {
        self.groups.values().max().map_or(0, |&g| g + 1)
    }

    /// Members of each group, keyed by group id.
    pub fn groups(&self) -> BTreeMap<usize, Vec<String>> {
        let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (handle, &group) in &self.groups {
            groups.entry(group).or_default().push(handle.clone());
        }
        groups
    }

    pub fn rows(&self) -> Vec<ClusterRow> {
        self.groups
            .iter()
            .map(|(handle, &group)| ClusterRow {
                handle: handle.clone(),
                group,
            })
            .collect()
    }
}

/// Collapses direction, repeated pairs and self loops. Every node of the
/// neighbor graph is kept, connected or not. Parallel edges keep the
/// smallest distance.
pub fn simplify(neighbors: &NearestNeighborGraph) -> UnGraph<String, u32> {
    let mut graph: UnGraph<String, u32> = UnGraph::new_undirected();
    let mut node_indices = HashMap::new();
    for handle in neighbors.nodes() {
        node_indices
            .entry(handle.as_str())
            .or_insert_with(|| graph.add_node(handle.clone()));
    }

    for edge in neighbors.edges() {
        if edge.from == edge.to {
            continue;
        }
        let (Some(&a), Some(&b)) = (
            node_indices.get(edge.from.as_str()),
            node_indices.get(edge.to.as_str()),
        ) else {
            continue;
        };
        if let Some(existing) = graph.find_edge(a, b) {
            graph[existing] = graph[existing].min(edge.distance);
        } else {
            graph.add_edge(a, b, edge.distance);
        }
    }
    graph
}

pub fn cluster(neighbors: &NearestNeighborGraph, algorithm: ClusterAlgorithm) -> ClusterAssignment {
    let graph = simplify(neighbors);
    cluster_graph(&graph, algorithm)
}

/// Partitions a simple undirected graph.
pub fn cluster_graph(graph: &UnGraph<String, u32>, algorithm: ClusterAlgorithm) -> ClusterAssignment {
    let membership = match algorithm {
        ClusterAlgorithm::ModularityGreedy => greedy_modularity(graph),
        ClusterAlgorithm::EdgeBetweenness => girvan_newman(graph),
    };
    let membership = renumber(&membership);
    let modularity = modularity(graph, &membership);

    let groups: BTreeMap<String, usize> = graph
        .node_indices()
        .map(|n| (graph[n].clone(), membership[n.index()]))
        .collect();
    let assignment = ClusterAssignment {
        algorithm,
        modularity,
        groups,
    };
    info!(
        algorithm = algorithm.label(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        groups = assignment.group_count(),
        modularity,
        "clustered handles"
    );
    assignment
}

/// Newman modularity of `membership` (indexed by node index).
pub fn modularity(graph: &UnGraph<String, u32>, membership: &[usize]) -> f64 {
    let m = graph.edge_count() as f64;
    if m == 0.0 {
        return 0.0;
    }

    let mut internal: HashMap<usize, f64> = HashMap::new();
    let mut degree: HashMap<usize, f64> = HashMap::new();
    for edge in graph.edge_references() {
        let (s, t) = (edge.source().index(), edge.target().index());
        if membership[s] == membership[t] {
            *internal.entry(membership[s]).or_default() += 1.0;
        }
        *degree.entry(membership[s]).or_default() += 1.0;
        *degree.entry(membership[t]).or_default() += 1.0;
    }

    degree
        .iter()
        .map(|(c, &d)| {
            let l = internal.get(c).copied().unwrap_or(0.0);
            l / m - (d / (2.0 * m)).powi(2)
        })
        .sum()
}

/// Contiguous ids in order of first appearance.
fn renumber(membership: &[usize]) -> Vec<usize> {
    let mut ids = HashMap::new();
    membership
        .iter()
        .map(|&c| {
            let next = ids.len();
            *ids.entry(c).or_insert(next)
        })
        .collect()
}

fn greedy_modularity(graph: &UnGraph<String, u32>) -> Vec<usize> {
    let n = graph.node_count();
    let m = graph.edge_count() as f64;
    let mut community: Vec<usize> = (0..n).collect();
    if m == 0.0 {
        return community;
    }

    // e[i][j]: fraction of edge ends joining communities i and j.
    // a[i]: fraction of edge ends attached to community i.
    let mut e: BTreeMap<usize, BTreeMap<usize, f64>> = BTreeMap::new();
    let mut a = vec![0.0_f64; n];
    let half = 1.0 / (2.0 * m);
    for edge in graph.edge_references() {
        let (u, v) = (edge.source().index(), edge.target().index());
        *e.entry(u).or_default().entry(v).or_default() += half;
        *e.entry(v).or_default().entry(u).or_default() += half;
        a[u] += half;
        a[v] += half;
    }

    let mut q: f64 = -a.iter().map(|x| x * x).sum::<f64>();
    let mut best_q = q;
    let mut best = community.clone();

    loop {
        let mut candidate: Option<(usize, usize, f64)> = None;
        for (&i, row) in &e {
            for (&j, &eij) in row {
                if i >= j {
                    continue;
                }
                let gain = 2.0 * (eij - a[i] * a[j]);
                if candidate.is_none_or(|(_, _, g)| gain > g) {
                    candidate = Some((i, j, gain));
                }
            }
        }
        let Some((i, j, gain)) = candidate else {
            break;
        };

        // Fold community j into i.
        let row_j = e.remove(&j).unwrap_or_default();
        for (k, ejk) in row_j {
            if k == i {
                continue;
            }
            *e.entry(i).or_default().entry(k).or_default() += ejk;
            let row_k = e.entry(k).or_default();
            row_k.remove(&j);
            *row_k.entry(i).or_default() += ejk;
        }
        if let Some(row_i) = e.get_mut(&i) {
            row_i.remove(&j);
        }
        a[i] += a[j];
        a[j] = 0.0;
        for c in community.iter_mut().filter(|c| **c == j) {
            *c = i;
        }

        q += gain;
        debug!(merged = j, into = i, gain, q, "greedy merge");
        if q > best_q + GAIN_EPSILON {
            best_q = q;
            best = community.clone();
        }
    }
    best
}

fn girvan_newman(graph: &UnGraph<String, u32>) -> Vec<usize> {
    let n = graph.node_count();
    let m = graph.edge_count();
    if m == 0 {
        return (0..n).collect();
    }

    let mut working: StableUnGraph<(), ()> = StableUnGraph::from(graph.map(|_, _| (), |_, _| ()));
    let mut best = components(&working, n);
    let mut best_q = modularity(graph, &best);

    while working.edge_count() > 0 {
        let scores = edge_betweenness(&working, n, m);
        let Some(busiest) = working
            .edge_indices()
            .max_by(|x, y| {
                scores[x.index()]
                    .total_cmp(&scores[y.index()])
                    .then(y.index().cmp(&x.index()))
            })
        else {
            break;
        };
        working.remove_edge(busiest);

        let membership = components(&working, n);
        let q = modularity(graph, &membership);
        debug!(removed = busiest.index(), q, "removed edge");
        if q > best_q + GAIN_EPSILON {
            best_q = q;
            best = membership;
        }
    }
    best
}

fn components(graph: &StableUnGraph<(), ()>, n: usize) -> Vec<usize> {
    let mut sets = UnionFind::new(n);
    for edge in graph.edge_indices() {
        if let Some((a, b)) = graph.edge_endpoints(edge) {
            sets.union(a.index(), b.index());
        }
    }
    sets.into_labeling()
}

/// Brandes edge betweenness, one BFS per source, sources in parallel.
/// Indexed by edge index; removed edges score zero.
fn edge_betweenness(graph: &StableUnGraph<(), ()>, n: usize, edge_slots: usize) -> Vec<f64> {
    (0..n)
        .into_par_iter()
        .map(|s| edge_dependencies(graph, NodeIndex::new(s), n, edge_slots))
        .reduce(
            || vec![0.0; edge_slots],
            |mut total, partial| {
                for (t, p) in total.iter_mut().zip(partial) {
                    *t += p;
                }
                total
            },
        )
}

fn edge_dependencies(
    graph: &StableUnGraph<(), ()>,
    source: NodeIndex,
    n: usize,
    edge_slots: usize,
) -> Vec<f64> {
    let mut scores = vec![0.0; edge_slots];
    let mut order = Vec::with_capacity(n);
    let mut paths = vec![0.0_f64; n];
    let mut distance: Vec<Option<usize>> = vec![None; n];
    let mut predecessors: Vec<Vec<(NodeIndex, EdgeIndex)>> = vec![Vec::new(); n];
    let mut dependency = vec![0.0_f64; n];

    paths[source.index()] = 1.0;
    distance[source.index()] = Some(0);
    let mut queue = VecDeque::from([source]);

    while let Some(v) = queue.pop_front() {
        order.push(v);
        let dv = distance[v.index()].unwrap_or(0);
        for edge in graph.edges(v) {
            let w = if edge.source() == v { edge.target() } else { edge.source() };
            if distance[w.index()].is_none() {
                distance[w.index()] = Some(dv + 1);
                queue.push_back(w);
            }
            if distance[w.index()] == Some(dv + 1) {
                paths[w.index()] += paths[v.index()];
                predecessors[w.index()].push((v, edge.id()));
            }
        }
    }

    while let Some(w) = order.pop() {
        for &(v, edge) in &predecessors[w.index()] {
            let share = paths[v.index()] / paths[w.index()] * (1.0 + dependency[w.index()]);
            scores[edge.index()] += share;
            dependency[v.index()] += share;
        }
    }
    scores
}
