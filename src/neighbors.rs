//! Nearest-lexical-neighbor graph over account handles.
//!
//! Each handle keeps only the edge(s) to the handle(s) closest to it by
//! edit distance. Ties keep every minimal edge. A pair that is mutually
//! nearest is emitted once from each endpoint's search, so it shows up as
//! both `a -> b` and `b -> a`; [`NearestNeighborGraph::unique_edges`] gives
//! the collapsed view.

use crate::distance::DistanceMatrix;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DistanceEdge {
    pub from: String,
    pub to: String,
    pub distance: u32,
}

impl DistanceEdge {
    /// Endpoints in lexical order, for comparing edges regardless of direction.
    pub fn unordered(&self) -> (&str, &str) {
        if self.from <= self.to {
            (self.from.as_str(), self.to.as_str())
        } else {
            (self.to.as_str(), self.from.as_str())
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NearestNeighborGraph {
    nodes: Vec<String>,
    edges: Vec<DistanceEdge>,
}

impl NearestNeighborGraph {
    /// Builds the graph from a set of handles. Repeated handles are
    /// collapsed, keeping first-seen order.
    pub fn build<I, S>(handles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let nodes: Vec<String> = handles
            .into_iter()
            .map(Into::into)
            .filter(|h: &String| seen.insert(h.clone()))
            .collect();

        let matrix = DistanceMatrix::compute(&nodes);
        let edges: Vec<DistanceEdge> = (0..matrix.len())
            .into_par_iter()
            .flat_map_iter(|i| nearest_edges(&matrix, i))
            .collect();

        debug!(nodes = nodes.len(), edges = edges.len(), "built nearest-neighbor graph");
        NearestNeighborGraph { nodes, edges }
    }

    /// Wraps an edge list produced elsewhere. Endpoints missing from
    /// `nodes` are appended.
    pub fn from_parts(mut nodes: Vec<String>, edges: Vec<DistanceEdge>) -> Self {
        let mut known: HashSet<String> = nodes.iter().cloned().collect();
        for edge in &edges {
            for end in [&edge.from, &edge.to] {
                if known.insert(end.clone()) {
                    nodes.push(end.clone());
                }
            }
        }
        NearestNeighborGraph { nodes, edges }
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Edges as emitted, including the mirrored duplicates.
    pub fn edges(&self) -> &[DistanceEdge] {
        &self.edges
    }

    /// One edge per unordered pair, in first-emitted order.
    pub fn unique_edges(&self) -> Vec<DistanceEdge> {
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .filter(|e| seen.insert(e.unordered()))
            .cloned()
            .collect()
    }

    /// Same graph with the mirrored duplicates removed.
    pub fn deduplicated(&self) -> Self {
        NearestNeighborGraph {
            nodes: self.nodes.clone(),
            edges: self.unique_edges(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Edges from `i` to every other handle at its minimum distance.
fn nearest_edges(matrix: &DistanceMatrix, i: usize) -> Vec<DistanceEdge> {
    let row = matrix.row(i);
    let Some(min) = row
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != i)
        .map(|(_, &d)| d)
        .min()
    else {
        return Vec::new();
    };

    let labels = matrix.labels();
    row.iter()
        .enumerate()
        .filter(|&(j, &d)| j != i && d <= min)
        .map(|(j, &d)| DistanceEdge {
            from: labels[i].clone(),
            to: labels[j].clone(),
            distance: d,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn edge(from: &str, to: &str, distance: u32) -> DistanceEdge {
        DistanceEdge {
            from: from.to_string(),
            to: to.to_string(),
            distance,
        }
    }

    #[test]
    fn ties_keep_every_minimal_edge() {
        let graph = NearestNeighborGraph::build(["abc123", "abd123", "xyz999"]);
        assert_eq!(graph.nodes(), &["abc123", "abd123", "xyz999"]);
        assert_eq!(
            graph.edges(),
            &[
                edge("abc123", "abd123", 1),
                edge("abd123", "abc123", 1),
                edge("xyz999", "abc123", 6),
                edge("xyz999", "abd123", 6),
            ]
        );
    }

    #[test]
    fn mirrored_pairs_collapse_in_unique_view() {
        let graph = NearestNeighborGraph::build(["abc123", "abd123", "xyz999"]);
        let unique = graph.unique_edges();
        assert_eq!(
            unique,
            vec![
                edge("abc123", "abd123", 1),
                edge("xyz999", "abc123", 6),
                edge("xyz999", "abd123", 6),
            ]
        );
        assert_eq!(graph.deduplicated().edges().len(), 3);
    }

    #[test]
    fn singleton_has_no_edges() {
        let graph = NearestNeighborGraph::build(["lonely"]);
        assert_eq!(graph.nodes().len(), 1);
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn empty_input_gives_empty_graph() {
        let graph = NearestNeighborGraph::build(Vec::<String>::new());
        assert!(graph.is_empty());
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn repeated_handles_collapse() {
        let graph = NearestNeighborGraph::build(["bot1", "bot1", "bot2"]);
        assert_eq!(graph.nodes().len(), 2);
        assert!(graph.edges().iter().all(|e| e.from != e.to));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn every_handle_has_a_nearest_edge(
            handles in proptest::collection::hash_set("[a-d]{1,5}", 2..12),
        ) {
            let graph = NearestNeighborGraph::build(handles.iter().cloned());
            for handle in graph.nodes() {
                prop_assert!(graph.edges().iter().any(|e| &e.from == handle));
            }
            prop_assert!(graph.edges().iter().all(|e| e.from != e.to));
        }

        #[test]
        fn emitted_edges_are_minimal(
            handles in proptest::collection::hash_set("[a-d]{1,5}", 2..12),
        ) {
            let graph = NearestNeighborGraph::build(handles.iter().cloned());
            for e in graph.edges() {
                let best = graph
                    .nodes()
                    .iter()
                    .filter(|other| *other != &e.from)
                    .map(|other| crate::distance::levenshtein(&e.from, other))
                    .min()
                    .unwrap();
                prop_assert_eq!(e.distance, best);
            }
        }
    }
}
