//! Bounded breadth-first expansion over relationship edges
//!
//! Edges are walked in both directions: a node that `enables` another is as
//! much context for it as the reverse. Each id is expanded at most once, so
//! cyclic relationship graphs terminate.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use super::node::RelationshipField;
use super::store::Graph;

/// Which relationship fields a traversal may follow
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EdgeFilter {
    /// Follow all seven relationship fields
    #[default]
    All,
    /// Follow only these fields (in both directions)
    Only(BTreeSet<RelationshipField>),
}

impl EdgeFilter {
    /// Build a filter from requested fields; an empty request means all fields
    pub fn from_fields<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = RelationshipField>,
    {
        let set: BTreeSet<RelationshipField> = fields.into_iter().collect();
        if set.is_empty() {
            Self::All
        } else {
            Self::Only(set)
        }
    }

    /// Whether a field may be traversed
    pub fn allows(&self, field: RelationshipField) -> bool {
        match self {
            Self::All => true,
            Self::Only(set) => set.contains(&field),
        }
    }
}

/// Result of an expansion
#[derive(Debug, Clone, Default)]
pub struct TraversalResult {
    /// Reached ids in discovery order (seeds first)
    pub ids: Vec<String>,
    /// Hop distance from the nearest seed
    pub distances: HashMap<String, usize>,
    /// Hops actually taken
    pub hops_taken: usize,
    /// Whether the frontier emptied before the hop budget ran out
    pub fixed_point: bool,
}

impl TraversalResult {
    pub fn contains(&self, id: &str) -> bool {
        self.distances.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Hop distance of an id, if reached
    pub fn distance(&self, id: &str) -> Option<usize> {
        self.distances.get(id).copied()
    }

    pub fn into_set(self) -> HashSet<String> {
        self.ids.into_iter().collect()
    }
}

/// Neighbours of one id: forward targets then reverse referrers
pub fn neighbors(graph: &Graph, id: &str, filter: &EdgeFilter) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    if let Some(node) = graph.get(id) {
        for (field, target) in node.edges() {
            if filter.allows(field) && !out.iter().any(|seen| seen == target) {
                out.push(target.to_string());
            }
        }
    }
    for (source, field) in graph.incoming(id) {
        if filter.allows(field) && !out.iter().any(|seen| *seen == source.id) {
            out.push(source.id.clone());
        }
    }
    out
}

/// Expand `seeds` outward by up to `max_hops` hops
///
/// `max_hops == 0` returns the seeds unchanged. Seeds missing from the store
/// stay in the result but have no neighbours of their own.
pub fn expand<I, S>(graph: &Graph, seeds: I, max_hops: usize, filter: &EdgeFilter) -> TraversalResult
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut result = TraversalResult::default();
    let mut frontier: Vec<String> = Vec::new();

    for seed in seeds {
        let seed = seed.into();
        if !result.distances.contains_key(&seed) {
            result.distances.insert(seed.clone(), 0);
            result.ids.push(seed.clone());
            frontier.push(seed);
        }
    }

    while result.hops_taken < max_hops && !frontier.is_empty() {
        let hop = result.hops_taken + 1;
        let mut next = Vec::new();

        for id in &frontier {
            for neighbor in neighbors(graph, id, filter) {
                if !result.distances.contains_key(&neighbor) {
                    result.distances.insert(neighbor.clone(), hop);
                    result.ids.push(neighbor.clone());
                    next.push(neighbor);
                }
            }
        }

        result.hops_taken = hop;
        frontier = next;
    }
    result.fixed_point = frontier.is_empty();

    debug!(
        reached = result.ids.len(),
        hops = result.hops_taken,
        fixed_point = result.fixed_point,
        "Expansion completed"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use serde_json::json;

    fn chain_graph() -> Graph {
        // a -> b -> c -> d (emergedFrom), e blocks d
        Graph::new(
            json!({}),
            vec![
                Node::new("a", "want").with_edge(RelationshipField::EmergedFrom, "b"),
                Node::new("b", "discovery").with_edge(RelationshipField::EmergedFrom, "c"),
                Node::new("c", "discovery").with_edge(RelationshipField::EmergedFrom, "d"),
                Node::new("d", "discovery"),
                Node::new("e", "want").with_edge(RelationshipField::BlockedBy, "d"),
                Node::new("lonely", "want"),
            ],
        )
    }

    fn cyclic_graph() -> Graph {
        Graph::new(
            json!({}),
            vec![
                Node::new("x", "want").with_edge(RelationshipField::BlockedBy, "y"),
                Node::new("y", "want").with_edge(RelationshipField::BlockedBy, "z"),
                Node::new("z", "want").with_edge(RelationshipField::BlockedBy, "x"),
            ],
        )
    }

    #[test]
    fn test_zero_hops_returns_seeds() {
        let graph = chain_graph();
        let result = expand(&graph, ["a", "lonely"], 0, &EdgeFilter::All);
        assert_eq!(result.ids, vec!["a", "lonely"]);
        assert_eq!(result.hops_taken, 0);
    }

    #[test]
    fn test_forward_and_reverse_edges() {
        let graph = chain_graph();
        let result = expand(&graph, ["d"], 1, &EdgeFilter::All);
        // c and e both point at d
        assert_eq!(result.ids, vec!["d", "c", "e"]);
        assert_eq!(result.distance("e"), Some(1));
    }

    #[test]
    fn test_hop_budget() {
        let graph = chain_graph();
        let two = expand(&graph, ["a"], 2, &EdgeFilter::All);
        assert_eq!(two.ids, vec!["a", "b", "c"]);
        assert!(!two.fixed_point);

        let all = expand(&graph, ["a"], 10, &EdgeFilter::All);
        assert_eq!(all.ids, vec!["a", "b", "c", "d", "e"]);
        assert!(all.fixed_point);
        assert!(all.hops_taken < 10);
    }

    #[test]
    fn test_monotonic_in_hops() {
        let graph = chain_graph();
        for hops in 0..6 {
            let smaller = expand(&graph, ["b"], hops, &EdgeFilter::All).into_set();
            let larger = expand(&graph, ["b"], hops + 1, &EdgeFilter::All).into_set();
            assert!(smaller.is_subset(&larger), "hops {hops}");
        }
    }

    #[test]
    fn test_cycles_terminate_and_visit_once() {
        let graph = cyclic_graph();
        let result = expand(&graph, ["x"], 1_000, &EdgeFilter::All);
        assert_eq!(result.len(), 3);
        let unique: HashSet<&String> = result.ids.iter().collect();
        assert_eq!(unique.len(), result.ids.len());
        assert!(result.fixed_point);
    }

    #[test]
    fn test_edge_filter_applies_both_directions() {
        let graph = chain_graph();
        let filter = EdgeFilter::from_fields([RelationshipField::BlockedBy]);

        let from_d = expand(&graph, ["d"], 3, &filter);
        assert_eq!(from_d.ids, vec!["d", "e"]);

        let from_a = expand(&graph, ["a"], 3, &filter);
        assert_eq!(from_a.ids, vec!["a"]);
    }

    #[test]
    fn test_unknown_seed_is_kept_without_neighbors() {
        let graph = chain_graph();
        let result = expand(&graph, ["ghost"], 3, &EdgeFilter::All);
        assert_eq!(result.ids, vec!["ghost"]);
        assert!(result.fixed_point);
    }

    #[test]
    fn test_empty_graph() {
        let graph = Graph::empty();
        let result = expand(&graph, Vec::<String>::new(), 3, &EdgeFilter::All);
        assert!(result.is_empty());
    }

    #[test]
    fn test_empty_filter_means_all() {
        assert_eq!(
            EdgeFilter::from_fields(Vec::<RelationshipField>::new()),
            EdgeFilter::All
        );
    }
}
