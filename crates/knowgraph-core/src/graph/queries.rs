//! Convenience queries over the node store

use serde::Serialize;

use super::node::{Node, RelationshipField};
use super::store::Graph;
use super::traversal::{EdgeFilter, neighbors};

/// Type tag of goal nodes
pub const WANT_TYPE: &str = "want";

/// Default urgency threshold for [`get_urgent_wants`]
pub const DEFAULT_MIN_URGENCY: u8 = 8;

/// Default depth for [`trace_lineage`]
pub const DEFAULT_LINEAGE_DEPTH: usize = 3;

/// Nodes of `node_type` that carry every property in `required`
pub fn frame_query<'g>(graph: &'g Graph, node_type: &str, required: &[&str]) -> Vec<&'g Node> {
    graph
        .all()
        .iter()
        .filter(|node| node.node_type == node_type)
        .filter(|node| required.iter().all(|property| node.has_property(property)))
        .collect()
}

/// Wants whose urgency is at least `min_urgency`
pub fn get_urgent_wants(graph: &Graph, min_urgency: u8) -> Vec<&Node> {
    frame_query(graph, WANT_TYPE, &[])
        .into_iter()
        .filter(|want| want.urgency.unwrap_or(0) >= min_urgency)
        .collect()
}

/// Wants that declare a blocker
pub fn get_blocked_wants(graph: &Graph) -> Vec<&Node> {
    frame_query(graph, WANT_TYPE, &[RelationshipField::BlockedBy.as_str()])
}

/// Nodes explicitly recorded as never tested
pub fn get_untested_ideas(graph: &Graph) -> Vec<&Node> {
    graph
        .all()
        .iter()
        .filter(|node| node.tested == Some(0))
        .collect()
}

/// Ids one hop away from `node_id` in either direction, across all fields
///
/// Returns an empty list when the node does not exist.
pub fn get_related_nodes(graph: &Graph, node_id: &str) -> Vec<String> {
    if !graph.contains(node_id) {
        return Vec::new();
    }
    neighbors(graph, node_id, &EdgeFilter::All)
}

/// Emergence lineage of a node, following `emergedFrom`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lineage {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "emergedFrom", skip_serializing_if = "Option::is_none")]
    pub emerged_from: Option<Box<Lineage>>,
}

impl Lineage {
    /// Number of links in the chain, including this one
    pub fn chain_len(&self) -> usize {
        1 + self.emerged_from.as_ref().map_or(0, |parent| parent.chain_len())
    }
}

/// Trace where a node emerged from, up to `depth` levels
///
/// At depth 0, or for an unknown id, only the `@id` is reported.
pub fn trace_lineage(graph: &Graph, node_id: &str, depth: usize) -> Lineage {
    let bare = Lineage {
        id: node_id.to_string(),
        node_type: None,
        description: None,
        emerged_from: None,
    };
    if depth == 0 {
        return bare;
    }
    let Some(node) = graph.get(node_id) else {
        return bare;
    };

    Lineage {
        id: node.id.clone(),
        node_type: Some(node.node_type.clone()),
        description: node.description.clone(),
        emerged_from: node
            .emerged_from
            .as_deref()
            .map(|parent| Box::new(trace_lineage(graph, parent, depth - 1))),
    }
}
