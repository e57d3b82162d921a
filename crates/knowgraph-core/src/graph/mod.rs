//! Knowledge graph: nodes, the node store, traversal, and graph-level queries
//!
//! This module provides:
//! - [`Node`] and the fixed [`RelationshipField`] vocabulary
//! - [`Graph`], the in-memory node store with a reverse-edge index
//! - [`expand`], bounded breadth-first expansion over relationship edges
//! - Convenience queries (urgent wants, blockers, lineage, ...)
//! - Structural and usage insights

pub mod insights;
mod node;
mod queries;
mod store;
mod traversal;

pub use insights::{
    Insight, InsightKind, discover_insights, find_contradictions, find_knowledge_gaps, find_redundancies,
    find_usage_patterns,
};
pub use node::{Confidence, DEFAULT_NODE_TYPE, EMOTION_NODE_TYPE, Node, RelationshipField};
pub use queries::{
    DEFAULT_LINEAGE_DEPTH, DEFAULT_MIN_URGENCY, Lineage, WANT_TYPE, frame_query, get_blocked_wants,
    get_related_nodes, get_untested_ideas, get_urgent_wants, trace_lineage,
};
pub use store::{CONTEXT_KEY, DanglingReference, GRAPH_KEY, Graph, integrity_check};
pub use traversal::{EdgeFilter, TraversalResult, expand, neighbors};
