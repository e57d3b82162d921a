//! Request and response types for the query engine

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::{Confidence, Node};
use crate::scoring::SuggestedConnection;

/// Optional restrictions on a query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Constraints {
    /// Only nodes of these types
    pub types: Vec<String>,
    /// Only nodes at or above this tier
    pub min_confidence: Option<Confidence>,
    /// Traversal depth; the configured default when unset
    pub max_hops: Option<usize>,
    /// `Some(false)` ignores emotional markers in the question
    pub include_emotional: Option<bool>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A natural-language question plus limits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticQuery {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
}

impl SemanticQuery {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    /// Cap the number of returned nodes
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = Some(constraints);
        self
    }
}

/// A returned node with its score and explanation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedNode {
    pub node: Node,
    pub score: u32,
    pub reasons: Vec<String>,
}

/// Ranked answer to a [`SemanticQuery`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub nodes: Vec<RankedNode>,
    /// Aggregate confidence in `[0, 1]`
    pub confidence: f64,
    pub reasoning: String,
    pub suggested_connections: Vec<SuggestedConnection>,
}

impl QueryResult {
    /// Result ids in rank order
    pub fn ids(&self) -> Vec<String> {
        self.nodes.iter().map(|ranked| ranked.node.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Summary of what the graph holds and how it has been used
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntrospectionReport {
    pub node_count: usize,
    pub type_counts: BTreeMap<String, usize>,
    /// Edge count per relationship field, fields with no edges omitted
    pub relationship_counts: BTreeMap<String, usize>,
    pub dangling_references: usize,
    pub history_len: usize,
    pub pattern_count: usize,
    /// Most frequent normalized queries with their counts
    pub top_queries: Vec<(String, usize)>,
    pub pending_writes: usize,
}
