//! In-memory node store
//!
//! The store owns the ordered node list, an id index, and a reverse-edge index
//! so that both directions of every relationship can be walked without
//! rescanning the graph.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::node::{Node, RelationshipField};
use crate::error::{Error, Result};

/// Key holding the ordered node list in a graph document
pub const GRAPH_KEY: &str = "@graph";
/// Key holding the opaque vocabulary descriptor in a graph document
pub const CONTEXT_KEY: &str = "@context";

/// A relationship edge pointing at an id that is not in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DanglingReference {
    /// Node holding the reference
    pub node_id: String,
    /// Field the reference is stored in
    pub field: RelationshipField,
    /// Referenced id that does not exist
    pub dangling_target: String,
}

/// An ordered collection of nodes plus an opaque context
#[derive(Debug, Clone)]
pub struct Graph {
    context: Value,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    /// target id -> (source position, field), in source order
    incoming: HashMap<String, Vec<(usize, RelationshipField)>>,
}

impl Graph {
    /// Build a graph from already-parsed nodes
    pub fn new(context: Value, nodes: Vec<Node>) -> Self {
        let mut graph = Self {
            context,
            nodes,
            index: HashMap::new(),
            incoming: HashMap::new(),
        };
        graph.reindex();
        graph
    }

    /// An empty graph with an empty context
    pub fn empty() -> Self {
        Self::new(Value::Object(Map::new()), Vec::new())
    }

    /// Load a graph from a `{"@context": ..., "@graph": [...]}` document
    ///
    /// Fails with [`Error::MalformedDocument`] if the document is not an
    /// object, lacks either key, or contains a node without a string `@id`.
    /// No other validation is done here; see [`integrity_check`].
    pub fn load(document: Value) -> Result<Self> {
        let Value::Object(mut doc) = document else {
            return Err(Error::malformed("document must be a JSON object"));
        };
        let context = doc
            .remove(CONTEXT_KEY)
            .ok_or_else(|| Error::malformed("missing `@context`"))?;
        let raw_nodes = match doc.remove(GRAPH_KEY) {
            Some(Value::Array(nodes)) => nodes,
            Some(_) => return Err(Error::malformed("`@graph` must be an array")),
            None => return Err(Error::malformed("missing `@graph`")),
        };

        let mut nodes = Vec::with_capacity(raw_nodes.len());
        for (position, raw) in raw_nodes.into_iter().enumerate() {
            if !raw.is_object() {
                return Err(Error::malformed(format!(
                    "node at position {position} is not an object"
                )));
            }
            match raw.get("@id") {
                Some(Value::String(id)) if !id.is_empty() => {}
                _ => {
                    return Err(Error::malformed(format!(
                        "node at position {position} has no `@id`"
                    )));
                }
            }
            let node: Node = serde_json::from_value(raw).map_err(|e| {
                Error::malformed(format!("node at position {position} is invalid: {e}"))
            })?;
            nodes.push(node);
        }

        let graph = Self::new(context, nodes);
        info!(nodes = graph.len(), "Graph loaded");
        Ok(graph)
    }

    /// Read and load a graph document from disk
    pub async fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::malformed(format!("cannot read {}: {e}", path.display()))
        })?;
        let document: Value = serde_json::from_str(&contents).map_err(|e| {
            Error::malformed(format!("{} is not valid JSON: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Parsed graph document");
        Self::load(document)
    }

    /// Look up a node by id
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&position| &self.nodes[position])
    }

    /// Look up a node by id for mutation
    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Node> {
        let position = *self.index.get(id)?;
        self.nodes.get_mut(position)
    }

    /// Whether a node with this id exists
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All nodes in insertion order
    pub fn all(&self) -> &[Node] {
        &self.nodes
    }

    /// Mutable access to all nodes, for the feedback path
    ///
    /// The id and incoming-edge indexes are not rebuilt, so callers may change
    /// scalar fields but must not touch ids or relationship fields.
    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    /// Insertion position of a node
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The opaque vocabulary descriptor
    pub fn context(&self) -> &Value {
        &self.context
    }

    /// Nodes referencing `id`, with the field that references it
    pub fn incoming(&self, id: &str) -> impl Iterator<Item = (&Node, RelationshipField)> + '_ {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .map(|&(position, field)| (&self.nodes[position], field))
    }

    /// Serialize back into a `{"@context", "@graph"}` document
    pub fn to_document(&self) -> Result<Value> {
        let nodes = self
            .nodes
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut doc = Map::new();
        doc.insert(CONTEXT_KEY.to_string(), self.context.clone());
        doc.insert(GRAPH_KEY.to_string(), Value::Array(nodes));
        Ok(Value::Object(doc))
    }

    fn reindex(&mut self) {
        self.index.clear();
        self.incoming.clear();
        for (position, node) in self.nodes.iter().enumerate() {
            if self.index.contains_key(&node.id) {
                warn!(node_id = %node.id, "Duplicate node id; keeping first occurrence");
                continue;
            }
            self.index.insert(node.id.clone(), position);
        }
        for (position, node) in self.nodes.iter().enumerate() {
            for (field, target) in node.edges() {
                self.incoming
                    .entry(target.to_string())
                    .or_default()
                    .push((position, field));
            }
        }
    }
}

/// Report every relationship target that does not exist in the store
pub fn integrity_check(graph: &Graph) -> Vec<DanglingReference> {
    let findings: Vec<DanglingReference> = graph
        .all()
        .iter()
        .flat_map(|node| {
            node.edges()
                .filter(|(_, target)| !graph.contains(target))
                .map(|(field, target)| DanglingReference {
                    node_id: node.id.clone(),
                    field,
                    dangling_target: target.to_string(),
                })
        })
        .collect();

    if !findings.is_empty() {
        debug!(count = findings.len(), "Dangling references found");
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::Confidence;
    use serde_json::json;

    fn sample_document() -> Value {
        json!({
            "@context": {"@vocab": "https://example.org/test/"},
            "@graph": [
                {"@id": "want:test-1", "@type": "want", "urgency": 10, "emergedFrom": "discovery:test"},
                {"@id": "want:test-2", "@type": "want", "urgency": 5, "blockedBy": "discovery:blocker"},
                {"@id": "discovery:test", "@type": "discovery", "enables": ["want:test-1"]},
                {"@id": "discovery:blocker", "@type": "discovery"}
            ]
        })
    }

    #[test]
    fn test_load_preserves_order() {
        let graph = Graph::load(sample_document()).unwrap();
        let ids: Vec<&str> = graph.all().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["want:test-1", "want:test-2", "discovery:test", "discovery:blocker"]
        );
        assert_eq!(graph.position("discovery:test"), Some(2));
    }

    #[test]
    fn test_get_missing_is_none() {
        let graph = Graph::load(sample_document()).unwrap();
        assert!(graph.get("want:nope").is_none());
        assert_eq!(graph.get("want:test-2").unwrap().urgency, Some(5));
    }

    #[test]
    fn test_load_rejects_malformed_documents() {
        let cases = vec![
            json!([]),
            json!({"@graph": []}),
            json!({"@context": {}}),
            json!({"@context": {}, "@graph": {}}),
            json!({"@context": {}, "@graph": ["want:a"]}),
            json!({"@context": {}, "@graph": [{"@type": "want"}]}),
            json!({"@context": {}, "@graph": [{"@id": 42}]}),
        ];
        for case in cases {
            let err = Graph::load(case.clone()).unwrap_err();
            assert!(
                matches!(err, Error::MalformedDocument(_)),
                "expected malformed for {case}"
            );
        }
    }

    #[test]
    fn test_load_tolerates_odd_field_values() {
        let graph = Graph::load(json!({
            "@context": {},
            "@graph": [
                {"@id": "a", "urgency": 7.5},
                {"@id": "b", "urgency": "very", "confidence": "certain"},
                {"@id": "c", "@type": ["want", "goal"], "blockedBy": ["a", "b"]}
            ]
        }))
        .unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.get("a").unwrap().urgency, Some(8));
        let b = graph.get("b").unwrap();
        assert_eq!(b.urgency, None);
        assert_eq!(b.confidence, None);
        let c = graph.get("c").unwrap();
        assert_eq!(c.node_type, "want");
        assert_eq!(c.blocked_by.as_deref(), Some("a"));
    }

    #[test]
    fn test_empty_graph_loads() {
        let graph = Graph::load(json!({"@context": {}, "@graph": []})).unwrap();
        assert!(graph.is_empty());
        assert!(integrity_check(&graph).is_empty());
    }

    #[test]
    fn test_incoming_index() {
        let graph = Graph::load(sample_document()).unwrap();
        let incoming: Vec<(&str, RelationshipField)> = graph
            .incoming("want:test-1")
            .map(|(node, field)| (node.id.as_str(), field))
            .collect();
        assert_eq!(incoming, vec![("discovery:test", RelationshipField::Enables)]);
        assert_eq!(graph.incoming("discovery:blocker").count(), 1);
        assert_eq!(graph.incoming("want:test-2").count(), 0);
    }

    #[test]
    fn test_scalar_updates_keep_indexes() {
        let mut graph = Graph::load(sample_document()).unwrap();
        for node in graph.nodes_mut() {
            node.confidence = Some(Confidence::High);
            node.tested = Some(1);
        }

        assert_eq!(graph.position("discovery:test"), Some(2));
        assert_eq!(graph.get("want:test-2").unwrap().confidence, Some(Confidence::High));
        assert_eq!(graph.incoming("want:test-1").count(), 1);
    }

    #[test]
    fn test_integrity_check_reports_dangling() {
        let graph = Graph::load(json!({
            "@context": {},
            "@graph": [
                {"@id": "a", "relatedTo": ["b", "ghost"], "blockedBy": "phantom"},
                {"@id": "b"}
            ]
        }))
        .unwrap();

        let findings = integrity_check(&graph);
        assert_eq!(
            findings,
            vec![
                DanglingReference {
                    node_id: "a".into(),
                    field: RelationshipField::BlockedBy,
                    dangling_target: "phantom".into(),
                },
                DanglingReference {
                    node_id: "a".into(),
                    field: RelationshipField::RelatedTo,
                    dangling_target: "ghost".into(),
                },
            ]
        );
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let graph = Graph::load(json!({
            "@context": {},
            "@graph": [
                {"@id": "a", "description": "first"},
                {"@id": "a", "description": "second"}
            ]
        }))
        .unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get("a").unwrap().description.as_deref(), Some("first"));
    }

    #[test]
    fn test_to_document_round_trip() {
        let graph = Graph::load(sample_document()).unwrap();
        let doc = graph.to_document().unwrap();
        let again = Graph::load(doc).unwrap();
        assert_eq!(again.all(), graph.all());
        assert_eq!(again.context(), graph.context());
    }

    #[tokio::test]
    async fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wants.jsonld");
        tokio::fs::write(&path, sample_document().to_string())
            .await
            .unwrap();

        let graph = Graph::load_file(&path).await.unwrap();
        assert_eq!(graph.len(), 4);

        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(matches!(
            Graph::load_file(&path).await,
            Err(Error::MalformedDocument(_))
        ));
    }
}
