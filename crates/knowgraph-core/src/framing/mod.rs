//! Frame-based filtering of graph documents
//!
//! A frame is a JSON-LD style template: the framer returns the document
//! restricted to nodes matching it. [`ShapeFramer`] understands the subset
//! the engine and the named [`frames`] use:
//!
//! - `@type`: a string or list of accepted types
//! - `@id`: a string or list of accepted ids
//! - `"prop": {}` (or any nested frame object): the property must be present
//! - `"confidence": {"@value": tier}`: confidence at least `tier`
//!
//! Keyword keys such as `@context` and `@embed` are accepted and ignored.
//! A full JSON-LD processor can be substituted behind [`Framer`].

pub mod frames;

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::graph::{CONTEXT_KEY, Confidence, DEFAULT_NODE_TYPE, GRAPH_KEY};

/// Frame keywords the shape framer ignores
const IGNORED_KEYWORDS: &[&str] = &["@context", "@embed", "@explicit", "@omitDefault", "@requireAll"];

/// Filters a graph document by a frame
#[async_trait]
pub trait Framer: Send + Sync {
    /// Returns a document whose `@graph` holds the matching nodes
    async fn frame(&self, document: &Value, frame: &Value) -> Result<Value>;
}

/// Reference framer matching node shapes without JSON-LD expansion
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapeFramer;

impl ShapeFramer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Framer for ShapeFramer {
    async fn frame(&self, document: &Value, frame: &Value) -> Result<Value> {
        let Value::Object(frame) = frame else {
            return Err(Error::FramingFailed("frame must be a JSON object".to_string()));
        };
        let nodes = document
            .get(GRAPH_KEY)
            .and_then(Value::as_array)
            .ok_or_else(|| Error::FramingFailed("document has no `@graph` array".to_string()))?;

        let mut matched = Vec::new();
        for node in nodes {
            if node_matches(node, frame)? {
                matched.push(node.clone());
            }
        }
        debug!(total = nodes.len(), matched = matched.len(), "Document framed");

        let mut out = Map::new();
        out.insert(
            CONTEXT_KEY.to_string(),
            document.get(CONTEXT_KEY).cloned().unwrap_or(Value::Object(Map::new())),
        );
        out.insert(GRAPH_KEY.to_string(), Value::Array(matched));
        Ok(Value::Object(out))
    }
}

fn node_matches(node: &Value, frame: &Map<String, Value>) -> Result<bool> {
    for (key, constraint) in frame {
        if IGNORED_KEYWORDS.contains(&key.as_str()) {
            continue;
        }
        let satisfied = match key.as_str() {
            "@type" => string_constraint(node.get("@type"), constraint, "@type")?,
            "@id" => string_constraint(node.get("@id"), constraint, "@id")?,
            _ => property_constraint(node.get(key), key, constraint)?,
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

/// `@type` / `@id` match: one accepted string or any of a list; an empty list accepts all
fn string_constraint(actual: Option<&Value>, constraint: &Value, key: &str) -> Result<bool> {
    let accepted: Vec<&str> = match constraint {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| Error::FramingFailed(format!("`{key}` list must hold strings")))
            })
            .collect::<Result<_>>()?,
        _ => {
            return Err(Error::FramingFailed(format!(
                "`{key}` must be a string or a list of strings"
            )));
        }
    };
    if accepted.is_empty() {
        return Ok(true);
    }

    // nodes without @type are "thing"
    let actuals: Vec<&str> = match actual {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        None if key == "@type" => vec![DEFAULT_NODE_TYPE],
        _ => Vec::new(),
    };
    Ok(actuals.iter().any(|a| accepted.contains(a)))
}

fn property_constraint(actual: Option<&Value>, key: &str, constraint: &Value) -> Result<bool> {
    let Value::Object(shape) = constraint else {
        return Err(Error::FramingFailed(format!(
            "unsupported frame value for `{key}`: expected an object"
        )));
    };

    match shape.get("@value") {
        None => Ok(is_present(actual)),
        Some(wanted) if key == "confidence" => {
            let floor = wanted
                .as_str()
                .and_then(Confidence::parse)
                .ok_or_else(|| Error::FramingFailed(format!("unknown confidence tier: {wanted}")))?;
            let tier = actual
                .and_then(Value::as_str)
                .and_then(Confidence::parse)
                .unwrap_or(Confidence::Low);
            Ok(tier >= floor)
        }
        Some(wanted) => Ok(actual == Some(wanted)),
    }
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

/// Run a framer under a deadline
pub async fn frame_with_timeout(
    framer: &dyn Framer,
    document: &Value,
    frame: &Value,
    timeout: Duration,
) -> Result<Value> {
    match tokio::time::timeout(timeout, framer.frame(document, frame)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Framing timed out");
            Err(Error::FramingTimeout(timeout.as_millis() as u64))
        }
    }
}

/// Ids in a framed document's `@graph`
pub fn framed_ids(framed: &Value) -> Result<HashSet<String>> {
    let nodes = framed
        .get(GRAPH_KEY)
        .and_then(Value::as_array)
        .ok_or_else(|| Error::FramingFailed("framed output has no `@graph` array".to_string()))?;
    Ok(nodes
        .iter()
        .filter_map(|node| node.get("@id").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

/// Frame restricting types and a minimum confidence; `None` when unconstrained
pub fn constraint_frame(types: &[String], min_confidence: Option<Confidence>, context: &Value) -> Option<Value> {
    if types.is_empty() && min_confidence.is_none() {
        return None;
    }
    let mut frame = Map::new();
    frame.insert(CONTEXT_KEY.to_string(), context.clone());
    if !types.is_empty() {
        frame.insert("@type".to_string(), Value::from(types.to_vec()));
    }
    if let Some(tier) = min_confidence {
        let mut value = Map::new();
        value.insert("@value".to_string(), Value::from(tier.as_str()));
        frame.insert("confidence".to_string(), Value::Object(value));
    }
    Some(Value::Object(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "@context": {"@vocab": "https://example.org/test/"},
            "@graph": [
                {"@id": "want:a", "@type": "want", "urgency": 9, "confidence": "high", "blockedBy": "discovery:x"},
                {"@id": "want:b", "@type": "want", "confidence": "medium", "enables": []},
                {"@id": "discovery:x", "@type": "discovery"},
                {"@id": "emotion:calm", "@type": "emotion", "confidence": "low"},
                {"@id": "plain"}
            ]
        })
    }

    async fn ids(frame: Value) -> Vec<String> {
        let framed = ShapeFramer.frame(&document(), &frame).await.unwrap();
        framed["@graph"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["@id"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_type_constraints() {
        assert_eq!(ids(json!({"@type": "want"})).await, vec!["want:a", "want:b"]);
        assert_eq!(
            ids(json!({"@type": ["emotion", "discovery"]})).await,
            vec!["discovery:x", "emotion:calm"]
        );
        assert_eq!(ids(json!({"@type": "thing"})).await, vec!["plain"]);
        assert_eq!(ids(json!({"@type": []})).await.len(), 5);
    }

    #[tokio::test]
    async fn test_presence_and_id_constraints() {
        assert_eq!(ids(json!({"urgency": {}})).await, vec!["want:a"]);
        // empty lists count as absent
        assert!(ids(json!({"enables": {}})).await.is_empty());
        assert_eq!(ids(frames::node_with_relations("want:b")).await, vec!["want:b"]);
        assert_eq!(ids(json!({"@id": ["plain", "want:a"]})).await, vec!["want:a", "plain"]);
    }

    #[tokio::test]
    async fn test_confidence_floor() {
        let frame = json!({"confidence": {"@value": "medium"}});
        assert_eq!(ids(frame).await, vec!["want:a", "want:b"]);
        let frame = json!({"confidence": {"@value": "low"}});
        assert_eq!(ids(frame).await.len(), 5);
    }

    #[tokio::test]
    async fn test_named_frames() {
        assert_eq!(ids(frames::all_wants()).await, vec!["want:a", "want:b"]);
        assert_eq!(ids(frames::urgent_wants()).await, vec!["want:a"]);
        assert_eq!(ids(frames::blocked_wants()).await, vec!["want:a"]);
        assert!(ids(frames::emergence_chain()).await.is_empty());
    }

    #[tokio::test]
    async fn test_output_keeps_context() {
        let framed = ShapeFramer.frame(&document(), &json!({"@type": "want"})).await.unwrap();
        assert_eq!(framed["@context"], document()["@context"]);
        assert_eq!(framed_ids(&framed).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_frames_fail() {
        let doc = document();
        for frame in [
            json!("want"),
            json!({"@type": 3}),
            json!({"urgency": 9}),
            json!({"confidence": {"@value": "certain"}}),
        ] {
            let err = ShapeFramer.frame(&doc, &frame).await.unwrap_err();
            assert!(matches!(err, Error::FramingFailed(_)), "{frame}");
        }
        assert!(ShapeFramer.frame(&json!({}), &json!({})).await.is_err());
    }

    struct StallingFramer;

    #[async_trait]
    impl Framer for StallingFramer {
        async fn frame(&self, _document: &Value, _frame: &Value) -> Result<Value> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let err = frame_with_timeout(&StallingFramer, &document(), &json!({}), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FramingTimeout(50)));
    }

    #[test]
    fn test_constraint_frame() {
        let context = json!({});
        assert!(constraint_frame(&[], None, &context).is_none());

        let frame = constraint_frame(&["want".to_string()], Some(Confidence::Medium), &context).unwrap();
        assert_eq!(frame["@type"], json!(["want"]));
        assert_eq!(frame["confidence"], json!({"@value": "medium"}));
    }
}
