//! Intent extraction: free-text question to structured [`Intent`]
//!
//! Extraction is a strategy behind [`IntentExtractor`]. The bundled
//! [`PhraseTableExtractor`] is a keyword heuristic; anything smarter can be
//! plugged into the engine builder instead.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::graph::{Graph, RelationshipField};
use crate::text::{contains_phrase, tokenize};

/// Time frame a question is about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Temporal {
    Current,
    Past,
    Future,
    #[default]
    Any,
}

impl Temporal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Past => "past",
            Self::Future => "future",
            Self::Any => "any",
        }
    }
}

/// What a question is asking for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub question: String,
    /// Ids of nodes the question mentions, in store order
    pub concepts: Vec<String>,
    /// Relationship fields the question asks about, without duplicates
    pub relationships: Vec<RelationshipField>,
    pub temporal: Temporal,
    /// Count of distinct emotional markers
    pub emotional_weight: u32,
}

impl Intent {
    /// An intent that carries only the question text
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn mentions(&self, id: &str) -> bool {
        self.concepts.iter().any(|c| c == id)
    }

    pub fn is_emotional(&self) -> bool {
        self.emotional_weight > 0
    }
}

/// Turns a question into an [`Intent`] against a particular graph
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    async fn extract(&self, question: &str, graph: &Graph) -> Intent;
}

/// Keyword heuristic driven by fixed phrase tables
#[derive(Debug, Clone)]
pub struct PhraseTableExtractor {
    temporal: Vec<(Temporal, Vec<&'static str>)>,
    relationships: Vec<(&'static str, RelationshipField)>,
    emotional_markers: Vec<&'static str>,
}

impl Default for PhraseTableExtractor {
    fn default() -> Self {
        use RelationshipField::*;

        Self {
            temporal: vec![
                (Temporal::Current, vec!["current", "now", "working on", "active", "in progress"]),
                (Temporal::Past, vec!["previously", "used to", "originally", "in the past"]),
                (Temporal::Future, vec!["next", "plan to", "upcoming", "in the future"]),
            ],
            relationships: vec![
                ("blocked", BlockedBy),
                ("stuck", BlockedBy),
                ("depends on", BlockedBy),
                ("blocker", BlockedBy),
                ("enables", Enables),
                ("allows", Enables),
                ("unlocks", Enables),
                ("came from", EmergedFrom),
                ("originated", EmergedFrom),
                ("what led to", EmergedFrom),
                ("emerged", EmergedFrom),
                ("related", RelatedTo),
                ("connected", RelatedTo),
                ("similar", RelatedTo),
                ("discovered", DiscoveredBy),
                ("who found", DiscoveredBy),
                ("triggered", TriggeredBy),
                ("caused by", TriggeredBy),
                ("resulted in", ResultedIn),
                ("outcome", ResultedIn),
            ],
            emotional_markers: vec!["urgent", "important", "critical", "worried", "excited", "frustrated"],
        }
    }
}

impl PhraseTableExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    fn temporal(&self, lowered: &str) -> Temporal {
        self.temporal
            .iter()
            .find(|(_, phrases)| phrases.iter().any(|p| contains_phrase(lowered, p)))
            .map(|(temporal, _)| *temporal)
            .unwrap_or_default()
    }

    fn relationships(&self, lowered: &str) -> Vec<RelationshipField> {
        let mut found = Vec::new();
        for (phrase, field) in &self.relationships {
            if contains_phrase(lowered, phrase) && !found.contains(field) {
                found.push(*field);
            }
        }
        found
    }

    fn emotional_weight(&self, lowered: &str) -> u32 {
        self.emotional_markers
            .iter()
            .filter(|marker| contains_phrase(lowered, marker))
            .count() as u32
    }
}

/// Nodes the question names: enough shared tokens with `{id} {description}`
///
/// A node with three or fewer tokens of its own needs one shared token;
/// anything longer needs two.
pub fn mentioned_nodes(question: &str, graph: &Graph) -> Vec<String> {
    let question_tokens = tokenize(question);
    if question_tokens.is_empty() {
        return Vec::new();
    }

    graph
        .all()
        .iter()
        .filter(|node| {
            let node_tokens = tokenize(&node.match_text());
            let shared = node_tokens.intersection(&question_tokens).count();
            let needed = if node_tokens.len() <= 3 { 1 } else { 2 };
            shared >= needed
        })
        .map(|node| node.id.clone())
        .collect()
}

#[async_trait]
impl IntentExtractor for PhraseTableExtractor {
    async fn extract(&self, question: &str, graph: &Graph) -> Intent {
        let lowered = question.to_lowercase();
        let intent = Intent {
            question: question.to_string(),
            concepts: mentioned_nodes(question, graph),
            relationships: self.relationships(&lowered),
            temporal: self.temporal(&lowered),
            emotional_weight: self.emotional_weight(&lowered),
        };

        debug!(
            concepts = intent.concepts.len(),
            relationships = ?intent.relationships,
            temporal = intent.temporal.as_str(),
            emotional_weight = intent.emotional_weight,
            "Intent extracted"
        );
        intent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph() -> Graph {
        Graph::load(json!({
            "@context": {},
            "@graph": [
                {"@id": "want:ship-auth", "@type": "want", "description": "Ship the new authentication flow to production"},
                {"@id": "discovery:token-refresh", "@type": "discovery", "description": "Token refresh races on slow networks"},
                {"@id": "emotion:dread", "@type": "emotion"}
            ]
        }))
        .unwrap()
    }

    async fn extract(question: &str) -> Intent {
        PhraseTableExtractor::new().extract(question, &graph()).await
    }

    #[tokio::test]
    async fn test_temporal_tables() {
        assert_eq!(extract("What am I working on?").await.temporal, Temporal::Current);
        assert_eq!(extract("What did I previously try?").await.temporal, Temporal::Past);
        assert_eq!(extract("What should I do next?").await.temporal, Temporal::Future);
        assert_eq!(extract("Tell me about auth").await.temporal, Temporal::Any);
        // "know" must not match "now"
        assert_eq!(extract("What do I know?").await.temporal, Temporal::Any);
        // current wins over future
        assert_eq!(extract("What's next now?").await.temporal, Temporal::Current);
    }

    #[tokio::test]
    async fn test_relationship_phrases() {
        let intent = extract("What is blocked, and what is the blocker stuck on?").await;
        assert_eq!(intent.relationships, vec![RelationshipField::BlockedBy]);

        let intent = extract("What led to this and what does it enables?").await;
        assert_eq!(
            intent.relationships,
            vec![RelationshipField::Enables, RelationshipField::EmergedFrom]
        );

        assert!(extract("hello").await.relationships.is_empty());
    }

    #[tokio::test]
    async fn test_emotional_weight_counts_distinct_markers() {
        let intent = extract("Urgent! This is urgent and critical, I'm worried").await;
        assert_eq!(intent.emotional_weight, 3);
        assert!(intent.is_emotional());
        assert_eq!(extract("list wants").await.emotional_weight, 0);
    }

    #[tokio::test]
    async fn test_concept_mentions() {
        let intent = extract("How is the authentication flow going?").await;
        assert_eq!(intent.concepts, vec!["want:ship-auth"]);

        // short node: one shared token is enough
        let intent = extract("Why the dread?").await;
        assert_eq!(intent.concepts, vec!["emotion:dread"]);

        // long node: one shared token is not
        let intent = extract("Any news on production?").await;
        assert!(intent.concepts.is_empty());

        let intent = extract("Any news on production authentication?").await;
        assert!(intent.mentions("want:ship-auth"));
    }

    #[tokio::test]
    async fn test_question_is_kept() {
        let intent = extract("What now?").await;
        assert_eq!(intent.question, "What now?");
        assert!(extract("").await.concepts.is_empty());
    }
}
