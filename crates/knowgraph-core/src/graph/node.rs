//! Node types for the knowledge graph
//!
//! A node is a typed, identified fact (a want, a discovery, an emotion, ...).
//! Relationships are stored on the node itself as typed reference fields drawn
//! from the fixed [`RelationshipField`] vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Type tag assigned to nodes that do not declare `@type`
pub const DEFAULT_NODE_TYPE: &str = "thing";

/// Type tag for nodes that carry emotional weight
pub const EMOTION_NODE_TYPE: &str = "emotion";

/// The fixed vocabulary of relationship fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipField {
    /// Source emerged from target (single)
    EmergedFrom,
    /// Source enables targets (list)
    Enables,
    /// Source is blocked by target (single)
    BlockedBy,
    /// Source is related to targets (list)
    RelatedTo,
    /// Source was discovered by target (single)
    DiscoveredBy,
    /// Source was triggered by target (single)
    TriggeredBy,
    /// Source resulted in targets (list)
    ResultedIn,
}

impl RelationshipField {
    /// All relationship fields in canonical order
    pub const ALL: [RelationshipField; 7] = [
        Self::EmergedFrom,
        Self::Enables,
        Self::BlockedBy,
        Self::RelatedTo,
        Self::DiscoveredBy,
        Self::TriggeredBy,
        Self::ResultedIn,
    ];

    /// The document key for this field
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmergedFrom => "emergedFrom",
            Self::Enables => "enables",
            Self::BlockedBy => "blockedBy",
            Self::RelatedTo => "relatedTo",
            Self::DiscoveredBy => "discoveredBy",
            Self::TriggeredBy => "triggeredBy",
            Self::ResultedIn => "resultedIn",
        }
    }

    /// Parse from a document key, snake_case name, or lowercase name
    pub fn parse(s: &str) -> Option<Self> {
        let folded: String = s.chars().filter(|c| *c != '_' && *c != '-').collect();
        match folded.to_lowercase().as_str() {
            "emergedfrom" => Some(Self::EmergedFrom),
            "enables" => Some(Self::Enables),
            "blockedby" => Some(Self::BlockedBy),
            "relatedto" => Some(Self::RelatedTo),
            "discoveredby" => Some(Self::DiscoveredBy),
            "triggeredby" => Some(Self::TriggeredBy),
            "resultedin" => Some(Self::ResultedIn),
            _ => None,
        }
    }

    /// Whether the field holds a list of references
    pub fn is_list(&self) -> bool {
        matches!(self, Self::Enables | Self::RelatedTo | Self::ResultedIn)
    }
}

impl std::fmt::Display for RelationshipField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordinal confidence tier of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// One tier lower, saturating at low
    pub fn demoted(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed, identified fact in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Globally unique identifier
    #[serde(rename = "@id")]
    pub id: String,
    /// Open type vocabulary (`want`, `discovery`, `emotion`, ...)
    #[serde(rename = "@type", default = "default_node_type", deserialize_with = "lenient_type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub description: Option<String>,
    /// Urgency on a 0-10 scale
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_urgency")]
    pub urgency: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_confidence")]
    pub confidence: Option<Confidence>,
    /// Number of times the fact has been validated
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_count")]
    pub tested: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub last_validated: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "single_ref")]
    pub emerged_from: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "many_refs")]
    pub enables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "single_ref")]
    pub blocked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "many_refs")]
    pub related_to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "single_ref")]
    pub discovered_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "single_ref")]
    pub triggered_by: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "many_refs")]
    pub resulted_in: Vec<String>,

    /// Fields outside the core vocabulary, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    /// Create a new node with an id and type
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            description: None,
            urgency: None,
            confidence: None,
            tested: None,
            last_validated: None,
            emerged_from: None,
            enables: Vec::new(),
            blocked_by: None,
            related_to: Vec::new(),
            discovered_by: None,
            triggered_by: None,
            resulted_in: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the urgency (clamped to 0-10)
    pub fn with_urgency(mut self, urgency: u8) -> Self {
        self.urgency = Some(urgency.min(10));
        self
    }

    /// Set the confidence tier
    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Set the test count
    pub fn with_tested(mut self, tested: u32) -> Self {
        self.tested = Some(tested);
        self
    }

    /// Set the last validation timestamp
    pub fn with_last_validated(mut self, at: DateTime<Utc>) -> Self {
        self.last_validated = Some(at);
        self
    }

    /// Add a relationship to another node
    pub fn with_edge(mut self, field: RelationshipField, target: impl Into<String>) -> Self {
        self.add_target(field, target.into());
        self
    }

    /// Set an extra (non-vocabulary) field
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Add a target to a relationship field
    ///
    /// Single-valued fields are overwritten; list fields skip duplicates.
    pub fn add_target(&mut self, field: RelationshipField, target: String) {
        match field {
            RelationshipField::EmergedFrom => self.emerged_from = Some(target),
            RelationshipField::BlockedBy => self.blocked_by = Some(target),
            RelationshipField::DiscoveredBy => self.discovered_by = Some(target),
            RelationshipField::TriggeredBy => self.triggered_by = Some(target),
            RelationshipField::Enables => push_unique(&mut self.enables, target),
            RelationshipField::RelatedTo => push_unique(&mut self.related_to, target),
            RelationshipField::ResultedIn => push_unique(&mut self.resulted_in, target),
        }
    }

    /// Targets referenced by one relationship field
    pub fn targets(&self, field: RelationshipField) -> &[String] {
        match field {
            RelationshipField::EmergedFrom => self.emerged_from.as_slice(),
            RelationshipField::Enables => &self.enables,
            RelationshipField::BlockedBy => self.blocked_by.as_slice(),
            RelationshipField::RelatedTo => &self.related_to,
            RelationshipField::DiscoveredBy => self.discovered_by.as_slice(),
            RelationshipField::TriggeredBy => self.triggered_by.as_slice(),
            RelationshipField::ResultedIn => &self.resulted_in,
        }
    }

    /// All outgoing edges in field order
    pub fn edges(&self) -> impl Iterator<Item = (RelationshipField, &str)> + '_ {
        RelationshipField::ALL.into_iter().flat_map(move |field| {
            self.targets(field)
                .iter()
                .map(move |target| (field, target.as_str()))
        })
    }

    /// Number of outgoing references across all relationship fields
    pub fn edge_count(&self) -> usize {
        RelationshipField::ALL
            .iter()
            .map(|field| self.targets(*field).len())
            .sum()
    }

    /// Whether any relationship field references `id`
    pub fn references(&self, id: &str) -> bool {
        self.edges().any(|(_, target)| target == id)
    }

    /// Whether the node has the named property (vocabulary or extra)
    pub fn has_property(&self, name: &str) -> bool {
        if let Some(field) = RelationshipField::parse(name) {
            return !self.targets(field).is_empty();
        }
        match name {
            "@id" | "@type" => true,
            "description" => self.description.is_some(),
            "urgency" => self.urgency.is_some(),
            "confidence" => self.confidence.is_some(),
            "tested" => self.tested.is_some(),
            "lastValidated" => self.last_validated.is_some(),
            other => self.extra.get(other).is_some_and(|v| !v.is_null()),
        }
    }

    /// Confidence tier, treating a missing value as low
    pub fn confidence_or_low(&self) -> Confidence {
        self.confidence.unwrap_or(Confidence::Low)
    }

    /// Whether the node represents work in progress
    pub fn is_active(&self) -> bool {
        let in_progress = self
            .extra
            .get("status")
            .and_then(Value::as_str)
            .is_some_and(|s| s == "in_progress");
        let active = self
            .extra
            .get("active")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        in_progress || active
    }

    /// Text used for mention matching: `{id} {description}`
    pub fn match_text(&self) -> String {
        match &self.description {
            Some(description) => format!("{} {}", self.id, description),
            None => self.id.clone(),
        }
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn default_node_type() -> String {
    DEFAULT_NODE_TYPE.to_string()
}

// Vocabulary fields of the wrong shape are dropped with a warning rather than
// failing the load; only a missing `@id` rejects a node.

fn lenient_type<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let node_type = match &raw {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(Value::as_str).map(str::to_string),
        _ => None,
    };
    Ok(node_type.unwrap_or_else(|| {
        tracing::warn!(value = %raw, "Ignoring unusable @type");
        default_node_type()
    }))
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    match raw {
        Value::String(s) => Ok(Some(s)),
        other => {
            tracing::warn!(value = %other, "Ignoring non-text description");
            Ok(None)
        }
    }
}

/// Any number, rounded and clamped to 0-10
fn lenient_urgency<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let urgency = raw
        .as_f64()
        .filter(|u| u.is_finite())
        .map(|u| u.round().clamp(0.0, 10.0) as u8);
    if urgency.is_none() {
        tracing::warn!(value = %raw, "Ignoring non-numeric urgency");
    }
    Ok(urgency)
}

fn lenient_confidence<'de, D>(deserializer: D) -> Result<Option<Confidence>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let confidence = raw.as_str().and_then(Confidence::parse);
    if confidence.is_none() {
        tracing::warn!(value = %raw, "Ignoring unknown confidence tier");
    }
    Ok(confidence)
}

/// Non-negative numbers, rounded and saturating at `u32::MAX`
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let count = raw
        .as_f64()
        .filter(|t| t.is_finite() && *t >= 0.0)
        .map(|t| t.round() as u32);
    if count.is_none() {
        tracing::warn!(value = %raw, "Ignoring invalid tested count");
    }
    Ok(count)
}

/// Collect ids from `"id"`, `{"@id": "id"}`, or nested lists of those
fn collect_refs(value: Value, out: &mut Vec<String>) {
    match value {
        Value::String(id) => push_unique(out, id),
        Value::Array(values) => {
            for value in values {
                collect_refs(value, out);
            }
        }
        Value::Object(mut map) => match map.remove("@id") {
            Some(Value::String(id)) => push_unique(out, id),
            _ => tracing::warn!("Ignoring edge reference without a string @id"),
        },
        Value::Null => {}
        other => tracing::warn!(value = %other, "Ignoring malformed edge reference"),
    }
}

fn many_refs<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut out = Vec::new();
    collect_refs(Value::deserialize(deserializer)?, &mut out);
    Ok(out)
}

/// A single-valued field keeps its first reference
fn single_ref<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut out = many_refs(deserializer)?;
    if out.len() > 1 {
        tracing::warn!(
            kept = %out[0],
            dropped = out.len() - 1,
            "Single-valued edge has several targets"
        );
    }
    out.truncate(1);
    Ok(out.pop())
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS`, or `YYYY-MM-DD`; anything else is dropped
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let parsed = raw.as_str().and_then(parse_timestamp);
    if parsed.is_none() {
        tracing::warn!(value = %raw, "Ignoring unparseable lastValidated timestamp");
    }
    Ok(parsed)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_builder() {
        let node = Node::new("want:ship", "want")
            .with_description("Ship the release")
            .with_urgency(14)
            .with_confidence(Confidence::High)
            .with_edge(RelationshipField::Enables, "want:celebrate")
            .with_edge(RelationshipField::Enables, "want:celebrate");

        assert_eq!(node.urgency, Some(10));
        assert_eq!(node.enables, vec!["want:celebrate".to_string()]);
        assert_eq!(node.edge_count(), 1);
    }

    #[test]
    fn test_deserialize_edge_shapes() {
        let node: Node = serde_json::from_value(json!({
            "@id": "want:a",
            "@type": "want",
            "emergedFrom": {"@id": "discovery:x"},
            "enables": "want:b",
            "relatedTo": ["want:c", {"@id": "want:d"}],
            "blockedBy": ["discovery:y"]
        }))
        .unwrap();

        assert_eq!(node.emerged_from.as_deref(), Some("discovery:x"));
        assert_eq!(node.enables, vec!["want:b"]);
        assert_eq!(node.related_to, vec!["want:c", "want:d"]);
        assert_eq!(node.blocked_by.as_deref(), Some("discovery:y"));
        assert_eq!(node.edge_count(), 5);
    }

    #[test]
    fn test_single_field_keeps_first_target() {
        let node: Node = serde_json::from_value(json!({
            "@id": "want:a",
            "blockedBy": ["x", "y"],
            "enables": ["want:b", 7, {"name": "no id"}]
        }))
        .unwrap();
        assert_eq!(node.blocked_by.as_deref(), Some("x"));
        assert_eq!(node.enables, vec!["want:b"]);
    }

    #[test]
    fn test_lenient_scalar_fields() {
        let node: Node = serde_json::from_value(json!({
            "@id": "want:a",
            "@type": ["want", "goal"],
            "urgency": 7.5,
            "confidence": "certain",
            "tested": 2.0
        }))
        .unwrap();
        assert_eq!(node.node_type, "want");
        assert_eq!(node.urgency, Some(8));
        assert_eq!(node.confidence, None);
        assert_eq!(node.tested, Some(2));

        let node: Node = serde_json::from_value(json!({
            "@id": "want:b",
            "@type": 3,
            "description": {"text": "nested"},
            "urgency": "very",
            "confidence": "HIGH",
            "tested": -1,
            "lastValidated": 20250115
        }))
        .unwrap();
        assert_eq!(node.node_type, DEFAULT_NODE_TYPE);
        assert_eq!(node.description, None);
        assert_eq!(node.urgency, None);
        assert_eq!(node.confidence, Some(Confidence::High));
        assert_eq!(node.tested, None);
        assert_eq!(node.last_validated, None);

        let node: Node = serde_json::from_value(json!({"@id": "want:c", "urgency": 42})).unwrap();
        assert_eq!(node.urgency, Some(10));
    }

    #[test]
    fn test_default_type_and_extra_fields() {
        let node: Node = serde_json::from_value(json!({
            "@id": "n1",
            "why": "because",
            "status": "in_progress"
        }))
        .unwrap();

        assert_eq!(node.node_type, DEFAULT_NODE_TYPE);
        assert_eq!(node.extra.get("why"), Some(&json!("because")));
        assert!(node.is_active());
        assert!(node.has_property("why"));
        assert!(!node.has_property("blockedBy"));
    }

    #[test]
    fn test_serialize_round_trip_keeps_camel_case() {
        let node = Node::new("want:a", "want")
            .with_edge(RelationshipField::BlockedBy, "discovery:b")
            .with_extra("intensity", json!(7));
        let value = serde_json::to_value(&node).unwrap();

        assert_eq!(value["@id"], "want:a");
        assert_eq!(value["blockedBy"], "discovery:b");
        assert_eq!(value["intensity"], 7);
        assert!(value.get("enables").is_none());

        let back: Node = serde_json::from_value(value).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_lenient_timestamps() {
        let node: Node = serde_json::from_value(json!({
            "@id": "a",
            "lastValidated": "2025-01-15"
        }))
        .unwrap();
        assert!(node.last_validated.is_some());

        let node: Node = serde_json::from_value(json!({
            "@id": "a",
            "lastValidated": "not a date"
        }))
        .unwrap();
        assert!(node.last_validated.is_none());

        assert!(parse_timestamp("2025-01-15T10:30:00Z").is_some());
        assert!(parse_timestamp("2025-01-15T10:30:00").is_some());
    }

    #[test]
    fn test_relationship_field_parsing() {
        assert_eq!(
            RelationshipField::parse("blockedBy"),
            Some(RelationshipField::BlockedBy)
        );
        assert_eq!(
            RelationshipField::parse("blocked_by"),
            Some(RelationshipField::BlockedBy)
        );
        assert_eq!(
            RelationshipField::parse("RELATEDTO"),
            Some(RelationshipField::RelatedTo)
        );
        assert_eq!(RelationshipField::parse("uses"), None);
        assert!(RelationshipField::Enables.is_list());
        assert!(!RelationshipField::EmergedFrom.is_list());
    }

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
        assert_eq!(Confidence::High.demoted(), Confidence::Medium);
        assert_eq!(Confidence::Low.demoted(), Confidence::Low);
        assert_eq!(Confidence::parse("HIGH"), Some(Confidence::High));
        assert_eq!(Confidence::parse("certain"), None);
    }
}
