//! Structural and usage insights about a graph
//!
//! Findings are advisory. Nothing here mutates the graph.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use super::node::RelationshipField;
use super::store::{Graph, integrity_check};
use crate::learning::LearningRecord;
use crate::text::{jaccard, words};

/// Description similarity above which two nodes look redundant
pub const REDUNDANCY_THRESHOLD: f64 = 0.8;
/// Co-occurrences above which an unlinked pair is reported
pub const CO_OCCURRENCE_THRESHOLD: usize = 5;
/// Records inspected for failed queries
const GAP_WINDOW: usize = 100;
/// Failed queries above which a missing-knowledge insight is raised
const FAILED_QUERY_THRESHOLD: usize = 10;
/// Share of failed queries a term must appear in to be reported
const COMMON_TERM_SHARE: f64 = 0.3;

/// Kind of insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Gap,
    Redundancy,
    Contradiction,
    Pattern,
}

impl InsightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gap => "gap",
            Self::Redundancy => "redundancy",
            Self::Contradiction => "contradiction",
            Self::Pattern => "pattern",
        }
    }
}

impl std::fmt::Display for InsightKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One finding about the graph or its usage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub kind: InsightKind,
    pub description: String,
    pub affected_nodes: Vec<String>,
    pub suggested_action: String,
    /// 0.0 to 1.0
    pub confidence: f64,
}

/// Pairs of nodes that block each other, each pair reported once
pub fn find_contradictions(graph: &Graph) -> Vec<Insight> {
    let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
    let mut insights = Vec::new();

    for node in graph.all() {
        let Some(blocker_id) = node.blocked_by.as_deref() else {
            continue;
        };
        let Some(blocker) = graph.get(blocker_id) else {
            continue;
        };
        if blocker.blocked_by.as_deref() != Some(node.id.as_str()) {
            continue;
        }
        let key = ordered_pair(&node.id, &blocker.id);
        if !seen.insert(key) {
            continue;
        }
        insights.push(Insight {
            kind: InsightKind::Contradiction,
            description: "Circular blocking dependency detected".to_string(),
            affected_nodes: vec![node.id.clone(), blocker.id.clone()],
            suggested_action: "Resolve circular dependency".to_string(),
            confidence: 1.0,
        });
    }
    insights
}

/// Pairs of nodes whose descriptions are nearly the same
pub fn find_redundancies(graph: &Graph) -> Vec<Insight> {
    let described: Vec<(&str, BTreeSet<String>)> = graph
        .all()
        .iter()
        .filter_map(|node| {
            let description = node.description.as_deref()?;
            Some((node.id.as_str(), words(description)))
        })
        .collect();

    let mut insights = Vec::new();
    for (i, (left_id, left_words)) in described.iter().enumerate() {
        for (right_id, right_words) in &described[i + 1..] {
            let similarity = jaccard(left_words, right_words);
            if similarity > REDUNDANCY_THRESHOLD {
                insights.push(Insight {
                    kind: InsightKind::Redundancy,
                    description: "Nodes have very similar descriptions".to_string(),
                    affected_nodes: vec![left_id.to_string(), right_id.to_string()],
                    suggested_action: "Consider merging or differentiating these nodes".to_string(),
                    confidence: similarity,
                });
            }
        }
    }
    insights
}

/// Missing knowledge: recurring failed queries and dangling references
pub fn find_knowledge_gaps(graph: &Graph, history: &[LearningRecord]) -> Vec<Insight> {
    let mut insights = Vec::new();

    let start = history.len().saturating_sub(GAP_WINDOW);
    let failed: Vec<&str> = history[start..]
        .iter()
        .filter(|record| record.result_node_ids.is_empty())
        .map(|record| record.query.as_str())
        .collect();
    if failed.len() > FAILED_QUERY_THRESHOLD {
        let terms = common_terms(&failed);
        insights.push(Insight {
            kind: InsightKind::Gap,
            description: format!("Missing knowledge about: {}", terms.join(", ")),
            affected_nodes: Vec::new(),
            suggested_action: "Consider adding nodes for these concepts".to_string(),
            confidence: 0.8,
        });
    }

    let mut broken: BTreeMap<usize, (String, Vec<String>)> = BTreeMap::new();
    for finding in integrity_check(graph) {
        let position = graph.position(&finding.node_id).unwrap_or(usize::MAX);
        broken
            .entry(position)
            .or_insert_with(|| (finding.node_id.clone(), Vec::new()))
            .1
            .push(format!("{}: {}", finding.field, finding.dangling_target));
    }
    for (node_id, references) in broken.into_values() {
        insights.push(Insight {
            kind: InsightKind::Gap,
            description: format!("Node {} has {} broken relationships", node_id, references.len()),
            affected_nodes: vec![node_id],
            suggested_action: format!("Fix or remove relationships: {}", references.join(", ")),
            confidence: 1.0,
        });
    }
    insights
}

/// Node pairs that keep turning up together without a declared relationship
pub fn find_usage_patterns(graph: &Graph, history: &[LearningRecord]) -> Vec<Insight> {
    let mut pairs: BTreeMap<(String, String), usize> = BTreeMap::new();
    for record in history {
        let ids: BTreeSet<&String> = record.result_node_ids.iter().collect();
        let ids: Vec<&String> = ids.into_iter().collect();
        for (i, left) in ids.iter().enumerate() {
            for right in &ids[i + 1..] {
                *pairs.entry(ordered_pair(left, right)).or_insert(0) += 1;
            }
        }
    }

    let insights: Vec<Insight> = pairs
        .into_iter()
        .filter(|(_, count)| *count > CO_OCCURRENCE_THRESHOLD)
        .filter(|((left, right), _)| !linked(graph, left, right))
        .map(|((left, right), count)| Insight {
            kind: InsightKind::Pattern,
            description: format!("Nodes frequently appear together ({count} times) but aren't linked"),
            affected_nodes: vec![left, right],
            suggested_action: format!("Consider adding {} relationship", RelationshipField::RelatedTo),
            confidence: (count as f64 / 10.0).min(1.0),
        })
        .collect();

    debug!(patterns = insights.len(), records = history.len(), "Usage patterns analyzed");
    insights
}

/// Every insight kind, in the order gaps, redundancies, contradictions, patterns
pub fn discover_insights(graph: &Graph, history: &[LearningRecord]) -> Vec<Insight> {
    let mut insights = find_knowledge_gaps(graph, history);
    insights.extend(find_redundancies(graph));
    insights.extend(find_contradictions(graph));
    insights.extend(find_usage_patterns(graph, history));
    insights
}

fn ordered_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn linked(graph: &Graph, a: &str, b: &str) -> bool {
    graph.get(a).is_some_and(|node| node.references(b))
        || graph.get(b).is_some_and(|node| node.references(a))
}

/// Terms longer than 3 chars that appear in more than 30% of `queries`
fn common_terms(queries: &[&str]) -> Vec<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for query in queries {
        for term in words(query) {
            if term.chars().count() > 3 {
                *counts.entry(term).or_insert(0) += 1;
            }
        }
    }
    let floor = queries.len() as f64 * COMMON_TERM_SHARE;
    counts
        .into_iter()
        .filter(|(_, count)| *count as f64 > floor)
        .map(|(term, _)| term)
        .collect()
}
