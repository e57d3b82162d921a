//! Relevance scoring
//!
//! Every candidate gets an additive score with one human-readable reason per
//! contributing factor. Constants come from [`ScoringConfig`].

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::ScoringConfig;
use crate::graph::{EMOTION_NODE_TYPE, Graph, Node, RelationshipField};
use crate::intent::Intent;
use crate::learning::LearningLog;

/// Maximum connection suggestions per query
pub const MAX_SUGGESTIONS: usize = 5;

/// A candidate with its score and the reasons behind it
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredNode<'g> {
    pub node: &'g Node,
    pub score: u32,
    pub reasons: Vec<String>,
}

/// A relationship the usage history suggests is missing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedConnection {
    pub from: String,
    pub to: String,
    pub relationship: RelationshipField,
    pub confidence: f64,
}

/// Scores candidates against an intent and the learning log
#[derive(Debug, Clone, Default)]
pub struct RelevanceScorer {
    config: ScoringConfig,
}

impl RelevanceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score and rank candidates as of now
    pub fn score<'g>(&self, candidates: &[&'g Node], intent: &Intent, log: &LearningLog) -> Vec<ScoredNode<'g>> {
        self.score_at(candidates, intent, log, Utc::now())
    }

    /// Score and rank candidates as of `now`
    ///
    /// The sort is stable, so equal scores keep candidate order.
    pub fn score_at<'g>(
        &self,
        candidates: &[&'g Node],
        intent: &Intent,
        log: &LearningLog,
        now: DateTime<Utc>,
    ) -> Vec<ScoredNode<'g>> {
        let historical = log.historical_matches(&intent.question);

        let mut scored: Vec<ScoredNode<'g>> = candidates
            .iter()
            .map(|node| self.score_node(node, intent, &historical, now))
            .collect();
        scored.sort_by(|a, b| b.score.cmp(&a.score));

        debug!(
            candidates = scored.len(),
            top_score = scored.first().map(|s| s.score),
            "Candidates scored"
        );
        scored
    }

    fn score_node<'g>(
        &self,
        node: &'g Node,
        intent: &Intent,
        historical: &BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> ScoredNode<'g> {
        let c = &self.config;
        let mut score: u32 = 0;
        let mut reasons = Vec::new();

        if let Some(confidence) = node.confidence {
            let points = c.confidence_points(confidence);
            if points > 0 {
                score = score.saturating_add(points);
                reasons.push(format!("{confidence} confidence"));
            }
        }

        let tested = node.tested.unwrap_or(0);
        let test_points = tested.saturating_mul(c.test_weight).min(c.test_cap);
        if test_points > 0 {
            score = score.saturating_add(test_points);
            reasons.push(format!("tested {tested} times"));
        }

        let recent = Duration::try_days(c.recency_days).is_some_and(|window| {
            node.last_validated
                .is_some_and(|validated| now.signed_duration_since(validated) < window)
        });
        if recent && c.recency_bonus > 0 {
            score = score.saturating_add(c.recency_bonus);
            reasons.push("recently validated".to_string());
        }

        if intent.mentions(&node.id) && c.mention_bonus > 0 {
            score = score.saturating_add(c.mention_bonus);
            reasons.push("directly mentioned".to_string());
        }

        if intent.is_emotional() {
            if node.node_type == EMOTION_NODE_TYPE {
                let points = intent.emotional_weight.saturating_mul(c.emotion_multiplier);
                if points > 0 {
                    score = score.saturating_add(points);
                    reasons.push("emotional relevance".to_string());
                }
            }
            if let Some(urgency) = node.urgency.filter(|u| *u > 0) {
                score = score.saturating_add(u32::from(urgency));
                reasons.push(format!("urgency {urgency}"));
            }
        }

        let edges = node.edge_count();
        let connectivity = (edges as u32).min(c.connectivity_cap);
        if connectivity > 0 {
            score = score.saturating_add(connectivity);
            reasons.push(format!("connected ({edges} relationships)"));
        }

        if historical.contains(&node.id) && c.historical_bonus > 0 {
            score = score.saturating_add(c.historical_bonus);
            reasons.push("frequently relevant to similar queries".to_string());
        }

        ScoredNode { node, score, reasons }
    }

    /// Per-node normalizer used by [`Self::result_confidence`]
    pub fn max_possible(&self) -> u32 {
        self.config.max_possible()
    }

    /// Aggregate confidence of a result set in `[0, 1]`; 0 when empty
    pub fn result_confidence(&self, scored: &[ScoredNode<'_>]) -> f64 {
        let max_possible = self.max_possible();
        if scored.is_empty() || max_possible == 0 {
            return 0.0;
        }
        let total: u64 = scored.iter().map(|s| u64::from(s.score)).sum();
        let ceiling = scored.len() as f64 * f64::from(max_possible);
        (total as f64 / ceiling).clamp(0.0, 1.0)
    }
}

/// Propose `relatedTo` edges between current results and ids that keep
/// co-occurring with them in recent history
///
/// Looks at the last `history_window` records, newest first. A proposal goes
/// from the first current result present in the record to every other id in
/// it that exists, is not a current result, and has no edge to any current
/// result in either direction.
pub fn suggest_connections(
    results: &[String],
    graph: &Graph,
    log: &LearningLog,
    history_window: usize,
) -> Vec<SuggestedConnection> {
    if results.is_empty() {
        return Vec::new();
    }
    let current: HashSet<&str> = results.iter().map(String::as_str).collect();
    let mut linked_cache: HashMap<String, bool> = HashMap::new();
    let mut order: Vec<(String, String)> = Vec::new();
    let mut counts: HashMap<(String, String), usize> = HashMap::new();

    for record in log.recent_history(history_window).iter().rev() {
        let Some(from) = results.iter().find(|id| record.contains(id)) else {
            continue;
        };
        let others: BTreeSet<&String> = record.result_node_ids.iter().collect();
        for to in others {
            if current.contains(to.as_str()) || !graph.contains(to) {
                continue;
            }
            let linked = *linked_cache
                .entry(to.clone())
                .or_insert_with(|| linked_to_any(graph, to, results));
            if linked {
                continue;
            }
            let key = (from.clone(), to.clone());
            let count = counts.entry(key.clone()).or_insert(0);
            if *count == 0 {
                order.push(key);
            }
            *count += 1;
        }
    }

    order
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|key| {
            let count = counts.get(&key).copied().unwrap_or(0);
            let (from, to) = key;
            SuggestedConnection {
                from,
                to,
                relationship: RelationshipField::RelatedTo,
                confidence: (0.5 + 0.1 * count as f64).min(0.95),
            }
        })
        .collect()
}

fn linked_to_any(graph: &Graph, id: &str, results: &[String]) -> bool {
    let outgoing = graph
        .get(id)
        .is_some_and(|node| results.iter().any(|r| node.references(r)));
    outgoing
        || results
            .iter()
            .filter_map(|r| graph.get(r))
            .any(|node| node.references(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LearningConfig;
    use crate::graph::Confidence;
    use serde_json::json;

    fn log() -> LearningLog {
        LearningLog::in_memory(&LearningConfig::default())
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_factor_reasons_in_order() {
        let now = Utc::now();
        let node = Node::new("want:a", "want")
            .with_confidence(Confidence::High)
            .with_tested(7)
            .with_last_validated(now - Duration::days(2))
            .with_edge(RelationshipField::RelatedTo, "b");
        let intent = Intent {
            concepts: ids(&["want:a"]),
            ..Intent::new("tell me about want a")
        };

        let scored = RelevanceScorer::default().score_at(&[&node], &intent, &log(), now);
        assert_eq!(scored[0].score, 3 + 5 + 2 + 10 + 1);
        assert_eq!(
            scored[0].reasons,
            vec![
                "high confidence",
                "tested 7 times",
                "recently validated",
                "directly mentioned",
                "connected (1 relationships)"
            ]
        );
    }

    #[test]
    fn test_low_confidence_and_stale_validation_add_nothing() {
        let now = Utc::now();
        let node = Node::new("a", "want")
            .with_confidence(Confidence::Low)
            .with_last_validated(now - Duration::days(8));
        let scored = RelevanceScorer::default().score_at(&[&node], &Intent::new("q"), &log(), now);
        assert_eq!(scored[0].score, 0);
        assert!(scored[0].reasons.is_empty());
    }

    #[test]
    fn test_emotional_factors() {
        let now = Utc::now();
        let emotion = Node::new("emotion:stress", "emotion");
        let want = Node::new("want:ship", "want").with_urgency(9);
        let intent = Intent {
            emotional_weight: 2,
            ..Intent::new("urgent and important")
        };

        let scored = RelevanceScorer::default().score_at(&[&emotion, &want], &intent, &log(), now);
        assert_eq!(scored[0].node.id, "want:ship");
        assert_eq!(scored[0].score, 9);
        assert_eq!(scored[0].reasons, vec!["urgency 9"]);
        assert_eq!(scored[1].score, 4);
        assert_eq!(scored[1].reasons, vec!["emotional relevance"]);

        // urgency only counts for emotional questions
        let calm = RelevanceScorer::default().score_at(&[&want], &Intent::new("q"), &log(), now);
        assert_eq!(calm[0].score, 0);
    }

    #[test]
    fn test_direct_mention_dominates_equal_nodes() {
        let now = Utc::now();
        let plain = Node::new("a", "want").with_confidence(Confidence::Medium);
        let named = Node::new("b", "want").with_confidence(Confidence::Medium);
        let intent = Intent {
            concepts: ids(&["b"]),
            ..Intent::new("b")
        };

        let scored = RelevanceScorer::default().score_at(&[&plain, &named], &intent, &log(), now);
        assert_eq!(scored[0].node.id, "b");
        assert_eq!(scored[0].score - scored[1].score, 10);
    }

    #[test]
    fn test_score_monotonic_in_tested() {
        let now = Utc::now();
        let scorer = RelevanceScorer::default();
        let mut last = 0;
        for tested in 0..10 {
            let node = Node::new("a", "want").with_tested(tested);
            let score = scorer.score_at(&[&node], &Intent::new("q"), &log(), now)[0].score;
            assert!(score >= last);
            last = score;
        }
        assert_eq!(last, 5);
    }

    #[test]
    fn test_ties_keep_candidate_order() {
        let now = Utc::now();
        let nodes: Vec<Node> = (0..5).map(|i| Node::new(format!("n{i}"), "want")).collect();
        let refs: Vec<&Node> = nodes.iter().collect();
        let scored = RelevanceScorer::default().score_at(&refs, &Intent::new("q"), &log(), now);
        let order: Vec<&str> = scored.iter().map(|s| s.node.id.as_str()).collect();
        assert_eq!(order, vec!["n0", "n1", "n2", "n3", "n4"]);
    }

    #[tokio::test]
    async fn test_historical_bonus() {
        let now = Utc::now();
        let mut log = log();
        log.append("what is blocked", ids(&["a"])).await;

        let a = Node::new("a", "want");
        let b = Node::new("b", "want");
        let scored = RelevanceScorer::default().score_at(&[&b, &a], &Intent::new("What is blocked?"), &log, now);
        assert_eq!(scored[0].node.id, "a");
        assert_eq!(scored[0].reasons, vec!["frequently relevant to similar queries"]);
    }

    #[test]
    fn test_extreme_constants_saturate() {
        let now = Utc::now();
        let node = Node::new("want:a", "emotion")
            .with_confidence(Confidence::High)
            .with_last_validated(now - Duration::days(1));
        let intent = Intent {
            concepts: ids(&["want:a"]),
            emotional_weight: 3,
            ..Intent::new("urgent want a")
        };
        let scorer = RelevanceScorer::new(ScoringConfig {
            mention_bonus: u32::MAX,
            emotion_multiplier: u32::MAX,
            recency_days: i64::MAX,
            ..ScoringConfig::default()
        });

        let scored = scorer.score_at(&[&node], &intent, &log(), now);
        assert_eq!(scored[0].score, u32::MAX);
        assert!(!scored[0].reasons.contains(&"recently validated".to_string()));
        assert_eq!(scorer.max_possible(), u32::MAX);
        assert_eq!(scorer.result_confidence(&scored), 1.0);
    }

    #[test]
    fn test_result_confidence() {
        let scorer = RelevanceScorer::default();
        assert_eq!(scorer.result_confidence(&[]), 0.0);

        let node = Node::new("a", "want");
        let half = ScoredNode { node: &node, score: 10, reasons: Vec::new() };
        let over = ScoredNode { node: &node, score: 40, reasons: Vec::new() };
        assert!((scorer.result_confidence(std::slice::from_ref(&half)) - 0.5).abs() < 1e-9);
        assert_eq!(scorer.result_confidence(&[over]), 1.0);
    }

    #[tokio::test]
    async fn test_suggest_connections() {
        let graph = Graph::load(json!({
            "@context": {},
            "@graph": [
                {"@id": "a", "relatedTo": ["linked"]},
                {"@id": "b"},
                {"@id": "c"},
                {"@id": "linked"}
            ]
        }))
        .unwrap();
        let mut log = log();
        log.append("q1", ids(&["a", "c", "linked", "ghost"])).await;
        log.append("q2", ids(&["a", "c"])).await;
        log.append("q3", ids(&["b", "c"])).await;
        log.append("q4", ids(&["c"])).await;

        let suggestions = suggest_connections(&ids(&["a", "b"]), &graph, &log, 50);
        let pairs: Vec<(&str, &str)> = suggestions
            .iter()
            .map(|s| (s.from.as_str(), s.to.as_str()))
            .collect();
        // newest record first; "linked" already has an edge, "ghost" does not exist
        assert_eq!(pairs, vec![("b", "c"), ("a", "c")]);
        assert!(suggestions.iter().all(|s| s.relationship == RelationshipField::RelatedTo));
        assert!((suggestions[0].confidence - 0.6).abs() < 1e-9);
        assert!((suggestions[1].confidence - 0.7).abs() < 1e-9);

        assert!(suggest_connections(&[], &graph, &log, 50).is_empty());
        assert!(suggest_connections(&ids(&["a", "b"]), &graph, &log, 1).is_empty());
    }

    #[tokio::test]
    async fn test_suggestions_capped_and_confidence_bounded() {
        let nodes: Vec<serde_json::Value> = (0..10).map(|i| json!({"@id": format!("n{i}")})).collect();
        let graph = Graph::load(json!({"@context": {}, "@graph": nodes})).unwrap();
        let mut log = log();
        for _ in 0..20 {
            log.append("q", (0..10).map(|i| format!("n{i}")).collect()).await;
        }

        let suggestions = suggest_connections(&ids(&["n0"]), &graph, &log, 50);
        assert_eq!(suggestions.len(), MAX_SUGGESTIONS);
        assert!(suggestions.iter().all(|s| s.confidence == 0.95));
        assert!(suggestions.iter().all(|s| s.from == "n0"));
    }
}
