//! The query engine: intent, framing, traversal, scoring, and learning

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use super::types::{Constraints, IntrospectionReport, QueryResult, RankedNode, SemanticQuery};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::framing::{Framer, ShapeFramer, constraint_frame, frame_with_timeout, framed_ids};
use crate::graph::{
    DanglingReference, EMOTION_NODE_TYPE, EdgeFilter, Graph, Insight, Node, RelationshipField, WANT_TYPE,
    discover_insights, expand, integrity_check,
};
use crate::intent::{Intent, IntentExtractor, PhraseTableExtractor, Temporal};
use crate::learning::{ConfidenceUpdate, LearningLog, LearningRecord, ValidationOutcome, reinforce, validate_node};
use crate::scoring::{RelevanceScorer, suggest_connections};
use crate::text::normalize_query;

/// Matches listed in the reasoning string
const REASONING_TOP: usize = 3;
/// Queries listed in an introspection report
const REPORT_TOP_QUERIES: usize = 5;

/// Answers questions over a shared graph and learns from what it returns
///
/// Queries take the graph read lock; reinforcement and validation take the
/// write lock. The learning log sits behind its own mutex, so appends and
/// flushes are serialized.
pub struct KnowledgeEngine {
    graph: Arc<RwLock<Graph>>,
    log: Arc<Mutex<LearningLog>>,
    extractor: Arc<dyn IntentExtractor>,
    framer: Arc<dyn Framer>,
    scorer: RelevanceScorer,
    config: Config,
}

impl KnowledgeEngine {
    pub fn builder() -> KnowledgeEngineBuilder {
        KnowledgeEngineBuilder::new()
    }

    /// Load a graph file and the learning log in `state_dir`
    pub async fn open(graph_path: impl AsRef<Path>, state_dir: impl AsRef<Path>, config: Config) -> Result<Self> {
        let graph = Graph::load_file(graph_path).await?;
        let log = LearningLog::open(state_dir.as_ref(), &config.learning).await?;
        Ok(KnowledgeEngineBuilder::new()
            .config(config)
            .graph(graph)
            .learning_log(log)
            .build())
    }

    /// Answer a question
    ///
    /// Never fails: framing problems degrade to no filter, and persistence
    /// problems are logged and retried on the next flush.
    pub async fn query(&self, query: SemanticQuery) -> QueryResult {
        let constraints = query.constraints.clone().unwrap_or_default();
        let max_items = query.max_items.unwrap_or(self.config.query.max_items);
        let max_hops = constraints.max_hops.unwrap_or(self.config.traversal.max_hops);

        let graph = self.graph.read().await;

        let mut intent = self.extractor.extract(&query.question, &graph).await;
        if constraints.include_emotional == Some(false) {
            intent.emotional_weight = 0;
        }

        let allowed = self.allowed_ids(&graph, &intent, &constraints).await;

        let seeds = select_seeds(&graph, &intent);
        let reached: Option<HashSet<String>> = if seeds.is_empty() {
            None
        } else {
            let filter = EdgeFilter::from_fields(intent.relationships.iter().copied());
            Some(expand(&graph, seeds, max_hops, &filter).into_set())
        };

        let candidates: Vec<&Node> = graph
            .all()
            .iter()
            .enumerate()
            .filter(|(position, node)| graph.position(&node.id) == Some(*position))
            .map(|(_, node)| node)
            .filter(|node| reached.as_ref().is_none_or(|ids| ids.contains(&node.id)))
            .filter(|node| allowed.as_ref().is_none_or(|ids| ids.contains(&node.id)))
            .collect();

        let mut log = self.log.lock().await;

        let mut scored = self.scorer.score(&candidates, &intent, &log);
        // normalized over every candidate, not just the returned slice
        let confidence = self.scorer.result_confidence(&scored);
        scored.truncate(max_items);

        let reasoning = reasoning(candidates.len(), &scored);
        let ids: Vec<String> = scored.iter().map(|s| s.node.id.clone()).collect();
        let suggested_connections =
            suggest_connections(&ids, &graph, &log, self.config.learning.history_window);

        let nodes: Vec<RankedNode> = scored
            .into_iter()
            .map(|s| RankedNode {
                node: s.node.clone(),
                score: s.score,
                reasons: s.reasons,
            })
            .collect();

        log.append(&query.question, ids).await;

        info!(
            question = %query.question,
            candidates = candidates.len(),
            returned = nodes.len(),
            confidence,
            "Query answered"
        );

        QueryResult {
            nodes,
            confidence,
            reasoning,
            suggested_connections,
        }
    }

    /// Ids passing the type / confidence frame, or `None` when unfiltered
    async fn allowed_ids(&self, graph: &Graph, intent: &Intent, constraints: &Constraints) -> Option<HashSet<String>> {
        let types: Vec<String> = if !constraints.types.is_empty() {
            constraints.types.clone()
        } else if intent.is_emotional() {
            [WANT_TYPE, EMOTION_NODE_TYPE, "discovery"]
                .iter()
                .map(|t| t.to_string())
                .collect()
        } else {
            Vec::new()
        };

        let frame = constraint_frame(&types, constraints.min_confidence, graph.context())?;
        let timeout = StdDuration::from_millis(self.config.framing.timeout_ms);

        let framed = match graph.to_document() {
            Ok(document) => frame_with_timeout(self.framer.as_ref(), &document, &frame, timeout).await,
            Err(e) => Err(e),
        };
        match framed.and_then(|framed| framed_ids(&framed)) {
            Ok(ids) => {
                debug!(allowed = ids.len(), "Framing filter applied");
                Some(ids)
            }
            Err(e) => {
                warn!(error = %e, code = e.code(), "Framing failed; continuing without a filter");
                None
            }
        }
    }

    /// Read access to the graph
    pub async fn graph(&self) -> RwLockReadGuard<'_, Graph> {
        self.graph.read().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Adjust confidence tiers from recent usage
    pub async fn reinforce(&self) -> Vec<ConfidenceUpdate> {
        let mut graph = self.graph.write().await;
        let log = self.log.lock().await;
        let window = Duration::try_days(self.config.learning.reinforce_window_days)
            .unwrap_or(Duration::MAX);
        reinforce(&mut graph, &log, window, Utc::now())
    }

    /// Record a test outcome for a node
    pub async fn validate_node(&self, node_id: &str, passed: bool) -> Result<ValidationOutcome> {
        let mut graph = self.graph.write().await;
        validate_node(&mut graph, node_id, passed, Utc::now())
    }

    /// Dangling relationship targets
    pub async fn integrity(&self) -> Vec<DanglingReference> {
        integrity_check(&*self.graph.read().await)
    }

    /// Gaps, redundancies, contradictions, and usage patterns
    pub async fn insights(&self) -> Vec<Insight> {
        let graph = self.graph.read().await;
        let log = self.log.lock().await;
        discover_insights(&graph, log.records())
    }

    /// The last `limit` learning records, oldest first
    pub async fn history(&self, limit: usize) -> Vec<LearningRecord> {
        self.log.lock().await.recent_history(limit).to_vec()
    }

    /// Counts describing the graph and its usage
    pub async fn introspect(&self) -> IntrospectionReport {
        let graph = self.graph.read().await;
        let log = self.log.lock().await;

        let mut type_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut relationship_counts: BTreeMap<String, usize> = BTreeMap::new();
        for node in graph.all() {
            *type_counts.entry(node.node_type.clone()).or_insert(0) += 1;
            for field in RelationshipField::ALL {
                let edges = node.targets(field).len();
                if edges > 0 {
                    *relationship_counts.entry(field.to_string()).or_insert(0) += edges;
                }
            }
        }

        let mut query_counts: BTreeMap<String, usize> = BTreeMap::new();
        for record in log.records() {
            *query_counts.entry(normalize_query(&record.query)).or_insert(0) += 1;
        }
        let mut top_queries: Vec<(String, usize)> = query_counts.into_iter().collect();
        top_queries.sort_by(|a, b| b.1.cmp(&a.1));
        top_queries.truncate(REPORT_TOP_QUERIES);

        IntrospectionReport {
            node_count: graph.len(),
            type_counts,
            relationship_counts,
            dangling_references: integrity_check(&graph).len(),
            history_len: log.len(),
            pattern_count: log.patterns().len(),
            top_queries,
            pending_writes: log.pending(),
        }
    }

    /// Write pending learning state to disk
    pub async fn flush(&self) -> Result<()> {
        self.log.lock().await.flush().await
    }

    /// Flush learning state before the engine goes away
    pub async fn shutdown(&self) -> Result<()> {
        let mut log = self.log.lock().await;
        log.flush().await?;
        info!(records = log.len(), "Knowledge engine shut down");
        Ok(())
    }

    /// Write the (possibly updated) graph document to `path`
    pub async fn save_graph(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let document = self.graph.read().await.to_document()?;
        let json = serde_json::to_string_pretty(&document)?;
        let tmp = path.with_extension("tmp");
        let write_failure = |e: std::io::Error| Error::PersistenceWriteFailure {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        tokio::fs::write(&tmp, json).await.map_err(write_failure)?;
        tokio::fs::rename(&tmp, path).await.map_err(write_failure)?;
        info!(path = %path.display(), "Graph saved");
        Ok(())
    }
}

/// Traversal seeds: mentioned concepts, else nodes carrying a requested
/// relationship, else active nodes for "current" questions
fn select_seeds(graph: &Graph, intent: &Intent) -> Vec<String> {
    if !intent.concepts.is_empty() {
        return intent.concepts.clone();
    }

    let carrying: Vec<String> = graph
        .all()
        .iter()
        .filter(|node| {
            intent
                .relationships
                .iter()
                .any(|field| !node.targets(*field).is_empty())
        })
        .map(|node| node.id.clone())
        .collect();
    if !carrying.is_empty() {
        return carrying;
    }

    if intent.temporal == Temporal::Current {
        return graph
            .all()
            .iter()
            .filter(|node| node.is_active())
            .map(|node| node.id.clone())
            .collect();
    }
    Vec::new()
}

fn reasoning(found: usize, scored: &[crate::scoring::ScoredNode<'_>]) -> String {
    if scored.is_empty() {
        return format!("Found {found} nodes.");
    }
    let top: Vec<String> = scored
        .iter()
        .take(REASONING_TOP)
        .map(|s| format!("{}: {}", s.node.id, s.reasons.join(", ")))
        .collect();
    format!("Found {found} nodes. Top matches: {}", top.join("; "))
}

/// Builder for [`KnowledgeEngine`]
pub struct KnowledgeEngineBuilder {
    config: Config,
    graph: Option<Graph>,
    log: Option<LearningLog>,
    extractor: Option<Arc<dyn IntentExtractor>>,
    framer: Option<Arc<dyn Framer>>,
}

impl Default for KnowledgeEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeEngineBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            graph: None,
            log: None,
            extractor: None,
            framer: None,
        }
    }

    /// Set configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the graph (empty by default)
    pub fn graph(mut self, graph: Graph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Set the learning log (in-memory by default)
    pub fn learning_log(mut self, log: LearningLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Set the intent extractor (phrase tables by default)
    pub fn extractor(mut self, extractor: impl IntentExtractor + 'static) -> Self {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    /// Set the framer (shape matching by default)
    pub fn framer(mut self, framer: impl Framer + 'static) -> Self {
        self.framer = Some(Arc::new(framer));
        self
    }

    /// Build the engine
    pub fn build(self) -> KnowledgeEngine {
        let log = self
            .log
            .unwrap_or_else(|| LearningLog::in_memory(&self.config.learning));
        let graph = self.graph.unwrap_or_else(Graph::empty);
        info!(nodes = graph.len(), history = log.len(), "Knowledge engine ready");

        KnowledgeEngine {
            graph: Arc::new(RwLock::new(graph)),
            log: Arc::new(Mutex::new(log)),
            extractor: self
                .extractor
                .unwrap_or_else(|| Arc::new(PhraseTableExtractor::new()) as Arc<dyn IntentExtractor>),
            framer: self
                .framer
                .unwrap_or_else(|| Arc::new(ShapeFramer::new()) as Arc<dyn Framer>),
            scorer: RelevanceScorer::new(self.config.scoring.clone()),
            config: self.config,
        }
    }
}
