//! Append-only query history and the learned query-pattern index
//!
//! History lives in `learning-history.json` and patterns in
//! `query-patterns.json` inside the state directory. Appends are flushed in
//! batches; a failed flush keeps its pending count so the next append or an
//! explicit [`LearningLog::flush`] retries it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LearningConfig;
use crate::error::{Error, Result};
use crate::text::{jaccard, normalize_query, tokenize};

/// File holding the serialized history
pub const HISTORY_FILE: &str = "learning-history.json";
/// File holding the serialized query patterns
pub const PATTERNS_FILE: &str = "query-patterns.json";

/// One answered query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningRecord {
    pub query: String,
    #[serde(rename = "resultNodes", alias = "resultNodeIds")]
    pub result_node_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl LearningRecord {
    pub fn contains(&self, id: &str) -> bool {
        self.result_node_ids.iter().any(|n| n == id)
    }
}

/// Query history plus learned patterns, optionally backed by a state directory
#[derive(Debug)]
pub struct LearningLog {
    state_dir: Option<PathBuf>,
    records: Vec<LearningRecord>,
    patterns: BTreeMap<String, Vec<String>>,
    pending: usize,
    flush_every: usize,
    similarity_threshold: f64,
}

impl LearningLog {
    /// A log that is never written to disk
    pub fn in_memory(settings: &LearningConfig) -> Self {
        Self {
            state_dir: None,
            records: Vec::new(),
            patterns: BTreeMap::new(),
            pending: 0,
            flush_every: settings.flush_every.max(1),
            similarity_threshold: settings.similarity_threshold,
        }
    }

    /// Open the log stored in `state_dir`
    ///
    /// Missing files mean an empty log. Files that exist but cannot be read
    /// or parsed fail with [`Error::PersistenceReadFailure`].
    pub async fn open(state_dir: impl Into<PathBuf>, settings: &LearningConfig) -> Result<Self> {
        let state_dir = state_dir.into();
        let records: Vec<LearningRecord> =
            read_json_or_default(&state_dir.join(HISTORY_FILE)).await?;
        let patterns: BTreeMap<String, Vec<String>> =
            read_json_or_default(&state_dir.join(PATTERNS_FILE)).await?;

        info!(
            state_dir = %state_dir.display(),
            records = records.len(),
            patterns = patterns.len(),
            "Learning log opened"
        );

        Ok(Self {
            state_dir: Some(state_dir),
            records,
            patterns,
            ..Self::in_memory(settings)
        })
    }

    /// Record a query and its result ids, stamped now
    pub async fn append(&mut self, query: &str, result_node_ids: Vec<String>) {
        self.append_at(query, result_node_ids, Utc::now()).await;
    }

    /// Record a query with an explicit timestamp
    pub async fn append_at(&mut self, query: &str, result_node_ids: Vec<String>, timestamp: DateTime<Utc>) {
        let key = normalize_query(query);
        let learned = self.patterns.entry(key).or_default();
        for id in &result_node_ids {
            if !learned.contains(id) {
                learned.push(id.clone());
            }
        }

        self.records.push(LearningRecord {
            query: query.to_string(),
            result_node_ids,
            timestamp,
        });
        self.pending += 1;

        if self.pending >= self.flush_every {
            if let Err(e) = self.flush().await {
                warn!(error = %e, pending = self.pending, "Deferred learning log flush");
            }
        }
    }

    /// Write history and patterns to the state directory
    ///
    /// Each file is written to a temporary sibling and renamed into place.
    /// On failure the pending count is kept so a later flush retries.
    pub async fn flush(&mut self) -> Result<()> {
        let Some(dir) = self.state_dir.clone() else {
            self.pending = 0;
            return Ok(());
        };
        if self.pending == 0 && dir.join(HISTORY_FILE).exists() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| write_failure(&dir, e))?;
        write_json_atomic(&dir.join(HISTORY_FILE), &self.records).await?;
        write_json_atomic(&dir.join(PATTERNS_FILE), &self.patterns).await?;

        debug!(
            state_dir = %dir.display(),
            records = self.records.len(),
            flushed = self.pending,
            "Learning log flushed"
        );
        self.pending = 0;
        Ok(())
    }

    /// The last `n` records, oldest first
    pub fn recent_history(&self, n: usize) -> &[LearningRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    /// How often each other id appeared in the same result set as `node_id`
    pub fn co_occurrence(&self, node_id: &str) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in self.records.iter().filter(|r| r.contains(node_id)) {
            let others: BTreeSet<&String> = record
                .result_node_ids
                .iter()
                .filter(|id| *id != node_id)
                .collect();
            for other in others {
                *counts.entry(other.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Ids learned for this query or for any sufficiently similar one
    pub fn historical_matches(&self, query: &str) -> BTreeSet<String> {
        let key = normalize_query(query);
        let tokens = tokenize(&key);
        let mut matches = BTreeSet::new();

        for (stored, ids) in &self.patterns {
            let similar = *stored == key
                || jaccard(&tokens, &tokenize(stored)) >= self.similarity_threshold;
            if similar {
                matches.extend(ids.iter().cloned());
            }
        }
        matches
    }

    /// All records, oldest first
    pub fn records(&self) -> &[LearningRecord] {
        &self.records
    }

    /// Normalized query -> ids it has returned
    pub fn patterns(&self) -> &BTreeMap<String, Vec<String>> {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends not yet written to disk
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn state_dir(&self) -> Option<&Path> {
        self.state_dir.as_deref()
    }
}

async fn read_json_or_default<T>(path: &Path) -> Result<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => {
            return Err(Error::PersistenceReadFailure {
                path: path.display().to_string(),
                reason: e.to_string(),
            });
        }
    };
    serde_json::from_str(&contents).map_err(|e| Error::PersistenceReadFailure {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| write_failure(path, e))?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| write_failure(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| write_failure(path, e))
}

fn write_failure(path: &Path, reason: impl std::fmt::Display) -> Error {
    Error::PersistenceWriteFailure {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}
