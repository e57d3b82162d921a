//! Confidence reinforcement and validation feedback
//!
//! These are the only operations that mutate the graph. Callers hold the
//! graph write lock for the duration of a call.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::log::LearningLog;
use crate::error::{Error, Result};
use crate::graph::{Confidence, Graph};

/// Usage above this in the window promotes to high
const HIGH_USAGE: usize = 10;
/// Usage above this (and at most [`HIGH_USAGE`]) promotes low to medium
const MEDIUM_USAGE: usize = 5;
/// Passing tests needed before a node is promoted to high
pub const PROMOTE_AFTER_TESTS: u32 = 3;

/// A confidence change made by [`reinforce`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceUpdate {
    pub node_id: String,
    pub old: Option<Confidence>,
    pub new: Confidence,
    pub usage: usize,
    pub reason: String,
}

/// Result of reporting a test outcome with [`validate_node`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub node_id: String,
    pub passed: bool,
    pub tested: u32,
    pub old: Option<Confidence>,
    pub new: Option<Confidence>,
}

/// Adjust confidence tiers from how often nodes were returned recently
///
/// Usage counts result-set appearances within `window` before `now`.
pub fn reinforce(
    graph: &mut Graph,
    log: &LearningLog,
    window: Duration,
    now: DateTime<Utc>,
) -> Vec<ConfidenceUpdate> {
    let cutoff = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
    let mut usage: HashMap<&str, usize> = HashMap::new();
    for record in log.records().iter().filter(|r| r.timestamp >= cutoff) {
        for id in &record.result_node_ids {
            *usage.entry(id.as_str()).or_insert(0) += 1;
        }
    }

    let mut updates = Vec::new();
    for node in graph.nodes_mut() {
        let used = usage.get(node.id.as_str()).copied().unwrap_or(0);
        let current = node.confidence_or_low();

        let change = if used > HIGH_USAGE && current != Confidence::High {
            Some((Confidence::High, format!("used {used} times recently")))
        } else if used > MEDIUM_USAGE && used <= HIGH_USAGE && current == Confidence::Low {
            Some((Confidence::Medium, format!("used {used} times recently")))
        } else if used == 0
            && node.tested.unwrap_or(0) == 0
            && node.confidence.is_some_and(|c| c != Confidence::Low)
        {
            Some((Confidence::Low, "unused and never tested".to_string()))
        } else {
            None
        };

        if let Some((new, reason)) = change {
            debug!(node_id = %node.id, old = ?node.confidence, new = %new, usage = used, "Confidence reinforced");
            updates.push(ConfidenceUpdate {
                node_id: node.id.clone(),
                old: node.confidence,
                new,
                usage: used,
                reason,
            });
            node.confidence = Some(new);
        }
    }

    info!(updates = updates.len(), window_days = window.num_days(), "Reinforcement completed");
    updates
}

/// Record a test outcome for one node
///
/// Passing bumps `tested`, stamps `lastValidated`, and promotes to high once
/// the node has passed [`PROMOTE_AFTER_TESTS`] times. Failing demotes one tier.
pub fn validate_node(
    graph: &mut Graph,
    node_id: &str,
    passed: bool,
    now: DateTime<Utc>,
) -> Result<ValidationOutcome> {
    let node = graph
        .get_mut(node_id)
        .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))?;
    let old = node.confidence;

    if passed {
        let tested = node.tested.unwrap_or(0).saturating_add(1);
        node.tested = Some(tested);
        node.last_validated = Some(now);
        if tested >= PROMOTE_AFTER_TESTS {
            node.confidence = Some(Confidence::High);
        }
    } else {
        node.confidence = Some(node.confidence_or_low().demoted());
    }

    let outcome = ValidationOutcome {
        node_id: node.id.clone(),
        passed,
        tested: node.tested.unwrap_or(0),
        old,
        new: node.confidence,
    };
    info!(
        node_id = %outcome.node_id,
        passed,
        tested = outcome.tested,
        confidence = ?outcome.new,
        "Validation recorded"
    );
    Ok(outcome)
}
