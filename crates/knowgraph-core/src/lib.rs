//! Knowgraph Core Library
//!
//! This crate provides the core functionality for Knowgraph, including:
//! - Node store (typed nodes and relationship edges loaded from a graph document)
//! - Bounded edge traversal
//! - Intent extraction from free-text questions
//! - Relevance scoring and connection suggestions
//! - Learning log (query history, learned patterns, confidence reinforcement)
//! - Frame-based filtering
//! - The query engine tying these together

pub mod config;
pub mod engine;
pub mod error;
pub mod framing;
pub mod graph;
pub mod intent;
pub mod learning;
pub mod scoring;
pub mod text;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::engine::{Constraints, KnowledgeEngine, KnowledgeEngineBuilder, QueryResult, SemanticQuery};
    pub use crate::error::{Error, Result};
    pub use crate::graph::{Confidence, Graph, Node, RelationshipField};
    pub use crate::learning::LearningLog;
}
