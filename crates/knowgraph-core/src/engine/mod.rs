//! Query engine
//!
//! [`KnowledgeEngine`] ties the pieces together: a question goes through
//! intent extraction, an optional framing filter, bounded traversal, and
//! relevance scoring, and the answer is recorded in the learning log.

mod knowledge_engine;
mod types;

pub use knowledge_engine::{KnowledgeEngine, KnowledgeEngineBuilder};
pub use types::{Constraints, IntrospectionReport, QueryResult, RankedNode, SemanticQuery};
