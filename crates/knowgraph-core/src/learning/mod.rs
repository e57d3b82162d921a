//! Learning from usage
//!
//! - [`LearningLog`]: append-only query history, learned query patterns, co-occurrence
//! - [`reinforce`]: usage-driven confidence adjustment
//! - [`validate_node`]: test-outcome feedback

mod feedback;
mod log;

pub use feedback::{ConfidenceUpdate, PROMOTE_AFTER_TESTS, ValidationOutcome, reinforce, validate_node};
pub use log::{HISTORY_FILE, LearningLog, LearningRecord, PATTERNS_FILE};
