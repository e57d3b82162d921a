//! Named frames for common questions

use serde_json::{Value, json};

use crate::graph::WANT_TYPE;

/// Every want
pub fn all_wants() -> Value {
    json!({ "@type": WANT_TYPE })
}

/// Wants that carry an urgency
pub fn urgent_wants() -> Value {
    json!({ "@type": WANT_TYPE, "urgency": {} })
}

/// Wants with a declared blocker
pub fn blocked_wants() -> Value {
    json!({ "@type": WANT_TYPE, "blockedBy": {} })
}

/// One node, embedding its relationships
pub fn node_with_relations(node_id: &str) -> Value {
    json!({ "@id": node_id, "@embed": "@always" })
}

/// Wants with an emergence lineage, two levels embedded
pub fn emergence_chain() -> Value {
    json!({
        "@type": WANT_TYPE,
        "emergedFrom": {
            "@embed": "@always",
            "emergedFrom": { "@embed": "@always" }
        }
    })
}
