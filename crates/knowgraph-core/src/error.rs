//! Error types for Knowgraph

use thiserror::Error;

/// Result type alias using Knowgraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Knowgraph error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Document errors (E001-E099)
    #[error("Malformed graph document: {0}")]
    MalformedDocument(String),

    #[error("Node '{0}' not found. Run `knowgraph introspect` to see what the graph contains.")]
    NodeNotFound(String),

    // Persistence errors (E100-E199)
    #[error("Failed to persist learning state to {path}: {reason}")]
    PersistenceWriteFailure { path: String, reason: String },

    #[error("Failed to read learning state from {path}: {reason}")]
    PersistenceReadFailure { path: String, reason: String },

    // Framing errors (E200-E299)
    #[error("Framing failed: {0}")]
    FramingFailed(String),

    #[error("Framing timed out after {0} ms")]
    FramingTimeout(u64),

    // Generic errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedDocument(_) => "E001",
            Self::NodeNotFound(_) => "E002",
            Self::PersistenceWriteFailure { .. } => "E100",
            Self::PersistenceReadFailure { .. } => "E101",
            Self::FramingFailed(_) => "E200",
            Self::FramingTimeout(_) => "E201",
            Self::Json(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::MalformedDocument(_) => {
                Some("The document needs an `@context` and an `@graph` array of nodes with `@id`".to_string())
            }
            Self::NodeNotFound(_) => Some("knowgraph introspect".to_string()),
            Self::PersistenceWriteFailure { .. } => {
                Some("Check that the state directory is writable (`--state-dir`)".to_string())
            }
            Self::FramingTimeout(_) => Some("knowgraph config set framing.timeout_ms 5000".to_string()),
            _ => None,
        }
    }

    /// Whether the error aborts engine construction rather than degrading a query
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MalformedDocument(_) | Self::PersistenceReadFailure { .. })
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedDocument(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(Error::MalformedDocument("x".into()).code(), "E001");
        assert_eq!(Error::NodeNotFound("want:a".into()).code(), "E002");
        assert_eq!(
            Error::PersistenceWriteFailure {
                path: "/tmp/x".into(),
                reason: "denied".into()
            }
            .code(),
            "E100"
        );
        assert_eq!(Error::FramingTimeout(10).code(), "E201");
    }

    #[test]
    fn test_error_messages() {
        let err = Error::NodeNotFound("want:missing".into());
        assert!(err.to_string().contains("want:missing"));

        let err = Error::FramingTimeout(250);
        assert_eq!(err.to_string(), "Framing timed out after 250 ms");
    }

    #[test]
    fn test_suggestions() {
        assert_eq!(
            Error::NodeNotFound("a".into()).suggestion(),
            Some("knowgraph introspect".to_string())
        );
        assert!(Error::FramingFailed("bad frame".into()).suggestion().is_none());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::malformed("no @graph").is_fatal());
        assert!(!Error::FramingFailed("boom".into()).is_fatal());
        assert!(
            !Error::PersistenceWriteFailure {
                path: "p".into(),
                reason: "r".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert_eq!(err.code(), "E9999");
    }
}
