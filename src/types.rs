//! Shared error taxonomy for the indexing and retrieval pipelines.

use thiserror::Error;

/// Hard cap on stored vector dimensions, enforced at store construction.
pub const MAX_DIMENSION: usize = 1024;

/// Errors surfaced by chunking, embedding, storage, and query operations.
///
/// Provider failures carry the HTTP status so callers can diagnose them
/// without inspecting logs. Degradable configuration problems (an unknown
/// strategy name) never reach this type; they fall back with a warning.
#[derive(Debug, Error)]
pub enum RagError {
    /// Requested vector dimension exceeds [`MAX_DIMENSION`]. Fatal at store
    /// construction; there is no fallback for this one.
    #[error("vector dimension {requested} exceeds the supported maximum of {MAX_DIMENSION}")]
    DimensionTooLarge { requested: usize },

    /// An embedding provider answered with a non-2xx status.
    #[error("embedding request failed with status {status}")]
    EmbeddingRequestFailed { status: u16 },

    /// The text-generation provider answered with a non-2xx status.
    #[error("generation request failed with status {status}")]
    GenerationRequestFailed { status: u16 },

    /// A provider response was 2xx but did not contain the expected payload.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// Vector index open/commit/read failure.
    #[error("index storage error: {0}")]
    Storage(String),

    /// Structured-query execution or schema introspection failure.
    #[error("graph query failed: {0}")]
    GraphQuery(String),

    /// Chunk production failure (structured chunker collaborator).
    #[error("chunking failed: {0}")]
    Chunking(String),

    /// Transport-level failure talking to a provider (timeout, DNS, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// Filesystem-level failure.
    #[error("io error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::Transport(err.to_string())
    }
}

impl From<std::io::Error> for RagError {
    fn from(err: std::io::Error) -> Self {
        RagError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_carry_status() {
        let err = RagError::EmbeddingRequestFailed { status: 429 };
        assert!(err.to_string().contains("429"));

        let err = RagError::GenerationRequestFailed { status: 503 };
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn dimension_error_names_the_cap() {
        let err = RagError::DimensionTooLarge { requested: 2048 };
        let msg = err.to_string();
        assert!(msg.contains("2048"));
        assert!(msg.contains("1024"));
    }
}
