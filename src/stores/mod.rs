//! Persistent vector storage for embedded chunks.
//!
//! [`VectorStore`] is the unified trait the pipelines consume;
//! [`sqlite::SqliteVectorStore`] is the shipping backend (SQLite with
//! `sqlite-vec` for cosine distance). The store is the sole writer of the
//! persisted form once records are upserted.

pub mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::RagError;

pub use sqlite::SqliteVectorStore;

/// One embedded chunk ready for persistence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique record id; re-using an id overwrites the prior record.
    pub id: String,
    /// Embedding, reconciled to the store's dimension on upsert.
    pub vector: Vec<f32>,
    /// The chunk text the vector was produced from.
    pub text: String,
    /// Provenance (source kind, strategy, parent id, ...).
    pub metadata: BTreeMap<String, String>,
}

impl VectorRecord {
    pub fn new(id: impl Into<String>, vector: Vec<f32>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            vector,
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// One search hit; produced fresh per query, never persisted.
#[derive(Clone, Debug)]
pub struct SearchResult {
    pub id: String,
    pub text: String,
    /// Cosine similarity; higher is more similar. Callers must not assume a
    /// fixed normalization beyond that ordering.
    pub score: f32,
    pub metadata: BTreeMap<String, String>,
}

/// Read-only snapshot of the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexStats {
    pub document_count: usize,
    pub vector_dimension: usize,
    pub index_location: String,
}

/// Persistent KNN index over embedded chunks.
///
/// Upserts are update-or-insert by id: an id already present is fully
/// replaced (vector, text, metadata). The write path commits once after the
/// full batch, not per record; a crash mid-batch may lose the whole batch
/// but never corrupts previously committed state.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Writes a batch of records, reconciling each vector to the store's
    /// dimension. Committed once after the full batch.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), RagError>;

    /// Top-K most similar records by cosine similarity, descending. An empty
    /// store yields an empty list, never an error; fewer than `top_k`
    /// results are returned when the store holds fewer documents.
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>, RagError>;

    async fn stats(&self) -> Result<IndexStats, RagError>;

    /// Deletes all records. Idempotent; the store remains usable afterwards.
    async fn clear(&self) -> Result<(), RagError>;

    /// Releases the underlying resources. The store must not be used after
    /// this returns.
    async fn close(&self) -> Result<(), RagError>;
}

/// Adjusts a vector to the store dimension: truncate when longer, zero-pad
/// when shorter. Log-worthy, not an error.
pub(crate) fn reconcile_dimension(mut vector: Vec<f32>, dimension: usize) -> Vec<f32> {
    if vector.len() == dimension {
        return vector;
    }
    warn!(
        got = vector.len(),
        expected = dimension,
        "vector dimension mismatch, adjusting"
    );
    vector.resize(dimension, 0.0);
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_truncates_longer_vectors() {
        let adjusted = reconcile_dimension(vec![1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(adjusted, vec![1.0, 2.0]);
    }

    #[test]
    fn reconcile_zero_pads_shorter_vectors() {
        let adjusted = reconcile_dimension(vec![1.0], 3);
        assert_eq!(adjusted, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn reconcile_leaves_exact_vectors_alone() {
        let adjusted = reconcile_dimension(vec![0.5, 0.5], 2);
        assert_eq!(adjusted, vec![0.5, 0.5]);
    }
}
