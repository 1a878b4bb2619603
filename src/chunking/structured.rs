//! Structured (axiom-graph) chunking contract.
//!
//! The six structured strategies group an ontology's axioms instead of
//! splitting raw text. Producing those groups requires the ontology model
//! itself, so the work is delegated to an external [`StructuredChunker`]
//! collaborator; this module owns the record shape the pipeline consumes and
//! the strategy dispatch with its documented fallback.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::chunking::ChunkingStrategy;
use crate::types::RagError;

/// One axiom group produced by a structured chunker.
///
/// `body` holds the rendered axiom content; identity and provenance live in
/// the remaining fields and are folded into a header block by
/// [`rendered_text`](StructuredChunk::rendered_text).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StructuredChunk {
    /// Collaborator-assigned chunk id, stable within one chunking run.
    pub id: String,
    /// Label of the strategy that produced this chunk.
    pub strategy_label: String,
    /// Number of axioms grouped into this chunk.
    pub axiom_count: usize,
    /// Strategy-specific provenance (namespace, root class, depth, ...).
    pub metadata: BTreeMap<String, String>,
    /// Rendered axiom content.
    pub body: String,
}

impl StructuredChunk {
    pub fn new(
        id: impl Into<String>,
        strategy_label: impl Into<String>,
        axiom_count: usize,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            strategy_label: strategy_label.into(),
            axiom_count,
            metadata: BTreeMap::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Full text handed to the embedder: a header block identifying the
    /// chunk, a blank line, then the axiom body.
    ///
    /// The header leads so that token-budget splitting can replicate it onto
    /// every sub-chunk (the split logic keeps the leading non-blank lines).
    pub fn rendered_text(&self) -> String {
        let mut text = String::new();
        text.push_str(&format!("Chunk: {}\n", self.id));
        text.push_str(&format!("Strategy: {}\n", self.strategy_label));
        text.push_str(&format!("Axiom count: {}\n", self.axiom_count));
        for (key, value) in &self.metadata {
            text.push_str(&format!("{key}: {value}\n"));
        }
        text.push('\n');
        text.push_str(&self.body);
        text
    }
}

/// External collaborator producing axiom groups for a structured strategy.
///
/// Implementations wrap an ontology editing environment's read-only axiom
/// enumeration. They may assume `strategy` is one of the structured variants;
/// the pipeline normalizes anything else via [`normalize_structured`].
pub trait StructuredChunker: Send + Sync {
    fn chunk(&self, strategy: ChunkingStrategy) -> Result<Vec<StructuredChunk>, RagError>;
}

/// Maps a possibly-textual strategy onto the structured family.
///
/// Non-structured variants fall back to [`ChunkingStrategy::ClassBased`]
/// with a logged warning, never an error.
pub fn normalize_structured(strategy: ChunkingStrategy) -> ChunkingStrategy {
    if strategy.is_structured() {
        strategy
    } else {
        warn!(
            strategy = strategy.name(),
            "not a structured chunking strategy, falling back to ClassBasedChunking"
        );
        ChunkingStrategy::ClassBased
    }
}
