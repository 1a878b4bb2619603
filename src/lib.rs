//! Retrieval-augmented generation over ontologies and property graphs.
//!
//! ```text
//! GraphSource ──► chunk candidates ─┐
//! EntitySource ──► rendered text ───┼─► chunking ──► IndexingPipeline
//! StructuredChunker ──► axiom chunks ┘                    │
//!                                          Embedder ◄─────┤
//!                                                         ▼
//!                                    stores::SqliteVectorStore
//!                                                         │
//! Question ──► QueryPipeline ──► embed ──► KNN search ────┘
//!                  │
//!                  ├─► optional graph query branch (Generator + GraphSource)
//!                  └─► grounded Generator call ──► answer transcript
//! ```
//!
//! The crate is the core of the system only: graph drivers and ontology
//! editors plug in behind the [`graph`] traits, and the HTTP provider
//! clients live in [`embeddings`] and [`generation`].

pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod generation;
pub mod graph;
pub mod indexing;
pub mod query;
pub mod stores;
pub mod types;

pub use chunking::ChunkingStrategy;
pub use config::RagConfig;
pub use embeddings::{Embedder, EmbeddingClient, EmbeddingProvider, TARGET_DIMENSION};
pub use generation::{GenerationClient, Generator};
pub use graph::{EntityRecord, EntitySource, GraphChunk, GraphSource};
pub use indexing::{IndexingPipeline, IndexingReport};
pub use query::QueryPipeline;
pub use stores::{IndexStats, SearchResult, SqliteVectorStore, VectorRecord, VectorStore};
pub use types::{MAX_DIMENSION, RagError};
