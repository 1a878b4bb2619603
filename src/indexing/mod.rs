//! Bulk indexing: chunk candidates in, committed vector records out.
//!
//! The pipeline collects ordered candidates from a source (graph chunk
//! candidates and rendered entity descriptions go through the text chunking
//! engine; structured axiom chunks come from the collaborator), polices
//! oversized structured chunks against a token budget, embeds everything on
//! a bounded worker pool with per-chunk failure isolation, and commits the
//! surviving records to the vector store in one batch.

use std::collections::BTreeMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunking::structured::{StructuredChunker, normalize_structured};
use crate::chunking::{self, ChunkingStrategy};
use crate::embeddings::Embedder;
use crate::graph::{EntitySource, GraphSource, render_entity};
use crate::stores::{VectorRecord, VectorStore};
use crate::types::RagError;

/// Chunks estimated above this many tokens are skipped outright; embedding
/// them would only time out at the provider.
pub const MAX_CHUNK_TOKENS: usize = 50_000;

/// Chunks estimated above this many tokens are split before embedding.
pub const SPLIT_THRESHOLD_TOKENS: usize = 6_000;

/// Token budget for each split part.
pub const SUB_CHUNK_TOKENS: usize = 5_000;

/// Maximum lines considered part of a chunk's header block when splitting.
const HEADER_MAX_LINES: usize = 10;

/// Upper bound on concurrent embedding workers.
const MAX_WORKERS: usize = 10;

/// Bounded wait when tearing down the worker pool; stragglers are aborted.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Progress log cadence, in processed candidates.
const PROGRESS_INTERVAL: usize = 100;

/// Conservative token estimate: one token per three characters. Providers'
/// tokenizers usually count fewer tokens than this, never dramatically more.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 3
}

/// One unit of indexing work before embedding.
#[derive(Clone, Debug)]
pub struct ChunkCandidate {
    /// Stable id used in reports and split-part suffixes; distinct from the
    /// random record id assigned at embedding time.
    pub chunk_id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    /// Structured chunks get token-budget policing; text chunks are already
    /// sized by their chunking strategy.
    pub police_size: bool,
}

/// Tagged result of one worker task. A single aggregator consumes these;
/// there are no shared counters across tasks.
enum ChunkOutcome {
    Success {
        records: Vec<VectorRecord>,
    },
    Split {
        chunk_id: String,
        records: Vec<VectorRecord>,
        parts: usize,
    },
    Skipped {
        chunk_id: String,
        estimated_tokens: usize,
    },
    Failed {
        chunk_id: String,
        reason: String,
    },
}

/// Outcome accounting for one indexing run.
#[derive(Clone, Debug, Default)]
pub struct IndexingReport {
    /// Records committed to the vector store.
    pub records_written: usize,
    /// Candidates fully processed (split candidates count once).
    pub succeeded: usize,
    /// Candidates whose embedding failed; siblings are unaffected.
    pub failed: usize,
    /// Candidates skipped for exceeding [`MAX_CHUNK_TOKENS`].
    pub skipped_too_large: usize,
    /// Total split parts produced across all split candidates.
    pub split_parts: usize,
    /// Ids of failed and skipped candidates, for diagnosis.
    pub failed_chunk_ids: Vec<String>,
}

/// Bulk-converts a source's chunk candidates into committed vector records.
pub struct IndexingPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl IndexingPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Indexes a property graph's chunk candidates using a text strategy.
    pub async fn index_graph(
        &self,
        graph: &dyn GraphSource,
        strategy: ChunkingStrategy,
    ) -> Result<IndexingReport, RagError> {
        let sources = graph.chunk_candidates().await?;
        if sources.is_empty() {
            warn!("no graph chunks to index");
            return Ok(IndexingReport::default());
        }

        let texts = sources
            .into_iter()
            .map(|chunk| (chunk.text, chunk.metadata))
            .collect();
        let candidates = text_candidates("graph", "graph_chunk", texts, strategy);
        self.run(candidates, strategy).await
    }

    /// Indexes an ontology, dispatching on the strategy family: structured
    /// strategies delegate to the chunker collaborator, text strategies
    /// chunk the rendered entity descriptions.
    pub async fn index_ontology(
        &self,
        entities: &dyn EntitySource,
        chunker: &dyn StructuredChunker,
        strategy: ChunkingStrategy,
    ) -> Result<IndexingReport, RagError> {
        if strategy.is_structured() {
            self.index_structured(chunker, strategy).await
        } else {
            self.index_entities(entities, strategy).await
        }
    }

    /// Indexes rendered entity descriptions using a text strategy.
    pub async fn index_entities(
        &self,
        source: &dyn EntitySource,
        strategy: ChunkingStrategy,
    ) -> Result<IndexingReport, RagError> {
        let entities = source.entities()?;
        if entities.is_empty() {
            warn!("no ontology content to index");
            return Ok(IndexingReport::default());
        }
        info!(entities = entities.len(), "extracted entity descriptions");

        let texts = entities
            .iter()
            .map(|entity| (render_entity(entity), BTreeMap::new()))
            .collect();
        let candidates = text_candidates("ontology", "entity_chunk", texts, strategy);
        self.run(candidates, strategy).await
    }

    /// Indexes structured axiom chunks from the collaborator, with
    /// token-budget policing.
    pub async fn index_structured(
        &self,
        chunker: &dyn StructuredChunker,
        strategy: ChunkingStrategy,
    ) -> Result<IndexingReport, RagError> {
        let strategy = normalize_structured(strategy);
        let chunks = chunker.chunk(strategy)?;
        info!(
            strategy = strategy.name(),
            chunks = chunks.len(),
            "structured chunker produced chunks"
        );

        let candidates = chunks
            .into_iter()
            .map(|chunk| {
                let mut metadata = BTreeMap::new();
                metadata.insert("source".to_string(), "ontology".to_string());
                metadata.insert("type".to_string(), "axiom_chunk".to_string());
                metadata.insert("chunking_strategy".to_string(), strategy.name().to_string());
                metadata.insert("axiom_count".to_string(), chunk.axiom_count.to_string());
                metadata.insert("strategy_used".to_string(), chunk.strategy_label.clone());
                let text = chunk.rendered_text();
                ChunkCandidate {
                    chunk_id: chunk.id,
                    text,
                    metadata,
                    police_size: true,
                }
            })
            .collect();
        self.run(candidates, strategy).await
    }

    /// Runs candidates through the worker pool and commits the batch.
    pub async fn run(
        &self,
        candidates: Vec<ChunkCandidate>,
        strategy: ChunkingStrategy,
    ) -> Result<IndexingReport, RagError> {
        if candidates.is_empty() {
            return Ok(IndexingReport::default());
        }

        let total = candidates.len();
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(MAX_WORKERS);
        info!(
            total,
            workers,
            strategy = strategy.name(),
            "starting parallel indexing"
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks: JoinSet<()> = JoinSet::new();

        for candidate in candidates {
            let semaphore = Arc::clone(&semaphore);
            let embedder = Arc::clone(&self.embedder);
            let tx = tx.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore closed before workers finished");
                let outcome = process_candidate(embedder, candidate).await;
                let _ = tx.send(outcome);
            });
        }
        drop(tx);

        // Single aggregator; tasks report outcomes, nothing else is shared.
        let mut report = IndexingReport::default();
        let mut records = Vec::new();
        let mut processed = 0usize;
        while let Some(outcome) = rx.recv().await {
            processed += 1;
            if processed % PROGRESS_INTERVAL == 0 {
                info!(
                    processed,
                    total,
                    succeeded = report.succeeded,
                    failed = report.failed,
                    skipped = report.skipped_too_large,
                    split_parts = report.split_parts,
                    "indexing progress"
                );
            }
            match outcome {
                ChunkOutcome::Success { records: mut batch } => {
                    report.succeeded += 1;
                    records.append(&mut batch);
                }
                ChunkOutcome::Split {
                    chunk_id,
                    records: mut batch,
                    parts,
                } => {
                    report.succeeded += 1;
                    report.split_parts += parts;
                    records.append(&mut batch);
                    info!(chunk_id = %chunk_id, parts, "oversized chunk split");
                }
                ChunkOutcome::Skipped {
                    chunk_id,
                    estimated_tokens,
                } => {
                    report.skipped_too_large += 1;
                    warn!(
                        chunk_id = %chunk_id,
                        estimated_tokens,
                        "chunk too large, skipping to avoid provider timeout"
                    );
                    report.failed_chunk_ids.push(format!("{chunk_id} (too large)"));
                }
                ChunkOutcome::Failed { chunk_id, reason } => {
                    report.failed += 1;
                    warn!(chunk_id = %chunk_id, reason = %reason, "failed to index chunk");
                    report.failed_chunk_ids.push(chunk_id);
                }
            }
        }

        // Bounded teardown: anything still running past the timeout gets
        // aborted; in-flight provider calls may not stop promptly.
        loop {
            match timeout(SHUTDOWN_TIMEOUT, tasks.join_next()).await {
                Ok(Some(Ok(()))) => {}
                Ok(Some(Err(join_err))) => {
                    report.failed += 1;
                    warn!(error = %join_err, "indexing task did not finish cleanly");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!("indexing tasks outlived the shutdown timeout, aborting");
                    tasks.abort_all();
                    break;
                }
            }
        }

        report.records_written = records.len();
        self.store.upsert(records).await?;

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped_too_large,
            split_parts = report.split_parts,
            records_written = report.records_written,
            "indexing complete"
        );
        if !report.failed_chunk_ids.is_empty() {
            warn!(
                failed_chunks = report.failed_chunk_ids.join(", "),
                "some chunks were not indexed"
            );
        }
        Ok(report)
    }
}

async fn process_candidate(embedder: Arc<dyn Embedder>, candidate: ChunkCandidate) -> ChunkOutcome {
    if candidate.police_size {
        let estimated = estimate_tokens(&candidate.text);
        if estimated > MAX_CHUNK_TOKENS {
            return ChunkOutcome::Skipped {
                chunk_id: candidate.chunk_id,
                estimated_tokens: estimated,
            };
        }
        if estimated > SPLIT_THRESHOLD_TOKENS {
            let parts = split_oversized(&candidate.text, SUB_CHUNK_TOKENS);
            let part_count = parts.len();
            let mut records = Vec::with_capacity(part_count);
            for (index, part) in parts.into_iter().enumerate() {
                let part_id = format!("{}-part-{}", candidate.chunk_id, index + 1);
                match embed_one(embedder.as_ref(), &part, &candidate, &part_id).await {
                    Ok(record) => records.push(record),
                    Err(err) => {
                        return ChunkOutcome::Failed {
                            chunk_id: candidate.chunk_id,
                            reason: err.to_string(),
                        };
                    }
                }
            }
            return ChunkOutcome::Split {
                chunk_id: candidate.chunk_id,
                records,
                parts: part_count,
            };
        }
    }

    let chunk_id = candidate.chunk_id.clone();
    match embed_one(embedder.as_ref(), &candidate.text, &candidate, &chunk_id).await {
        Ok(record) => ChunkOutcome::Success {
            records: vec![record],
        },
        Err(err) => ChunkOutcome::Failed {
            chunk_id,
            reason: err.to_string(),
        },
    }
}

async fn embed_one(
    embedder: &dyn Embedder,
    text: &str,
    candidate: &ChunkCandidate,
    chunk_id: &str,
) -> Result<VectorRecord, RagError> {
    let vector = embedder.embed(text).await?;
    let mut metadata = candidate.metadata.clone();
    metadata.insert("chunk_id".to_string(), chunk_id.to_string());
    Ok(VectorRecord::new(Uuid::new_v4().to_string(), vector, text).with_metadata(metadata))
}

/// Splits an oversized chunk by lines into parts within `max_tokens`,
/// replicating the header block (leading non-blank lines, up to
/// [`HEADER_MAX_LINES`]) onto every part so context metadata is not lost.
pub(crate) fn split_oversized(text: &str, max_tokens: usize) -> Vec<String> {
    if estimate_tokens(text) <= max_tokens {
        return vec![text.to_string()];
    }

    let lines: Vec<&str> = text.lines().collect();
    let mut header_len = lines
        .iter()
        .take(HEADER_MAX_LINES)
        .take_while(|line| !line.trim().is_empty())
        .count();
    // A header that swallows the whole text leaves nothing to split.
    if header_len == lines.len() {
        header_len = 0;
    }
    let header = lines[..header_len].join("\n");

    let mut parts = Vec::new();
    let mut current = header.clone();
    for line in &lines[header_len..] {
        let projected = estimate_tokens(&current) + estimate_tokens(line) + 1;
        if projected > max_tokens && current.len() > header.len() {
            parts.push(std::mem::replace(&mut current, header.clone()));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if current.len() > header.len() || parts.is_empty() {
        parts.push(current);
    }
    parts
}

/// Expands source texts into chunk candidates via the text chunking engine.
fn text_candidates(
    source: &str,
    kind: &str,
    texts: Vec<(String, BTreeMap<String, String>)>,
    strategy: ChunkingStrategy,
) -> Vec<ChunkCandidate> {
    let mut candidates = Vec::new();
    for (text, extra) in texts {
        let parent_id = content_hash(&text);
        for (index, sub_chunk) in chunking::chunk(&text, strategy).into_iter().enumerate() {
            let trimmed = sub_chunk.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut metadata = extra.clone();
            metadata.insert("source".to_string(), source.to_string());
            metadata.insert("type".to_string(), kind.to_string());
            metadata.insert("chunking_strategy".to_string(), strategy.name().to_string());
            metadata.insert("parent_chunk_id".to_string(), parent_id.clone());
            metadata.insert("sub_chunk_index".to_string(), index.to_string());
            candidates.push(ChunkCandidate {
                chunk_id: format!("{parent_id}-{index}"),
                text: trimmed.to_string(),
                metadata,
                police_size: false,
            });
        }
    }
    candidates
}

fn content_hash(text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
