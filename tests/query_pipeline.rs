//! Query pipeline tests over a temporary index: retrieval-only fallback,
//! the structured graph branch, and transcript composition.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use ontorag::embeddings::MockEmbedder;
use ontorag::generation::Generator;
use ontorag::graph::{GraphChunk, GraphSource, QueryRow};
use ontorag::query::NO_RESULTS_MESSAGE;
use ontorag::stores::SqliteVectorStore;
use ontorag::{ChunkingStrategy, IndexingPipeline, QueryPipeline, RagError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

/// Counts completion calls; answers Cypher-translation prompts with a
/// fenced query and everything else with a fixed reply.
struct ScriptedGenerator {
    calls: AtomicUsize,
    reply: String,
}

impl ScriptedGenerator {
    fn new(reply: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reply: reply.to_string(),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("Generate a Cypher query") {
            return Ok("```cypher\nMATCH (n) RETURN n.name AS name LIMIT 5\n```".to_string());
        }
        Ok(self.reply.clone())
    }
}

struct StubGraph {
    rows: Result<Vec<QueryRow>, String>,
}

impl StubGraph {
    fn with_rows(rows: Vec<QueryRow>) -> Self {
        Self { rows: Ok(rows) }
    }

    fn failing(message: &str) -> Self {
        Self {
            rows: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl GraphSource for StubGraph {
    async fn execute_query(&self, _query: &str) -> Result<Vec<QueryRow>, RagError> {
        match &self.rows {
            Ok(rows) => Ok(rows.clone()),
            Err(message) => Err(RagError::GraphQuery(message.clone())),
        }
    }

    async fn describe_schema(&self) -> Result<String, RagError> {
        Ok("Node labels: [Case, Statute]\nRelationships: [CITES]".to_string())
    }

    async fn chunk_candidates(&self) -> Result<Vec<GraphChunk>, RagError> {
        Ok(Vec::new())
    }
}

async fn seeded_store(dir: &TempDir, embedder: Arc<MockEmbedder>) -> Arc<SqliteVectorStore> {
    init_tracing();
    let path = dir.path().join("index.db");
    let store = Arc::new(
        SqliteVectorStore::open(&path, 64)
            .await
            .expect("open store"),
    );
    let pipeline = IndexingPipeline::new(embedder, store.clone());
    let graph = SeedGraph;
    pipeline
        .index_graph(&graph, ChunkingStrategy::Word)
        .await
        .expect("seed index");
    store
}

struct SeedGraph;

#[async_trait]
impl GraphSource for SeedGraph {
    async fn execute_query(&self, _query: &str) -> Result<Vec<QueryRow>, RagError> {
        Ok(Vec::new())
    }

    async fn describe_schema(&self) -> Result<String, RagError> {
        Ok(String::new())
    }

    async fn chunk_candidates(&self) -> Result<Vec<GraphChunk>, RagError> {
        Ok(vec![
            GraphChunk::new("Contracts require offer and acceptance"),
            GraphChunk::new("A statute may be cited by many cases"),
        ])
    }
}

#[tokio::test]
async fn empty_index_short_circuits_without_generation() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("index.db");
    let store = Arc::new(
        SqliteVectorStore::open(&path, 64)
            .await
            .expect("open store"),
    );
    let generator = Arc::new(ScriptedGenerator::new("unused"));
    let pipeline = QueryPipeline::new(
        Arc::new(MockEmbedder::new(64)),
        store,
        generator.clone(),
    );

    let answer = pipeline
        .answer("What is a contract?", 5, ChunkingStrategy::Word)
        .await
        .expect("answer");
    assert_eq!(answer, NO_RESULTS_MESSAGE);
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn transcript_composes_scores_context_and_answer() {
    let dir = TempDir::new().expect("tempdir");
    let embedder = Arc::new(MockEmbedder::new(64));
    let store = seeded_store(&dir, embedder.clone()).await;
    let generator = Arc::new(ScriptedGenerator::new("Offer and acceptance are required."));
    let pipeline = QueryPipeline::new(embedder, store, generator.clone());

    // No retrieval verb, so the graph branch must stay out of the picture.
    let answer = pipeline
        .answer("What is required for a contract?", 2, ChunkingStrategy::Word)
        .await
        .expect("answer");

    assert!(answer.starts_with("=== SIMILARITY SCORES (Chunking: WordChunking) ===\n"));
    assert!(answer.contains("--- Context 1 (Similarity: "));
    assert!(answer.contains("\n=== AI RESPONSE ===\n"));
    assert!(answer.ends_with("Offer and acceptance are required."));
    assert!(!answer.contains("Graph Query Results"));
    assert_eq!(generator.call_count(), 1);
}

#[tokio::test]
async fn graph_branch_renders_query_results() {
    let dir = TempDir::new().expect("tempdir");
    let embedder = Arc::new(MockEmbedder::new(64));
    let store = seeded_store(&dir, embedder.clone()).await;
    let generator = Arc::new(ScriptedGenerator::new("There are two cases."));

    let mut row = QueryRow::new();
    row.insert("name".to_string(), serde_json::json!("Case 42"));
    let graph = Arc::new(StubGraph::with_rows(vec![row]));
    let pipeline =
        QueryPipeline::new(embedder, store, generator.clone()).with_graph(graph);

    let answer = pipeline
        .answer("How many cases cite this statute?", 2, ChunkingStrategy::Word)
        .await
        .expect("answer");

    assert!(answer.contains("--- Graph Query Results ---"));
    assert!(answer.contains("Result 1: {\"name\":\"Case 42\"}"));
    // One call translates the question, one produces the answer.
    assert_eq!(generator.call_count(), 2);
}

#[tokio::test]
async fn graph_failures_degrade_to_a_note() {
    let dir = TempDir::new().expect("tempdir");
    let embedder = Arc::new(MockEmbedder::new(64));
    let store = seeded_store(&dir, embedder.clone()).await;
    let generator = Arc::new(ScriptedGenerator::new("Cannot tell from the context."));
    let graph = Arc::new(StubGraph::failing("connection refused"));
    let pipeline =
        QueryPipeline::new(embedder, store, generator.clone()).with_graph(graph);

    let answer = pipeline
        .answer("Find all cases from 2020", 2, ChunkingStrategy::Word)
        .await
        .expect("answer");

    assert!(answer.contains("[Note: Graph query execution failed]"));
    assert!(answer.contains("\n=== AI RESPONSE ===\n"));
    assert!(answer.ends_with("Cannot tell from the context."));
}

#[tokio::test]
async fn without_a_graph_the_gate_words_change_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let embedder = Arc::new(MockEmbedder::new(64));
    let store = seeded_store(&dir, embedder.clone()).await;
    let generator = Arc::new(ScriptedGenerator::new("Two, per the context."));
    let pipeline = QueryPipeline::new(embedder, store, generator.clone());

    let answer = pipeline
        .answer("How many cases cite this statute?", 2, ChunkingStrategy::Word)
        .await
        .expect("answer");

    assert!(!answer.contains("Graph Query Results"));
    assert!(!answer.contains("[Note:"));
    assert_eq!(generator.call_count(), 1);
}
