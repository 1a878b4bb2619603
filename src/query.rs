//! Retrieval-augmented answering over the vector index.
//!
//! One query runs embed, KNN search, an optional structured graph-query
//! branch, then a single grounded generation call. The returned report is a
//! transcript: similarity scores, the retrieved context blocks, any graph
//! query results, and the model's answer under an `=== AI RESPONSE ===`
//! marker.

use std::sync::Arc;

use tracing::{info, warn};

use crate::chunking::ChunkingStrategy;
use crate::embeddings::Embedder;
use crate::generation::Generator;
use crate::graph::{GraphSource, QueryRow};
use crate::stores::VectorStore;
use crate::types::RagError;

/// Returned verbatim when the search yields nothing; no generation call is
/// made in that case.
pub const NO_RESULTS_MESSAGE: &str = "No relevant information found in the knowledge base.";

/// Appended to the context when the structured branch fails; the failure
/// never aborts the query.
const GRAPH_FAILURE_NOTE: &str = "\n[Note: Graph query execution failed]\n\n";

/// Questions containing any of these trigger the structured graph branch.
const GRAPH_QUERY_HINTS: &[&str] = &["find", "show", "list", "get", "how many", "count"];

/// End-to-end query pipeline: embed, retrieve, optionally query the graph,
/// generate.
pub struct QueryPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn Generator>,
    graph: Option<Arc<dyn GraphSource>>,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            graph: None,
        }
    }

    /// Attaches a graph collaborator, enabling the structured branch for
    /// questions that look like graph queries.
    #[must_use]
    pub fn with_graph(mut self, graph: Arc<dyn GraphSource>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Answers one question against the index. `strategy` only labels the
    /// scores header; it does not influence retrieval.
    pub async fn answer(
        &self,
        question: &str,
        top_k: usize,
        strategy: ChunkingStrategy,
    ) -> Result<String, RagError> {
        info!(question, top_k, "executing query");

        let query_vector = self.embedder.embed(question).await?;
        let results = self.store.search(&query_vector, top_k).await?;
        if results.is_empty() {
            return Ok(NO_RESULTS_MESSAGE.to_string());
        }

        let mut scores = format!("=== SIMILARITY SCORES (Chunking: {}) ===\n", strategy.name());
        for (index, result) in results.iter().enumerate() {
            scores.push_str(&format!("Result {}: {:.4}\n", index + 1, result.score));
        }
        scores.push('\n');

        let mut context = String::new();
        for (index, result) in results.iter().enumerate() {
            context.push_str(&format!(
                "--- Context {} (Similarity: {:.4}) ---\n{}\n\n",
                index + 1,
                result.score,
                result.text
            ));
        }

        let graph_context = match (&self.graph, wants_graph_query(question)) {
            (Some(graph), true) => match self.structured_context(graph.as_ref(), question).await {
                Ok(rendered) => rendered,
                Err(err) => {
                    warn!(error = %err, "graph query branch failed");
                    GRAPH_FAILURE_NOTE.to_string()
                }
            },
            _ => String::new(),
        };

        let answer = self
            .generate_answer(question, &format!("{context}{graph_context}"))
            .await?;
        Ok(format!(
            "{scores}{context}{graph_context}\n=== AI RESPONSE ===\n{answer}"
        ))
    }

    /// The structured branch: translate the question into a graph query via
    /// the generator, execute it, render the rows. Any failure surfaces as
    /// an error for the caller to convert into the fallback note.
    async fn structured_context(
        &self,
        graph: &dyn GraphSource,
        question: &str,
    ) -> Result<String, RagError> {
        let schema = graph.describe_schema().await?;
        let prompt = format!(
            "Given this graph schema:\n{schema}\n\n\
             Generate a Cypher query to answer: {question}\n\n\
             Return ONLY the Cypher query without explanation."
        );

        let raw = self.generator.complete(&prompt).await?;
        let query = strip_code_fences(&raw);
        info!(query, "generated graph query");

        let rows = graph.execute_query(&query).await?;
        Ok(format!(
            "\n--- Graph Query Results ---\n{}\n\n",
            format_rows(&rows)
        ))
    }

    async fn generate_answer(&self, question: &str, context: &str) -> Result<String, RagError> {
        let prompt = format!(
            "Answer the following question based on the provided context. \
             If the context doesn't contain enough information, say so.\n\n\
             Context:\n{context}\n\n\
             Question: {question}\n\n\
             Answer:"
        );
        self.generator.complete(&prompt).await
    }
}

/// Lexical gate for the structured branch, case-insensitive.
pub(crate) fn wants_graph_query(question: &str) -> bool {
    let lowered = question.to_lowercase();
    GRAPH_QUERY_HINTS.iter().any(|hint| lowered.contains(hint))
}

/// Models often wrap generated queries in markdown fences; strip them.
pub(crate) fn strip_code_fences(raw: &str) -> String {
    raw.trim()
        .replace("```cypher", "")
        .replace("```", "")
        .trim()
        .to_string()
}

pub(crate) fn format_rows(rows: &[QueryRow]) -> String {
    if rows.is_empty() {
        return "No results found.".to_string();
    }
    let mut rendered = String::new();
    for (index, row) in rows.iter().enumerate() {
        let row_json = serde_json::Value::Object(row.clone());
        rendered.push_str(&format!("Result {}: {}\n", index + 1, row_json));
    }
    rendered
}
