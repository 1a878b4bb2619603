//! Embedding generation over pluggable providers.
//!
//! [`Embedder`] is the uniform interface the pipelines consume. The concrete
//! [`EmbeddingClient`] dispatches over a closed provider set and normalizes
//! every provider's native output to a fixed store-facing dimension; the
//! deterministic [`MockEmbedder`] backs tests without any network.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::types::RagError;

/// Store-facing dimension every [`EmbeddingClient`] commits to producing.
/// Native provider output longer than this is truncated at the client
/// boundary; the store's own cap shares the same value.
pub const TARGET_DIMENSION: usize = 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Uniform embedding interface.
///
/// `embed_batch` defaults to sequential single calls; only positional
/// correspondence between inputs and outputs is guaranteed. No retry happens
/// at this level — a provider error aborts the single call it belongs to.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// The dimension this embedder commits to producing.
    fn dimension(&self) -> usize;
}

/// Closed set of embedding providers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    OpenAi,
    Cohere,
    Local,
}

impl EmbeddingProvider {
    /// Determines the provider from a free-form model selection string such
    /// as `"text-embedding-3-small (OpenAI)"`. Matching is case-sensitive
    /// keyword containment; no match defaults to OpenAI.
    pub fn from_selection(selection: &str) -> Self {
        if selection.contains("OpenAI") {
            EmbeddingProvider::OpenAi
        } else if selection.contains("Cohere") {
            EmbeddingProvider::Cohere
        } else if selection.contains("Local") {
            EmbeddingProvider::Local
        } else {
            EmbeddingProvider::OpenAi
        }
    }
}

/// Extracts the bare model name from a selection like
/// `"text-embedding-3-small (OpenAI)"`.
pub(crate) fn extract_model_name(selection: &str) -> String {
    match selection.find('(') {
        Some(idx) => selection[..idx].trim().to_string(),
        None => selection.trim().to_string(),
    }
}

/// HTTP-backed embedding client with provider dispatch.
///
/// Built from the opaque model-selection string and credential supplied by
/// the configuration surface. The base URLs are overridable so wire-contract
/// tests can point at a mock server.
#[derive(Clone, Debug)]
pub struct EmbeddingClient {
    client: reqwest::Client,
    provider: EmbeddingProvider,
    model: String,
    api_key: String,
    openai_base: Url,
    cohere_base: Url,
}

impl EmbeddingClient {
    /// Creates a client from a model selection string and API credential.
    pub fn new(model_selection: &str, api_key: impl Into<String>) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            provider: EmbeddingProvider::from_selection(model_selection),
            model: extract_model_name(model_selection),
            api_key: api_key.into(),
            openai_base: Url::parse("https://api.openai.com").expect("static url"),
            cohere_base: Url::parse("https://api.cohere.ai").expect("static url"),
        })
    }

    /// Overrides the OpenAI endpoint base, for tests against a mock server.
    #[must_use]
    pub fn with_openai_base(mut self, base: Url) -> Self {
        self.openai_base = base;
        self
    }

    /// Overrides the Cohere endpoint base, for tests against a mock server.
    #[must_use]
    pub fn with_cohere_base(mut self, base: Url) -> Self {
        self.cohere_base = base;
        self
    }

    pub fn provider(&self) -> EmbeddingProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn embed_openai(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut body = json!({
            "model": self.model,
            "input": text,
        });
        // Newer models accept a requested output size directly.
        if self.model.starts_with("text-embedding-3-") {
            body["dimensions"] = json!(TARGET_DIMENSION);
        }

        let url = self
            .openai_base
            .join("/v1/embeddings")
            .map_err(|err| RagError::Transport(err.to_string()))?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagError::EmbeddingRequestFailed {
                status: status.as_u16(),
            });
        }

        let payload: Value = response.json().await?;
        let values = payload["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| {
                RagError::MalformedResponse("missing data[0].embedding array".to_string())
            })?;
        collect_floats(values)
    }

    async fn embed_cohere(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let body = json!({
            "model": self.model,
            "texts": [text],
            "input_type": "search_document",
        });

        let url = self
            .cohere_base
            .join("/v1/embed")
            .map_err(|err| RagError::Transport(err.to_string()))?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagError::EmbeddingRequestFailed {
                status: status.as_u16(),
            });
        }

        let payload: Value = response.json().await?;
        let values = payload["embeddings"][0].as_array().ok_or_else(|| {
            RagError::MalformedResponse("missing embeddings[0] array".to_string())
        })?;
        collect_floats(values)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vector = match self.provider {
            EmbeddingProvider::OpenAi => self.embed_openai(text).await?,
            EmbeddingProvider::Cohere => self.embed_cohere(text).await?,
            EmbeddingProvider::Local => pseudo_embedding(text, TARGET_DIMENSION),
        };

        if vector.len() > TARGET_DIMENSION {
            debug!(
                native = vector.len(),
                target = TARGET_DIMENSION,
                "truncating native embedding to target dimension"
            );
            vector.truncate(TARGET_DIMENSION);
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        TARGET_DIMENSION
    }
}

fn collect_floats(values: &[Value]) -> Result<Vec<f32>, RagError> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| RagError::MalformedResponse("non-numeric embedding value".to_string()))
        })
        .collect()
}

/// Deterministic pseudo-embedding seeded from the text's bytes.
///
/// Backs the `Local` provider (no network involved) and [`MockEmbedder`].
/// Identical text always maps to the identical vector; values lie in [0, 1).
fn pseudo_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut seed: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.bytes() {
        seed ^= u64::from(byte);
        seed = seed.wrapping_mul(0x0000_0100_0000_01b3);
    }

    let mut state = seed;
    (0..dimension)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            ((state >> 33) as f32) / ((1u64 << 31) as f32)
        })
        .collect()
}

/// Deterministic in-process embedder for tests and offline runs.
#[derive(Clone, Debug)]
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(TARGET_DIMENSION)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(pseudo_embedding(text, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_selection_matches_keywords() {
        assert_eq!(
            EmbeddingProvider::from_selection("text-embedding-3-small (OpenAI)"),
            EmbeddingProvider::OpenAi
        );
        assert_eq!(
            EmbeddingProvider::from_selection("embed-english-v3.0 (Cohere)"),
            EmbeddingProvider::Cohere
        );
        assert_eq!(
            EmbeddingProvider::from_selection("all-minilm (Local)"),
            EmbeddingProvider::Local
        );
        // Case-sensitive containment; no match defaults to OpenAI.
        assert_eq!(
            EmbeddingProvider::from_selection("mystery-model"),
            EmbeddingProvider::OpenAi
        );
    }

    #[test]
    fn model_name_is_stripped_of_provider_suffix() {
        assert_eq!(
            extract_model_name("text-embedding-3-small (OpenAI)"),
            "text-embedding-3-small"
        );
        assert_eq!(extract_model_name("bare-model"), "bare-model");
    }

    #[tokio::test]
    async fn mock_embeddings_are_deterministic_and_distinct() {
        let embedder = MockEmbedder::new(64);
        let a1 = embedder.embed("hello world").await.unwrap();
        let a2 = embedder.embed("hello world").await.unwrap();
        let b = embedder.embed("goodbye world").await.unwrap();

        assert_eq!(a1.len(), 64);
        assert_eq!(a1, a2, "identical text must embed identically");
        assert_ne!(a1, b, "different text should embed differently");
    }

    #[tokio::test]
    async fn batch_preserves_positional_correspondence() {
        let embedder = MockEmbedder::new(16);
        let texts = vec!["one".to_string(), "two".to_string(), "one".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], batch[2]);
        assert_ne!(batch[0], batch[1]);
    }

    #[tokio::test]
    async fn local_provider_needs_no_network() {
        let client = EmbeddingClient::new("all-minilm (Local)", "unused").unwrap();
        let vector = client.embed("offline text").await.unwrap();
        assert_eq!(vector.len(), TARGET_DIMENSION);
        let again = client.embed("offline text").await.unwrap();
        assert_eq!(vector, again);
    }
}
