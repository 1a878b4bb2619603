//! Text-generation provider client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use url::Url;

use crate::embeddings::extract_model_name;
use crate::types::RagError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
// Generation responses are much slower than embeddings.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Uniform completion interface consumed by the query pipeline.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Sends one user prompt and returns the single text completion.
    async fn complete(&self, prompt: &str) -> Result<String, RagError>;
}

/// HTTP chat-completion client.
///
/// Wire contract: POST `{model, messages: [{role, content}]}` with bearer
/// auth; a non-2xx response maps to
/// [`RagError::GenerationRequestFailed`] carrying the status.
#[derive(Clone, Debug)]
pub struct GenerationClient {
    client: reqwest::Client,
    model: String,
    api_key: String,
    base: Url,
}

impl GenerationClient {
    /// Creates a client from a model selection string (the provider suffix,
    /// if present, is stripped) and API credential.
    pub fn new(model_selection: &str, api_key: impl Into<String>) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            model: extract_model_name(model_selection),
            api_key: api_key.into(),
            base: Url::parse("https://api.openai.com").expect("static url"),
        })
    }

    /// Overrides the endpoint base, for tests against a mock server.
    #[must_use]
    pub fn with_base(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Generator for GenerationClient {
    async fn complete(&self, prompt: &str) -> Result<String, RagError> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let url = self
            .base
            .join("/v1/chat/completions")
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
            return Err(RagError::GenerationRequestFailed {
                status: status.as_u16(),
            });
        }

        let payload: Value = response.json().await?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                RagError::MalformedResponse(
                    "missing choices[0].message.content".to_string(),
                )
            })
    }
}
