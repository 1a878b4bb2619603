//! Runtime configuration.
//!
//! A [`RagConfig`] carries every knob the pipelines need: graph connection
//! details, the index location, provider model selections and credentials,
//! and the active chunking strategy. Values come from the builder setters or
//! from the environment via [`RagConfig::from_env`] (a local `.env` file is
//! honored through `dotenvy`).

use crate::chunking::ChunkingStrategy;

const DEFAULT_GRAPH_URI: &str = "bolt://localhost:7687";
const DEFAULT_GRAPH_USERNAME: &str = "neo4j";
const DEFAULT_GRAPH_DATABASE: &str = "neo4j";
const DEFAULT_INDEX_PATH: &str = "./vector_index";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small (OpenAI)";
const DEFAULT_GENERATION_MODEL: &str = "gpt-4o-mini (OpenAI)";
const DEFAULT_CHUNKING_STRATEGY: &str = "WordChunking";

/// Resolved settings for one pipeline instance.
#[derive(Clone, Debug)]
pub struct RagConfig {
    pub graph_uri: String,
    pub graph_username: String,
    pub graph_password: String,
    pub graph_database: String,
    /// Directory or file path of the persistent vector index.
    pub index_path: String,
    /// Embedding model selection, e.g. `"text-embedding-3-small (OpenAI)"`.
    /// The parenthesized suffix picks the provider.
    pub embedding_model: String,
    pub embedding_api_key: String,
    /// Generation model selection, same suffix convention.
    pub generation_model: String,
    pub generation_api_key: String,
    /// Chunking strategy name; unknown names fall back to word chunking.
    pub chunking_strategy: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            graph_uri: DEFAULT_GRAPH_URI.to_string(),
            graph_username: DEFAULT_GRAPH_USERNAME.to_string(),
            graph_password: String::new(),
            graph_database: DEFAULT_GRAPH_DATABASE.to_string(),
            index_path: DEFAULT_INDEX_PATH.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_api_key: String::new(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            generation_api_key: String::new(),
            chunking_strategy: DEFAULT_CHUNKING_STRATEGY.to_string(),
        }
    }
}

impl RagConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads settings from the environment, falling back to defaults for
    /// anything unset. Loads a `.env` file first when one is present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let get = |key: &str, fallback: &str| {
            std::env::var(key).unwrap_or_else(|_| fallback.to_string())
        };
        Self {
            graph_uri: get("ONTORAG_GRAPH_URI", DEFAULT_GRAPH_URI),
            graph_username: get("ONTORAG_GRAPH_USERNAME", DEFAULT_GRAPH_USERNAME),
            graph_password: get("ONTORAG_GRAPH_PASSWORD", ""),
            graph_database: get("ONTORAG_GRAPH_DATABASE", DEFAULT_GRAPH_DATABASE),
            index_path: get("ONTORAG_INDEX_PATH", DEFAULT_INDEX_PATH),
            embedding_model: get("ONTORAG_EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            embedding_api_key: get("ONTORAG_EMBEDDING_API_KEY", ""),
            generation_model: get("ONTORAG_GENERATION_MODEL", DEFAULT_GENERATION_MODEL),
            generation_api_key: get("ONTORAG_GENERATION_API_KEY", ""),
            chunking_strategy: get("ONTORAG_CHUNKING_STRATEGY", DEFAULT_CHUNKING_STRATEGY),
        }
    }

    /// The configured strategy, resolved to the enum (unknown names warn and
    /// fall back to word chunking).
    pub fn strategy(&self) -> ChunkingStrategy {
        ChunkingStrategy::from_name(&self.chunking_strategy)
    }

    #[must_use]
    pub fn with_graph_uri(mut self, uri: impl Into<String>) -> Self {
        self.graph_uri = uri.into();
        self
    }

    #[must_use]
    pub fn with_graph_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.graph_username = username.into();
        self.graph_password = password.into();
        self
    }

    #[must_use]
    pub fn with_graph_database(mut self, database: impl Into<String>) -> Self {
        self.graph_database = database.into();
        self
    }

    #[must_use]
    pub fn with_index_path(mut self, path: impl Into<String>) -> Self {
        self.index_path = path.into();
        self
    }

    #[must_use]
    pub fn with_embedding_model(
        mut self,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        self.embedding_model = model.into();
        self.embedding_api_key = api_key.into();
        self
    }

    #[must_use]
    pub fn with_generation_model(
        mut self,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        self.generation_model = model.into();
        self.generation_api_key = api_key.into();
        self
    }

    #[must_use]
    pub fn with_chunking_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.chunking_strategy = strategy.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = RagConfig::default();
        assert_eq!(config.graph_uri, "bolt://localhost:7687");
        assert_eq!(config.index_path, "./vector_index");
        assert_eq!(config.embedding_model, "text-embedding-3-small (OpenAI)");
        assert_eq!(config.generation_model, "gpt-4o-mini (OpenAI)");
        assert_eq!(config.strategy(), ChunkingStrategy::Word);
    }

    #[test]
    fn unknown_strategy_names_fall_back_to_word() {
        let config = RagConfig::default().with_chunking_strategy("HolographicChunking");
        assert_eq!(config.strategy(), ChunkingStrategy::Word);
    }

    #[test]
    fn builder_setters_compose() {
        let config = RagConfig::new()
            .with_graph_uri("bolt://graph:7687")
            .with_graph_credentials("reader", "secret")
            .with_index_path("/tmp/idx")
            .with_chunking_strategy("ParagraphChunking");
        assert_eq!(config.graph_uri, "bolt://graph:7687");
        assert_eq!(config.graph_username, "reader");
        assert_eq!(config.graph_password, "secret");
        assert_eq!(config.index_path, "/tmp/idx");
        assert_eq!(config.strategy(), ChunkingStrategy::Paragraph);
    }
}
