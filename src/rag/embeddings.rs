//! Embedding generation service using OpenAI

use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client as OpenAIClient,
};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::OpenAISettings;
use crate::pipeline::stages::Embedder;
use crate::pipeline::types::QueryVector;
use crate::{Error, Result};

/// Inputs longer than this are cut before embedding.
const MAX_INPUT_CHARS: usize = 8000;

/// Service for generating text embeddings
pub struct EmbeddingService {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
}

impl EmbeddingService {
    /// Create from settings.
    pub fn new(settings: &OpenAISettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(Error::ConfigError("OPENAI_API_KEY is not set".to_string()));
        }

        let config = OpenAIConfig::new()
            .with_api_key(settings.api_key.clone())
            .with_api_base(settings.api_base.clone());

        Ok(Self {
            client: OpenAIClient::with_config(config),
            model: settings.embedding_model.clone(),
        })
    }

    /// Embed several texts in one request, preserving order.
    ///
    /// Every text must be non-empty after trimming.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let processed = texts
            .iter()
            .map(|t| prepare_input(t))
            .collect::<Result<Vec<String>>>()?;

        debug!(count = processed.len(), model = %self.model, "Requesting embeddings");

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(processed))
            .build()
            .map_err(|e| Error::EmbeddingError(format!("Invalid embedding request: {}", e)))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| Error::EmbeddingError(format!("OpenAI embeddings failed: {}", e)))?;

        info!(
            count = response.data.len(),
            tokens = response.usage.total_tokens,
            "Generated embeddings"
        );

        if response.data.len() != texts.len() {
            return Err(Error::EmbeddingError(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|e| e.index);
        Ok(data.into_iter().map(|e| e.embedding).collect())
    }

    /// Embedding dimension for the configured model.
    pub fn dimension(&self) -> usize {
        dimension_for(&self.model)
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<QueryVector> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        let vector = vectors
            .pop()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::EmbeddingError("No embedding returned".to_string()))?;
        Ok(QueryVector(vector))
    }
}

/// Trim, reject empty, cut overlong input on a char boundary.
fn prepare_input(text: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::EmbeddingError("text is empty".to_string()));
    }
    Ok(trimmed.chars().take(MAX_INPUT_CHARS).collect())
}

/// Known OpenAI embedding dimensions.
pub fn dimension_for(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}
