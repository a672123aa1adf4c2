
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Embedder, Embedding, common_dimension, validate_text};
use crate::config::Config;
use crate::http::HttpClient;
use crate::{Result, SupportError};

const SERVICE: &str = "embedding";
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Client for an OpenAI-compatible `/embeddings` endpoint
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: HttpClient,
    batch_size: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub owned_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

impl OpenAiEmbedder {
    #[inline]
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = HttpClient::from_config(SERVICE, config)?;
        Ok(Self::new(client).with_batch_size(config.service.batch_size))
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// List the models the service exposes
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response: ModelsResponse = self.client.get_json("models")?;
        debug!("Service lists {} models", response.data.len());
        Ok(response.data)
    }

    /// Check the service is reachable and offers `model_id`
    #[inline]
    pub fn health_check(&self, model_id: &str) -> Result<()> {
        debug!(
            "Performing health check for {} at {}",
            model_id,
            self.client.base_url()
        );

        let models = self.list_models()?;
        if models.iter().any(|m| m.id == model_id) {
            info!("Health check passed for embedding model {}", model_id);
            return Ok(());
        }

        let available: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();
        warn!(
            "Model {} not found. Available models: {}",
            model_id,
            available.join(", ")
        );
        Err(SupportError::ExternalService {
            service: SERVICE,
            message: format!("model '{}' is not available", model_id),
            retryable: false,
        })
    }

    fn request_batch(&self, texts: &[String], model_id: &str) -> Result<Vec<Embedding>> {
        let request = EmbeddingRequest {
            model: model_id,
            input: texts,
        };
        let response: EmbeddingResponse = self.client.post_json("embeddings", &request)?;

        if response.data.len() != texts.len() {
            return Err(SupportError::ExternalService {
                service: SERVICE,
                message: format!(
                    "Mismatch between request and response counts: {} vs {}",
                    texts.len(),
                    response.data.len()
                ),
                retryable: false,
            });
        }

        // Responses carry their input index; place each one there rather than trusting order
        let mut slots: Vec<Option<Embedding>> = vec![None; texts.len()];
        for item in response.data {
            match slots.get_mut(item.index) {
                Some(slot) if slot.is_none() => *slot = Some(item.embedding),
                _ => {
                    return Err(SupportError::ExternalService {
                        service: SERVICE,
                        message: format!("response has an invalid or repeated index {}", item.index),
                        retryable: false,
                    });
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

impl Embedder for OpenAiEmbedder {
    #[inline]
    fn embed(&self, text: &str, model_id: &str) -> Result<Embedding> {
        validate_text(text)?;
        debug!("Embedding text (length: {}) with {}", text.len(), model_id);

        let mut vectors = self.request_batch(&[text.to_string()], model_id)?;
        vectors.pop().ok_or_else(|| SupportError::ExternalService {
            service: SERVICE,
            message: "response contained no embedding".to_string(),
            retryable: false,
        })
    }

    #[inline]
    fn embed_batch(&self, texts: &[String], model_id: &str) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for (row, text) in texts.iter().enumerate() {
            validate_text(text).map_err(|_| {
                SupportError::InvalidArgument(format!("row {} has empty text", row))
            })?;
        }

        debug!(
            "Embedding {} texts in batches of {}",
            texts.len(),
            self.batch_size
        );

        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            vectors.extend(self.request_batch(chunk, model_id)?);
        }
        common_dimension(&vectors)?;

        debug!("Generated {} embeddings total", vectors.len());
        Ok(vectors)
    }
}
