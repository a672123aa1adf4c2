// Retriever
// Embeds a query and searches the shared index for its nearest corpus examples


use tracing::{debug, warn};

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::index::{Neighbors, SharedIndex};
use crate::{Result, SupportError};

#[derive(Debug, Clone)]
pub struct Retriever<E> {
    embedder: E,
    model_id: String,
    default_k: usize,
}

impl<E: Embedder> Retriever<E> {
    /// `default_k` is used when a caller does not ask for a specific number of neighbours
    #[inline]
    pub fn new(embedder: E, model_id: impl Into<String>, default_k: usize) -> Result<Self> {
        if default_k == 0 {
            return Err(SupportError::InvalidArgument(
                "default k must be a positive integer".to_string(),
            ));
        }
        Ok(Self {
            embedder,
            model_id: model_id.into(),
            default_k,
        })
    }

    #[inline]
    pub fn from_config(embedder: E, config: &Config) -> Result<Self> {
        Self::new(
            embedder,
            config.retrieval.embedding_model.clone(),
            config.retrieval.default_k,
        )
    }

    #[inline]
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    #[inline]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[inline]
    pub fn default_k(&self) -> usize {
        self.default_k
    }

    /// Embed `query` and return its `k` nearest neighbours (the default k when `None`).
    ///
    /// The embedding call happens before any index lock is taken.
    #[inline]
    pub fn retrieve(&self, query: &str, index: &SharedIndex, k: Option<usize>) -> Result<Neighbors> {
        let k = k.unwrap_or(self.default_k);
        if k == 0 {
            return Err(SupportError::InvalidArgument(
                "k must be a positive integer".to_string(),
            ));
        }
        if query.trim().is_empty() {
            return Err(SupportError::InvalidArgument("query is empty".to_string()));
        }

        let vector = self.embedder.embed(query, &self.model_id)?;
        let expected = index.dimension();
        if vector.len() != expected {
            warn!(
                "Query embedded by {} has {} dimensions but the index holds {}; was the corpus built with another model?",
                self.model_id,
                vector.len(),
                expected
            );
            return Err(SupportError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let neighbors = index.search(&vector, k)?;
        debug!(
            "Retrieved {} neighbours (k = {}) from {} vectors",
            neighbors.len(),
            k,
            index.len()
        );
        Ok(neighbors)
    }
}
