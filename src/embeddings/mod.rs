// Embeddings module
// Turns text into fixed-dimension vectors through an external embedding service

#[cfg(test)]
mod tests;

pub mod openai;

pub use openai::OpenAiEmbedder;

use crate::{Result, SupportError};

pub type Embedding = Vec<f32>;

/// Converts text into vectors of one fixed dimension per model.
///
/// Implementations surface service failures as errors; retrying is the caller's decision.
pub trait Embedder {
    fn embed(&self, text: &str, model_id: &str) -> Result<Embedding>;

    /// Embed a full column in one ordered pass. The returned vectors line up one-to-one with
    /// `texts`, and that order is the identifier scheme of the index.
    #[inline]
    fn embed_batch(&self, texts: &[String], model_id: &str) -> Result<Vec<Embedding>> {
        texts.iter().map(|text| self.embed(text, model_id)).collect()
    }
}

impl<T: Embedder + ?Sized> Embedder for &T {
    #[inline]
    fn embed(&self, text: &str, model_id: &str) -> Result<Embedding> {
        (**self).embed(text, model_id)
    }

    #[inline]
    fn embed_batch(&self, texts: &[String], model_id: &str) -> Result<Vec<Embedding>> {
        (**self).embed_batch(texts, model_id)
    }
}

/// Reject text that cannot produce a meaningful embedding
#[inline]
pub fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(SupportError::InvalidArgument(
            "cannot embed empty text".to_string(),
        ));
    }
    Ok(())
}

/// Check every vector has the same dimension and return it
#[inline]
pub fn common_dimension(embeddings: &[Embedding]) -> Result<Option<usize>> {
    let Some(first) = embeddings.first() else {
        return Ok(None);
    };
    let expected = first.len();
    if let Some(odd) = embeddings.iter().find(|e| e.len() != expected) {
        return Err(SupportError::DimensionMismatch {
            expected,
            actual: odd.len(),
        });
    }
    Ok(Some(expected))
}
