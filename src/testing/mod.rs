// Deterministic stand-ins for the external services, shared by unit tests

use parking_lot::Mutex;

use crate::embeddings::{Embedder, Embedding, validate_text};
use crate::generation::Generator;
use crate::{Result, SupportError};

/// Bag-of-words embedder: each lowercase word is hashed into one of `dimension` buckets and
/// the counts are normalised to unit length
#[derive(Debug)]
pub struct HashingEmbedder {
    dimension: usize,
    calls: Mutex<usize>,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str, _model_id: &str) -> Result<Embedding> {
        validate_text(text)?;
        *self.calls.lock() += 1;

        let mut vector = vec![0.0_f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = fnv1a(&word.to_lowercase()) as usize % self.dimension;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Embedder whose service is always down
#[derive(Debug, Default)]
pub struct UnavailableEmbedder;

impl Embedder for UnavailableEmbedder {
    fn embed(&self, _text: &str, _model_id: &str) -> Result<Embedding> {
        Err(SupportError::ExternalService {
            service: "embedding",
            message: "HTTP 503: service unavailable".to_string(),
            retryable: true,
        })
    }
}

/// Generator that records each prompt and replies with a fixed text
#[derive(Debug)]
pub struct RecordingGenerator {
    reply: String,
    prompts: Mutex<Vec<(String, String, f32)>>,
}

impl RecordingGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<(String, String, f32)> {
        self.prompts.lock().clone()
    }
}

impl Generator for RecordingGenerator {
    fn generate(&self, system_prompt: &str, user_prompt: &str, temperature: f32) -> Result<String> {
        self.prompts.lock().push((
            system_prompt.to_string(),
            user_prompt.to_string(),
            temperature,
        ));
        Ok(self.reply.clone())
    }
}
