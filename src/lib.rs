use thiserror::Error;

pub type Result<T> = std::result::Result<T, SupportError>;

#[derive(Error, Debug)]
pub enum SupportError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load index: {0}")]
    IndexLoad(String),

    #[error("Failed to persist index: {0}")]
    IndexPersist(String),

    #[error("Dimension mismatch: index expects {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "Position {position} is out of range for a corpus of {corpus_len} records (corpus and index are out of sync)"
    )]
    OutOfRange { position: usize, corpus_len: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{service} service error: {message}")]
    ExternalService {
        service: &'static str,
        message: String,
        retryable: bool,
    },

    #[error("Timed out: {operation}")]
    Timeout { operation: String },

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl SupportError {
    /// Whether a caller-side retry policy may reasonably try the operation again
    #[inline]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ExternalService { retryable, .. } => *retryable,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

pub mod assistant;
pub mod commands;
pub mod config;
pub mod context;
pub mod corpus;
pub mod embeddings;
pub mod generation;
pub mod history;
pub mod http;
pub mod index;
pub mod indexer;
pub mod retriever;

#[cfg(test)]
mod testing;
