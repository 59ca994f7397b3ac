use std::time::Duration;
use thiserror::Error;

use crate::types::ChunkId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(ChunkId),

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Generation service unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Generation produced no usable text")]
    EmptyGeneration,

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// External-dependency failures the caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::EmbeddingUnavailable(_) | Error::GenerationUnavailable(_) | Error::Timeout(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Operation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
