use thiserror::Error;

use crate::embedding::error::EmbeddingError;
use crate::error::{Classified, ErrorKind};

#[derive(Debug, Error)]
pub enum RerankerError {
    /// The cross-encoder checkpoint could not be opened.
    #[error("cross-encoder unavailable: {0}")]
    Checkpoint(#[from] EmbeddingError),

    #[error("invalid reranker settings: {reason}")]
    Settings { reason: String },

    /// A query-candidate pair could not be scored.
    #[error("relevance scoring failed: {reason}")]
    Scoring { reason: String },
}

impl RerankerError {
    pub fn scoring(reason: impl Into<String>) -> Self {
        RerankerError::Scoring {
            reason: reason.into(),
        }
    }
}

impl Classified for RerankerError {
    fn kind(&self) -> ErrorKind {
        match self {
            RerankerError::Checkpoint(inner) => inner.kind(),
            RerankerError::Settings { .. } => ErrorKind::Configuration,
            RerankerError::Scoring { .. } => ErrorKind::SemanticSearch,
        }
    }
}

impl From<candle_core::Error> for RerankerError {
    fn from(err: candle_core::Error) -> Self {
        RerankerError::scoring(err.to_string())
    }
}
