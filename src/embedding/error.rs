use std::path::PathBuf;
use thiserror::Error;

use crate::error::{Classified, ErrorKind};

/// Failures while loading or running a local checkpoint.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("checkpoint file missing: {path}")]
    MissingFile { path: PathBuf },

    #[error("checkpoint could not be loaded: {reason}")]
    Load { reason: String },

    #[error("forward pass failed: {reason}")]
    Inference { reason: String },

    #[error("tokenizer rejected input: {reason}")]
    Tokenizer { reason: String },

    #[error("unusable encoder settings: {reason}")]
    Settings { reason: String },
}

impl Classified for EmbeddingError {
    /// Query-time failures map to search; everything else happens while the index is built.
    fn kind(&self) -> ErrorKind {
        match self {
            EmbeddingError::Inference { .. } | EmbeddingError::Tokenizer { .. } => {
                ErrorKind::SemanticSearch
            }
            EmbeddingError::MissingFile { .. }
            | EmbeddingError::Load { .. }
            | EmbeddingError::Settings { .. } => ErrorKind::VectorIndexBuild,
        }
    }
}

impl From<candle_core::Error> for EmbeddingError {
    fn from(err: candle_core::Error) -> Self {
        EmbeddingError::Inference {
            reason: err.to_string(),
        }
    }
}
