use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::{EmbeddingError, RerankerError};
use crate::error::{Classified, ErrorKind};

/// Errors raised by the retrieval engine.
///
/// Only initialization failures escape [`crate::knowledge::KnowledgeEngine::search`];
/// per-query failures are recovered through the lexical fallback.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("knowledge base not found: {path}")]
    KnowledgeBaseNotFound { path: PathBuf },

    #[error("knowledge source {path} is not valid JSON: {reason}")]
    InvalidSource { path: PathBuf, reason: String },

    #[error("failed to build vector index: {reason}")]
    IndexBuild { reason: String },

    #[error("index snapshot error: {reason}")]
    Snapshot { reason: String },

    #[error("semantic search failed: {reason}")]
    Search { reason: String },

    #[error("knowledge I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Classified for KnowledgeError {
    fn kind(&self) -> ErrorKind {
        match self {
            KnowledgeError::KnowledgeBaseNotFound { .. } => ErrorKind::KnowledgeBaseNotFound,
            KnowledgeError::Search { .. } => ErrorKind::SemanticSearch,
            KnowledgeError::InvalidSource { .. }
            | KnowledgeError::IndexBuild { .. }
            | KnowledgeError::Snapshot { .. }
            | KnowledgeError::Io(_) => ErrorKind::VectorIndexBuild,
        }
    }
}

impl From<EmbeddingError> for KnowledgeError {
    fn from(err: EmbeddingError) -> Self {
        match err.kind() {
            ErrorKind::SemanticSearch => KnowledgeError::Search {
                reason: err.to_string(),
            },
            _ => KnowledgeError::IndexBuild {
                reason: err.to_string(),
            },
        }
    }
}

impl From<RerankerError> for KnowledgeError {
    fn from(err: RerankerError) -> Self {
        KnowledgeError::Search {
            reason: err.to_string(),
        }
    }
}

/// Result alias for knowledge operations.
pub type KnowledgeResult<T> = Result<T, KnowledgeError>;
