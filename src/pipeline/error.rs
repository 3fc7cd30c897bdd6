use std::path::PathBuf;

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::error::{Classified, ErrorKind};
use crate::knowledge::KnowledgeError;
use crate::llm::TransportError;

/// Failures while assembling the pipeline or running a batch file.
///
/// Per-case failures never surface here; they are reported on the `CaseOutcome`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid routing pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("batch file {path}: {source}")]
    BatchIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("batch file {path} is not a JSON list of cases: {reason}")]
    BatchFormat { path: PathBuf, reason: String },
}

impl Classified for PipelineError {
    fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Cache(e) => e.kind(),
            PipelineError::Knowledge(e) => e.kind(),
            PipelineError::Transport(e) => e.kind(),
            PipelineError::Config(_)
            | PipelineError::Pattern(_)
            | PipelineError::BatchIo { .. }
            | PipelineError::BatchFormat { .. } => ErrorKind::Configuration,
        }
    }
}
