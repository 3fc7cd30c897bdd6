use thiserror::Error;

use crate::error::{Classified, ErrorKind};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("shared cache tier unreachable: {reason}")]
    Connection { reason: String },

    #[error("cache operation failed: {reason}")]
    Operation { reason: String },

    #[error("cache serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("corrupt cache record: {reason}")]
    Corrupt { reason: String },

    #[error("invalid cache config: {reason}")]
    InvalidConfig { reason: String },

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Classified for CacheError {
    fn kind(&self) -> ErrorKind {
        match self {
            CacheError::Connection { .. } => ErrorKind::CacheConnection,
            CacheError::InvalidConfig { .. } => ErrorKind::Configuration,
            _ => ErrorKind::CacheOperation,
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
