use std::time::Duration;

use thiserror::Error;

use crate::error::{Classified, ErrorKind};

/// Failure of a single chat-completion send.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model endpoint rate limited the request")]
    RateLimited { retry_after: Option<Duration> },

    #[error("model request timed out: {reason}")]
    Timeout { reason: String },

    #[error("model endpoint unreachable: {reason}")]
    Connection { reason: String },

    #[error("invalid model response: {reason}")]
    InvalidResponse { reason: String },
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// `503`, `429`, timeouts and connection failures may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Status { status, .. } => *status == 503,
            TransportError::RateLimited { .. }
            | TransportError::Timeout { .. }
            | TransportError::Connection { .. } => true,
            TransportError::InvalidResponse { .. } => false,
        }
    }
}

impl Classified for TransportError {
    fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Status { status, .. } if *status >= 500 => ErrorKind::ModelConnection,
            TransportError::Status { .. } | TransportError::InvalidResponse { .. } => {
                ErrorKind::ModelResponse
            }
            TransportError::RateLimited { .. } => ErrorKind::ModelRateLimit,
            TransportError::Timeout { .. } => ErrorKind::ModelTimeout,
            TransportError::Connection { .. } => ErrorKind::ModelConnection,
        }
    }
}
