//! Error taxonomy shared by every component.
//!
//! Each module keeps its own `thiserror` enum. Those enums map onto the closed
//! [`ErrorKind`] set, and [`ErrorKind::policy`] is the single table that says how
//! severe a failure is and whether (and after how long) it may be retried.


use std::fmt;
use std::time::Duration;

/// Closed set of failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    KnowledgeBaseNotFound,
    VectorIndexBuild,
    SemanticSearch,
    CacheConnection,
    CacheOperation,
    ModelConnection,
    ModelTimeout,
    ModelRateLimit,
    ModelResponse,
    Configuration,
}

/// How urgently a failure needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Numeric level, `1` (low) through `4` (critical).
    pub fn level(self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }

    /// Operator action associated with this level.
    pub fn action(self) -> &'static str {
        match self {
            Severity::Critical => "alert_and_degrade",
            Severity::High => "alert_and_retry_with_backoff",
            Severity::Medium => "log_and_degrade_gracefully",
            Severity::Low => "log_only",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row of the kind → handling table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPolicy {
    pub severity: Severity,
    pub retryable: bool,
    pub backoff: Duration,
}

impl ErrorPolicy {
    const fn new(severity: Severity, retryable: bool, backoff_ms: u64) -> Self {
        Self {
            severity,
            retryable,
            backoff: Duration::from_millis(backoff_ms),
        }
    }
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 10] = [
        ErrorKind::KnowledgeBaseNotFound,
        ErrorKind::VectorIndexBuild,
        ErrorKind::SemanticSearch,
        ErrorKind::CacheConnection,
        ErrorKind::CacheOperation,
        ErrorKind::ModelConnection,
        ErrorKind::ModelTimeout,
        ErrorKind::ModelRateLimit,
        ErrorKind::ModelResponse,
        ErrorKind::Configuration,
    ];

    /// Handling policy for this kind.
    pub const fn policy(self) -> ErrorPolicy {
        match self {
            ErrorKind::KnowledgeBaseNotFound => ErrorPolicy::new(Severity::Low, false, 0),
            ErrorKind::VectorIndexBuild => ErrorPolicy::new(Severity::Medium, true, 1_000),
            ErrorKind::SemanticSearch => ErrorPolicy::new(Severity::Medium, false, 0),
            ErrorKind::CacheConnection => ErrorPolicy::new(Severity::Critical, true, 3_000),
            ErrorKind::CacheOperation => ErrorPolicy::new(Severity::Medium, true, 1_000),
            ErrorKind::ModelConnection => ErrorPolicy::new(Severity::Critical, true, 3_000),
            ErrorKind::ModelTimeout => ErrorPolicy::new(Severity::High, true, 2_000),
            ErrorKind::ModelRateLimit => ErrorPolicy::new(Severity::High, true, 5_000),
            ErrorKind::ModelResponse => ErrorPolicy::new(Severity::High, false, 0),
            ErrorKind::Configuration => ErrorPolicy::new(Severity::Critical, false, 0),
        }
    }

    pub fn severity(self) -> Severity {
        self.policy().severity
    }

    pub fn is_retryable(self) -> bool {
        self.policy().retryable
    }

    /// Failures with no in-component fallback; these abort startup.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::KnowledgeBaseNotFound | ErrorKind::Configuration
        )
    }

    /// Stable code for logs and JSON outcomes.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::KnowledgeBaseNotFound => "KNOWLEDGE_BASE_NOT_FOUND",
            ErrorKind::VectorIndexBuild => "VECTOR_INDEX_BUILD",
            ErrorKind::SemanticSearch => "SEMANTIC_SEARCH",
            ErrorKind::CacheConnection => "CACHE_CONNECTION",
            ErrorKind::CacheOperation => "CACHE_OPERATION",
            ErrorKind::ModelConnection => "MODEL_CONNECTION",
            ErrorKind::ModelTimeout => "MODEL_TIMEOUT",
            ErrorKind::ModelRateLimit => "MODEL_RATE_LIMIT",
            ErrorKind::ModelResponse => "MODEL_RESPONSE",
            ErrorKind::Configuration => "CONFIGURATION",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Implemented by every module error so callers can look up its policy.
pub trait Classified {
    fn kind(&self) -> ErrorKind;

    fn policy(&self) -> ErrorPolicy {
        self.kind().policy()
    }
}
