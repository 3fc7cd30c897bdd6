//! Kestrel library crate (used by the `kestrel` binary and integration tests).
//!
//! # Public API Surface
//!
//! ## Pipeline
//! - [`SupportPipeline`], [`SupportCase`], [`CaseOutcome`] - Case orchestration
//! - [`PipelineConfig`], [`ConfigError`] - Environment-backed configuration
//!
//! ## Components
//! - [`KnowledgeEngine`], [`RetrievalConfig`] - Two-stage retrieval with lexical fallback
//! - [`CacheManager`], [`CacheConfig`] - Memory / shared / disk cache tiers
//! - [`Router`], [`AdmissionController`] - Query classification and per-class concurrency
//! - [`ModelClient`], [`ModelConfig`] - Retrying, failing-over chat-completion client
//!
//! ## Cross-cutting
//! - [`ErrorKind`], [`Classified`] - Error taxonomy and handling policy
//! - [`HealthCheckable`], [`HealthReport`] - Readiness capability
//! - [`MetricsRegistry`] - Injected request, model, cache and error accounting
//!
//! ## Test/Mock Support
//! [`llm::MockTransport`] is available behind `#[cfg(any(test, feature = "mock"))]`.

pub mod cache;
pub mod config;
pub mod constants;
pub mod embedding;
pub mod error;
pub mod hashing;
pub mod health;
pub mod knowledge;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod routing;

pub use cache::{CacheConfig, CacheError, CacheManager, CacheStats, Priority};
pub use config::{ConfigError, PipelineConfig};
pub use embedding::{EmbeddingError, EncoderConfig, Reranker, RerankerConfig, RerankerError};
pub use error::{Classified, ErrorKind, ErrorPolicy, Severity};
pub use health::{HealthCheckable, HealthReport};
pub use knowledge::{KnowledgeEngine, KnowledgeError, RetrievalConfig, ScoredChunk};
#[cfg(any(test, feature = "mock"))]
pub use llm::{MockReply, MockTransport};
pub use llm::{ChatMessage, ChatRequest, Completion, ModelClient, ModelConfig, TransportError};
pub use metrics::{MetricsRegistry, MetricsSummary};
pub use pipeline::{
    CaseOutcome, PipelineError, PipelineHealth, ReplyKind, SupportCase, SupportPipeline,
};
pub use routing::{AdmissionConfig, AdmissionController, RouteClass, RouteDecision, Router};
