//! Resilient chat-completion client.
//!
//! [`ModelClient::invoke`] layers, in order: the request cache, the degraded
//! short-circuit, the prompt token budget, per-model rate limiting, retry with
//! backoff, and failover across a fixed model chain. When everything fails the
//! caller gets [`Completion::Offline`], never an error.

mod budget;
mod client;
mod config;
mod error;
mod format;
mod offline;
mod rate_limit;
mod retry;
mod transport;
mod types;

#[cfg(any(test, feature = "mock"))]
mod mock;


pub use budget::{estimate_tokens, fit_to_budget};
pub use client::{ModelClient, RESPONSE_CACHE_METRIC};
pub use config::{DEFAULT_MAX_CONCURRENT_REQUESTS, ModelConfig};
pub use error::TransportError;
pub use format::{format_json, format_reply, format_text};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockReply, MockTransport, completion_body};
pub use offline::{OfflineReplies, OfflineTopic, classify_topic};
pub use rate_limit::RateLimiter;
pub use retry::{RetryDecision, decide as retry_decision, exponential_backoff, rate_limit_backoff};
pub use transport::{ChatTransport, HttpTransport, extract_content};
pub use types::{
    CACHE_KEY_PREFIX, ChatMessage, ChatRequest, Completion, ModelInvocationRecord, NetworkState,
    NetworkStatus, ResponseFormat, Role, WireRequest,
};
