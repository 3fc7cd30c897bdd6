use serde::{Deserialize, Serialize};

use super::offline::OfflineTopic;
use crate::hashing::{hash_request, to_hex};

/// Prefix of every model-response key in the cache manager.
pub const CACHE_KEY_PREFIX: &str = "llm:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Post-processing applied to generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub format: ResponseFormat,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.7,
            max_tokens: None,
            format: ResponseFormat::Text,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }
}

/// Addresses the cached response for a `(model, messages, temperature)` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInvocationRecord {
    pub model: String,
    /// Hex digest of the request identity.
    pub messages_hash: String,
    pub temperature_bits: u32,
    pub cache_key: String,
}

impl ModelInvocationRecord {
    pub fn from_request(request: &ChatRequest) -> Self {
        let digest = hash_request(
            &request.model,
            request
                .messages
                .iter()
                .map(|m| (m.role.as_str(), m.content.as_str())),
            request.temperature,
        );
        let messages_hash = to_hex(&digest);
        Self {
            model: request.model.clone(),
            cache_key: format!("{CACHE_KEY_PREFIX}{messages_hash}"),
            messages_hash,
            temperature_bits: request.temperature.to_bits(),
        }
    }
}

/// Outcome of [`crate::llm::ModelClient::invoke`].
///
/// `Offline` is never a generated answer; callers must not present it as one.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Generated {
        text: String,
        model: String,
        cached: bool,
    },
    Offline {
        text: String,
        topic: OfflineTopic,
    },
}

impl Completion {
    pub fn text(&self) -> &str {
        match self {
            Completion::Generated { text, .. } | Completion::Offline { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Completion::Generated { text, .. } | Completion::Offline { text, .. } => text,
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Completion::Offline { .. })
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Completion::Generated { cached: true, .. })
    }

    /// Model that produced the text, `None` for offline replies.
    pub fn model(&self) -> Option<&str> {
        match self {
            Completion::Generated { model, .. } => Some(model),
            Completion::Offline { .. } => None,
        }
    }
}

/// Circuit state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    /// No request has completed yet.
    Unknown,
    Healthy,
    /// Every call is answered offline until a reset or recovery probe succeeds.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkStatus {
    pub state: NetworkState,
    pub consecutive_failures: u32,
    pub max_failures: u32,
    pub requests: u64,
    pub cache_hits: u64,
    pub generated: u64,
    pub offline_replies: u64,
    pub last_error: Option<String>,
    /// RFC 3339 timestamp.
    pub last_success_at: Option<String>,
}

/// What the client stores in the cache manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CachedCompletion {
    pub text: String,
    pub model: String,
}

/// Body of `POST {base_url}/chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}
