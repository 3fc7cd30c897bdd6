use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BASE_URL, FAILOVER_PAUSE_MS, FALLBACK_MODELS, MAX_ATTEMPTS_PER_MODEL,
    MAX_CONSECUTIVE_FAILURES, MAX_PROMPT_TOKENS, MIN_REQUEST_INTERVAL_MS, MODEL_CACHE_TTL_SECS,
    MODEL_V32, MODEL_V32_THINK, REQUEST_TIMEOUT_SECS,
};

/// Sends allowed in flight across all models.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 3;

#[derive(Clone)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: String,
    /// Model for greetings and small talk.
    pub simple_model: String,
    /// Model for knowledge-grounded answers.
    pub complex_model: String,
    /// Model consulted by the router when no rule matches. `None` skips that tier.
    pub router_model: Option<String>,
    /// Tried in order after the requested model.
    pub fallback_models: Vec<String>,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    /// Consecutive failed invocations before the client goes offline.
    pub max_failures: u32,
    pub min_request_interval: Duration,
    pub failover_pause: Duration,
    pub cache_ttl: Duration,
    pub max_prompt_tokens: usize,
    pub max_concurrent_requests: usize,
    /// JSON `{topic: reply}` overrides for offline replies.
    pub offline_replies_path: Option<PathBuf>,
    /// When set, a degraded client lets one request through after this long.
    pub recovery_probe_interval: Option<Duration>,
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("base_url", &self.base_url)
            .field("simple_model", &self.simple_model)
            .field("complex_model", &self.complex_model)
            .field("router_model", &self.router_model)
            .field("fallback_models", &self.fallback_models)
            .field("request_timeout", &self.request_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("max_failures", &self.max_failures)
            .finish_non_exhaustive()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            simple_model: MODEL_V32.to_string(),
            complex_model: MODEL_V32_THINK.to_string(),
            router_model: Some(MODEL_V32.to_string()),
            fallback_models: FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            max_attempts: MAX_ATTEMPTS_PER_MODEL,
            max_failures: MAX_CONSECUTIVE_FAILURES,
            min_request_interval: Duration::from_millis(MIN_REQUEST_INTERVAL_MS),
            failover_pause: Duration::from_millis(FAILOVER_PAUSE_MS),
            cache_ttl: Duration::from_secs(MODEL_CACHE_TTL_SECS),
            max_prompt_tokens: MAX_PROMPT_TOKENS,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            offline_replies_path: Some(PathBuf::from("data/offline_responses.json")),
            recovery_probe_interval: None,
        }
    }
}

impl ModelConfig {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_router_model(mut self, model: Option<String>) -> Self {
        self.router_model = model;
        self
    }

    pub fn with_fallback_models(mut self, models: Vec<String>) -> Self {
        self.fallback_models = models;
        self
    }

    /// Requested model first, then the fallbacks, skipping repeats.
    pub fn failover_chain(&self, requested: &str) -> Vec<String> {
        let mut chain = vec![requested.to_string()];
        for model in &self.fallback_models {
            if !chain.iter().any(|m| m == model) {
                chain.push(model.clone());
            }
        }
        chain
    }

    /// Role → model name, for validation and status reports.
    pub fn roles(&self) -> Vec<(&'static str, &str)> {
        let mut roles = vec![
            ("simple", self.simple_model.as_str()),
            ("complex", self.complex_model.as_str()),
        ];
        if let Some(router) = &self.router_model {
            roles.push(("router", router.as_str()));
        }
        roles
    }

    pub fn validate(&self) -> Result<(), String> {
        for (role, model) in self.roles() {
            if model.trim().is_empty() {
                return Err(format!("model for role '{role}' cannot be empty"));
            }
        }
        if self.base_url.trim().is_empty() {
            return Err("base_url cannot be empty".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.max_failures == 0 {
            return Err("max_failures must be at least 1".to_string());
        }
        if self.max_concurrent_requests == 0 {
            return Err("max_concurrent_requests must be at least 1".to_string());
        }
        if self.request_timeout.is_zero() {
            return Err("request_timeout must be non-zero".to_string());
        }
        Ok(())
    }
}
