use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, instrument, warn};

use super::budget::fit_to_budget;
use super::config::ModelConfig;
use super::error::TransportError;
use super::format::format_reply;
use super::offline::OfflineReplies;
use super::rate_limit::RateLimiter;
use super::retry::{RetryDecision, decide};
use super::transport::{ChatTransport, HttpTransport, extract_content};
use super::types::{
    CACHE_KEY_PREFIX, CachedCompletion, ChatMessage, ChatRequest, Completion,
    ModelInvocationRecord, NetworkState, NetworkStatus, WireRequest,
};
use crate::cache::{CacheManager, Priority};
use crate::error::Classified;
use crate::health::{HealthCheckable, HealthReport};
use crate::metrics::MetricsRegistry;

/// Cache label used in [`MetricsRegistry`] for model-response lookups.
pub const RESPONSE_CACHE_METRIC: &str = "model_response";

#[derive(Debug)]
struct NetworkTracker {
    state: NetworkState,
    consecutive_failures: u32,
    degraded_since: Option<Instant>,
    requests: u64,
    cache_hits: u64,
    generated: u64,
    offline_replies: u64,
    last_error: Option<String>,
    last_success_at: Option<String>,
}

impl Default for NetworkTracker {
    fn default() -> Self {
        Self {
            state: NetworkState::Unknown,
            consecutive_failures: 0,
            degraded_since: None,
            requests: 0,
            cache_hits: 0,
            generated: 0,
            offline_replies: 0,
            last_error: None,
            last_success_at: None,
        }
    }
}

/// Chat-completion client that never fails outward.
///
/// Every [`invoke`](Self::invoke) returns a [`Completion`]: a generated reply
/// (possibly from the request cache) or an offline reply after the whole
/// failover chain is exhausted or the client is degraded.
pub struct ModelClient {
    config: ModelConfig,
    transport: Arc<dyn ChatTransport>,
    cache: Option<CacheManager>,
    offline: OfflineReplies,
    rate_limiter: RateLimiter,
    in_flight: Semaphore,
    network: Mutex<NetworkTracker>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("transport", &self.transport.name())
            .field("cache", &self.cache.is_some())
            .field("state", &self.network.lock().state)
            .finish()
    }
}

impl ModelClient {
    pub fn new(
        config: ModelConfig,
        transport: Arc<dyn ChatTransport>,
        cache: Option<CacheManager>,
    ) -> Self {
        let offline = config
            .offline_replies_path
            .as_deref()
            .map(OfflineReplies::load)
            .unwrap_or_default();
        Self {
            rate_limiter: RateLimiter::new(config.min_request_interval),
            in_flight: Semaphore::new(config.max_concurrent_requests.max(1)),
            network: Mutex::new(NetworkTracker::default()),
            metrics: None,
            offline,
            transport,
            cache,
            config,
        }
    }

    /// Client over [`HttpTransport`] using the configured endpoint and key.
    pub fn http(config: ModelConfig, cache: Option<CacheManager>) -> Result<Self, TransportError> {
        let transport =
            HttpTransport::new(&config.base_url, &config.api_key, config.request_timeout)?;
        if !transport.is_configured() {
            warn!("No API key configured; model calls will fail and fall back to offline replies");
        }
        Ok(Self::new(config, Arc::new(transport), cache))
    }

    pub fn with_offline_replies(mut self, offline: OfflineReplies) -> Self {
        self.offline = offline;
        self
    }

    /// Records cache lookups, per-model outcomes and failures into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsRegistry>> {
        self.metrics.as_ref()
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    #[instrument(skip_all, fields(model = %request.model, messages = request.messages.len()))]
    pub async fn invoke(&self, request: ChatRequest) -> Completion {
        self.network.lock().requests += 1;
        let record = ModelInvocationRecord::from_request(&request);

        if let Some(completion) = self.lookup_cache(&record.cache_key, &request).await {
            return completion;
        }

        if !self.admit_network_call() {
            warn!("Model client degraded; answering offline");
            return self.offline(&request.messages);
        }

        let messages = fit_to_budget(&request.messages, self.config.max_prompt_tokens);
        if messages.len() < request.messages.len() {
            info!(
                before = request.messages.len(),
                after = messages.len(),
                "Prompt trimmed to token budget"
            );
        }

        let Ok(_permit) = self.in_flight.acquire().await else {
            return self.offline(&request.messages);
        };

        let chain = self.config.failover_chain(&request.model);
        let mut last_error = None;
        for (i, model) in chain.iter().enumerate() {
            if i > 0 {
                time::sleep(self.config.failover_pause).await;
            }
            debug!(model = %model, "Trying model");

            let wire = WireRequest {
                model: model.clone(),
                messages: messages.clone(),
                temperature: request.temperature,
                max_tokens: request.max_tokens,
            };
            match self.try_model(&wire).await {
                Ok(raw) => {
                    let text = format_reply(&raw, request.format);
                    self.store_cache(&record.cache_key, &text, model).await;
                    self.record_success();
                    if let Some(metrics) = &self.metrics {
                        metrics.record_model_call(model, true);
                    }
                    return Completion::Generated {
                        text,
                        model: model.clone(),
                        cached: false,
                    };
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Model failed; trying next");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_model_call(model, false);
                        metrics.record_error(e.kind().code(), Some(model), e.to_string());
                    }
                    last_error = Some(e);
                }
            }
        }

        error!(requested = %request.model, "All models failed");
        self.record_failure(last_error.as_ref());
        self.offline(&request.messages)
    }

    async fn lookup_cache(&self, key: &str, request: &ChatRequest) -> Option<Completion> {
        let cache = self.cache.as_ref()?;
        let cached: Option<CachedCompletion> = cache.get_json(key).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_cache(RESPONSE_CACHE_METRIC, cached.is_some());
        }
        let cached = cached?;
        debug!("Model response served from cache");
        self.network.lock().cache_hits += 1;
        Some(Completion::Generated {
            text: format_reply(&cached.text, request.format),
            model: cached.model,
            cached: true,
        })
    }

    async fn store_cache(&self, key: &str, text: &str, model: &str) {
        let Some(cache) = &self.cache else {
            return;
        };
        let value = CachedCompletion {
            text: text.to_string(),
            model: model.to_string(),
        };
        if !cache
            .set_json(key, &value, Some(self.config.cache_ttl), Priority::Normal)
            .await
        {
            warn!("Model response could not be cached");
        }
    }

    /// `false` while degraded, except for one recovery probe per interval when configured.
    fn admit_network_call(&self) -> bool {
        let mut network = self.network.lock();
        if network.state != NetworkState::Degraded {
            return true;
        }
        let Some(interval) = self.config.recovery_probe_interval else {
            return false;
        };
        let due = network
            .degraded_since
            .is_none_or(|since| since.elapsed() >= interval);
        if due {
            info!("Sending recovery probe while degraded");
            network.degraded_since = Some(Instant::now());
        }
        due
    }

    /// Sends to one model with retries. Returns the raw content or the last error.
    async fn try_model(&self, wire: &WireRequest) -> Result<String, TransportError> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            self.rate_limiter.wait(&wire.model).await;
            let error = match self.send_once(wire).await {
                Ok(content) => return Ok(content),
                Err(e) => e,
            };

            match decide(&error, attempt) {
                RetryDecision::Retry(delay) if attempt + 1 < attempts => {
                    warn!(
                        model = %wire.model,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after backoff"
                    );
                    time::sleep(delay).await;
                    attempt += 1;
                }
                _ => return Err(error),
            }
        }
    }

    async fn send_once(&self, wire: &WireRequest) -> Result<String, TransportError> {
        let body = time::timeout(self.config.request_timeout, self.transport.send(wire))
            .await
            .map_err(|_| TransportError::Timeout {
                reason: format!("no response within {:?}", self.config.request_timeout),
            })??;
        extract_content(&body)
    }

    fn record_success(&self) {
        let mut network = self.network.lock();
        if network.state == NetworkState::Degraded {
            info!("Model client recovered");
        }
        network.state = NetworkState::Healthy;
        network.consecutive_failures = 0;
        network.degraded_since = None;
        network.generated += 1;
        network.last_success_at = Some(chrono::Utc::now().to_rfc3339());
    }

    fn record_failure(&self, error: Option<&TransportError>) {
        let mut network = self.network.lock();
        network.consecutive_failures += 1;
        network.last_error = error.map(ToString::to_string);
        if network.consecutive_failures >= self.config.max_failures
            && network.state != NetworkState::Degraded
        {
            error!(
                failures = network.consecutive_failures,
                "Model client degraded; subsequent calls answer offline"
            );
            network.state = NetworkState::Degraded;
            network.degraded_since = Some(Instant::now());
        }
    }

    fn offline(&self, messages: &[ChatMessage]) -> Completion {
        self.network.lock().offline_replies += 1;
        let (topic, text) = self.offline.for_messages(messages);
        Completion::Offline { text, topic }
    }

    pub fn network_status(&self) -> NetworkStatus {
        let network = self.network.lock();
        NetworkStatus {
            state: network.state,
            consecutive_failures: network.consecutive_failures,
            max_failures: self.config.max_failures,
            requests: network.requests,
            cache_hits: network.cache_hits,
            generated: network.generated,
            offline_replies: network.offline_replies,
            last_error: network.last_error.clone(),
            last_success_at: network.last_success_at.clone(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.network.lock().state == NetworkState::Degraded
    }

    /// Clears the failure count and leaves the degraded state.
    pub fn reset_network_state(&self) {
        let mut network = self.network.lock();
        network.state = NetworkState::Unknown;
        network.consecutive_failures = 0;
        network.degraded_since = None;
        info!("Model client network state reset");
    }

    /// Drops every cached model response. Returns how many were removed.
    pub async fn clear_cache(&self) -> usize {
        match &self.cache {
            Some(cache) => cache.clear(Some(CACHE_KEY_PREFIX)).await,
            None => 0,
        }
    }
}

#[async_trait]
impl HealthCheckable for ModelClient {
    fn component(&self) -> &'static str {
        "llm"
    }

    async fn check_health(&self) -> HealthReport {
        let status = self.network_status();
        let configured = self.transport.is_configured();
        let detail = json!({
            "transport": self.transport.name(),
            "configured": configured,
            "network": status,
        });
        if configured && status.state != NetworkState::Degraded {
            HealthReport::ready(detail)
        } else {
            HealthReport::not_ready(detail)
        }
    }
}
