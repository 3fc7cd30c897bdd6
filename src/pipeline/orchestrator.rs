use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::benchmark::BenchmarkReport;
use super::case::{BatchSummary, CaseOutcome, Incident, ReplyKind, SupportCase};
use super::collaborators::{
    AlertDispatcher, LogAlertDispatcher, RuleStatusInspector, StatusInspector,
};
use super::error::PipelineError;
use super::prompts;
use super::retriever::AsyncRetriever;
use crate::cache::{CacheManager, CacheStats};
use crate::config::{ConfigError, PipelineConfig};
use crate::constants::NO_KNOWLEDGE_REPLY;
use crate::health::{HealthCheckable, HealthReport};
use crate::knowledge::{KnowledgeEngine, KnowledgeError, KnowledgeStats};
use crate::llm::{ChatMessage, ChatRequest, ChatTransport, ModelClient, NetworkStatus};
use crate::metrics::{MetricsRegistry, MetricsSummary};
use crate::routing::{
    AdmissionConfig, AdmissionController, AdmissionStats, RouteClass, Router, RouterStats,
};

const SIMPLE_TEMPERATURE: f32 = 0.7;
const SIMPLE_MAX_TOKENS: u32 = 200;
const COMPLEX_TEMPERATURE: f32 = 0.3;

pub const WARMUP_QUERY: &str = "系统预热查询";
/// Reply used when a case could not be handled at all.
pub const FAILED_REPLY: &str = "系统错误";
const DEFAULT_API_STATUS: &str = "OK";
const ADMISSION_ERROR_TYPE: &str = "ADMISSION";

/// Router → admission → retrieval → model, for one support case at a time.
///
/// Every collaborator is injected; nothing is looked up globally. Call
/// [`SupportPipeline::shutdown`] to stop background work.
pub struct SupportPipeline {
    client: Arc<ModelClient>,
    router: Router,
    admission: AdmissionController,
    retriever: Option<AsyncRetriever>,
    cache: Option<CacheManager>,
    alerts: Arc<dyn AlertDispatcher>,
    inspector: Arc<dyn StatusInspector>,
    metrics: Arc<MetricsRegistry>,
    started: Instant,
    started_at: DateTime<Utc>,
    requests: AtomicU64,
    closed: AtomicBool,
}

impl std::fmt::Debug for SupportPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupportPipeline")
            .field("router", &self.router)
            .field("retriever", &self.retriever)
            .field("cache", &self.cache.is_some())
            .field("requests", &self.requests.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

/// Assembles a [`SupportPipeline`] from explicitly constructed parts.
pub struct PipelineBuilder {
    client: Arc<ModelClient>,
    router: Option<Router>,
    admission: AdmissionConfig,
    retriever: Option<AsyncRetriever>,
    cache: Option<CacheManager>,
    alerts: Arc<dyn AlertDispatcher>,
    inspector: Arc<dyn StatusInspector>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl PipelineBuilder {
    /// Replaces the default router, which uses the built-in rules plus the
    /// client's `router_model` when one is configured.
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_admission(mut self, config: AdmissionConfig) -> Self {
        self.admission = config;
        self
    }

    pub fn with_retriever(mut self, retriever: AsyncRetriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_engine(self, engine: Arc<KnowledgeEngine>) -> Self {
        self.with_retriever(AsyncRetriever::new(engine))
    }

    pub fn with_cache(mut self, cache: CacheManager) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_alert_dispatcher(mut self, alerts: Arc<dyn AlertDispatcher>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn with_status_inspector(mut self, inspector: Arc<dyn StatusInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    /// Shares `metrics` with the pipeline. Without one, the client's registry is
    /// reused, or a fresh registry is created.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<SupportPipeline, PipelineError> {
        self.admission
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                section: "admission",
                reason,
            })?;

        let router = match self.router {
            Some(router) => router,
            None => {
                let router = Router::new()?;
                match self.client.config().router_model.clone() {
                    Some(model) => router.with_classifier(Arc::clone(&self.client), model),
                    None => router,
                }
            }
        };

        let metrics = self
            .metrics
            .or_else(|| self.client.metrics().cloned())
            .unwrap_or_default();

        Ok(SupportPipeline {
            admission: AdmissionController::new(&self.admission),
            metrics,
            client: self.client,
            router,
            retriever: self.retriever,
            cache: self.cache,
            alerts: self.alerts,
            inspector: self.inspector,
            started: Instant::now(),
            started_at: Utc::now(),
            requests: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineHealth {
    pub healthy: bool,
    /// `"healthy"` or `"degraded"`.
    pub status: &'static str,
    pub uptime_secs: u64,
    pub components: BTreeMap<&'static str, HealthReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WarmupReport {
    pub attempted: usize,
    pub succeeded: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub started_at: String,
    pub uptime_secs: u64,
    pub requests: u64,
    pub admission: AdmissionStats,
    pub router: RouterStats,
    pub network: NetworkStatus,
    pub cache: Option<CacheStats>,
    pub retrieval: Option<KnowledgeStats>,
    pub metrics: MetricsSummary,
}

fn ping_request(model: &str) -> ChatRequest {
    ChatRequest::new(model, vec![ChatMessage::user("ping")])
        .with_temperature(0.0)
        .with_max_tokens(5)
}

impl SupportPipeline {
    pub fn builder(client: Arc<ModelClient>) -> PipelineBuilder {
        PipelineBuilder {
            client,
            router: None,
            admission: AdmissionConfig::default(),
            retriever: None,
            cache: None,
            alerts: Arc::new(LogAlertDispatcher),
            inspector: Arc::new(RuleStatusInspector),
            metrics: None,
        }
    }

    /// Builds every component from `config`, talking to the hosted endpoint over HTTP.
    ///
    /// Starts the cache sweep when called inside a Tokio runtime.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let cache = CacheManager::new(config.cache.clone())?;
        let client = ModelClient::http(config.model.clone(), Some(cache.clone()))?;
        Self::assemble(config, cache, client, Arc::new(MetricsRegistry::new()))
    }

    /// Like [`SupportPipeline::from_config`] over a caller-supplied transport.
    pub fn from_config_with_transport(
        config: &PipelineConfig,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let cache = CacheManager::new(config.cache.clone())?;
        let client = ModelClient::new(config.model.clone(), transport, Some(cache.clone()));
        Self::assemble(config, cache, client, Arc::new(MetricsRegistry::new()))
    }

    fn assemble(
        config: &PipelineConfig,
        cache: CacheManager,
        client: ModelClient,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Self, PipelineError> {
        let source = &config.retrieval.source_path;
        if !source.exists() {
            return Err(KnowledgeError::KnowledgeBaseNotFound {
                path: source.clone(),
            }
            .into());
        }
        let engine = Arc::new(KnowledgeEngine::new(config.retrieval.clone())?);

        cache.attach_metrics(Arc::clone(&metrics));
        let client = client.with_metrics(Arc::clone(&metrics));
        let pipeline = Self::builder(Arc::new(client))
            .with_admission(config.admission.clone())
            .with_engine(engine)
            .with_cache(cache.clone())
            .with_metrics(metrics)
            .build()?;

        if config.cache_sweeper {
            if tokio::runtime::Handle::try_current().is_ok() {
                cache.start_sweeper();
            } else {
                warn!("No Tokio runtime; cache sweep not started");
            }
        }

        info!(
            source = %source.display(),
            simple_model = %pipeline.client.config().simple_model,
            complex_model = %pipeline.client.config().complex_model,
            model_router = pipeline.router.has_classifier(),
            "Support pipeline ready"
        );
        Ok(pipeline)
    }

    pub fn client(&self) -> &Arc<ModelClient> {
        &self.client
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn retriever(&self) -> Option<&AsyncRetriever> {
        self.retriever.as_ref()
    }

    pub fn cache(&self) -> Option<&CacheManager> {
        self.cache.as_ref()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Handles one case end to end. Never fails; problems are reported on the outcome.
    #[instrument(skip_all, fields(case_id = tracing::field::Empty, mode = tracing::field::Empty))]
    pub async fn process_case(&self, case: SupportCase) -> CaseOutcome {
        let seq = self.requests.fetch_add(1, Ordering::Relaxed);
        let case_id = case
            .case_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("req_{seq}"));
        let span = tracing::Span::current();
        span.record("case_id", case_id.as_str());
        let started = Instant::now();

        let alerts = self.raise_alerts(&case_id, &case).await;

        let decision = self.router.classify(&case.user_query).await;
        span.record("mode", decision.class.as_str());

        // Held until the reply is assembled.
        let _ticket = match self.admission.acquire(decision.class).await {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(error = %e, "Case rejected by admission control");
                let elapsed = started.elapsed();
                self.metrics
                    .record_error(ADMISSION_ERROR_TYPE, None, e.to_string());
                self.metrics.record_request(
                    decision.class.as_str(),
                    ReplyKind::Failed.as_str(),
                    false,
                    elapsed,
                );
                return CaseOutcome {
                    case_id,
                    mode: Some(decision.class),
                    reply: FAILED_REPLY.to_string(),
                    reply_kind: ReplyKind::Failed,
                    alerts,
                    duration_ms: elapsed.as_secs_f64() * 1000.0,
                    error: Some(e.to_string()),
                };
            }
        };

        let (reply, reply_kind) = match decision.class {
            RouteClass::Simple => self.handle_simple(&case.user_query).await,
            RouteClass::Complex | RouteClass::Unknown => self.handle_complex(&case).await,
        };

        let elapsed = started.elapsed();
        let duration_ms = elapsed.as_secs_f64() * 1000.0;
        info!(duration_ms, reply_kind = ?reply_kind, provenance = ?decision.provenance, "Case handled");
        self.metrics
            .record_request(decision.class.as_str(), reply_kind.as_str(), true, elapsed);

        CaseOutcome {
            case_id,
            mode: Some(decision.class),
            reply,
            reply_kind,
            alerts,
            duration_ms,
            error: None,
        }
    }

    async fn raise_alerts(&self, case_id: &str, case: &SupportCase) -> Vec<String> {
        let api_status = case.api_status.as_deref().unwrap_or_default();
        let logs = case.monitor_log.as_deref().unwrap_or_default();
        let report = self.inspector.inspect(api_status, logs);
        if !report.needs_alert {
            return Vec::new();
        }

        let incident = Incident {
            case_id: case_id.to_string(),
            api_status: api_status.to_string(),
            reason: report.reason,
            latest_error: report.latest_error,
            raised_at: Utc::now().to_rfc3339(),
        };
        match self.alerts.dispatch(&incident).await {
            Ok(id) => vec![id],
            Err(e) => {
                warn!(error = %e, "Alert dispatch failed");
                Vec::new()
            }
        }
    }

    async fn handle_simple(&self, query: &str) -> (String, ReplyKind) {
        let request = ChatRequest::new(
            self.client.config().simple_model.clone(),
            prompts::simple_chat_messages(query),
        )
        .with_temperature(SIMPLE_TEMPERATURE)
        .with_max_tokens(SIMPLE_MAX_TOKENS);

        let completion = self.client.invoke(request).await;
        let kind = ReplyKind::from_completion(&completion);
        (completion.into_text(), kind)
    }

    async fn handle_complex(&self, case: &SupportCase) -> (String, ReplyKind) {
        let knowledge = match &self.retriever {
            Some(retriever) => retriever.retrieve(&case.user_query).await,
            None => Vec::new(),
        };
        if knowledge.is_empty() {
            debug!("No relevant knowledge; skipping model call");
            return (NO_KNOWLEDGE_REPLY.to_string(), ReplyKind::NoKnowledge);
        }

        let api_status = case.api_status.as_deref().unwrap_or(DEFAULT_API_STATUS);
        let request = ChatRequest::new(
            self.client.config().complex_model.clone(),
            prompts::rag_messages(&knowledge, &case.user_query, api_status),
        )
        .with_temperature(COMPLEX_TEMPERATURE);

        let completion = self.client.invoke(request).await;
        let kind = ReplyKind::from_completion(&completion);
        (completion.into_text(), kind)
    }

    /// Runs every case concurrently, bounded only by admission control.
    /// Outcomes keep the input order.
    pub async fn process_batch(&self, cases: Vec<SupportCase>) -> Vec<CaseOutcome> {
        join_all(cases.into_iter().map(|case| self.process_case(case))).await
    }

    /// Reads a JSON list of cases from `input` and writes the outcomes to `output`.
    pub async fn run_batch_file(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<BatchSummary, PipelineError> {
        let raw = tokio::fs::read_to_string(input)
            .await
            .map_err(|source| PipelineError::BatchIo {
                path: input.to_path_buf(),
                source,
            })?;
        let cases: Vec<SupportCase> =
            serde_json::from_str(&raw).map_err(|e| PipelineError::BatchFormat {
                path: input.to_path_buf(),
                reason: e.to_string(),
            })?;

        let outcomes = self.process_batch(cases).await;

        let write_err = |source| PipelineError::BatchIo {
            path: output.to_path_buf(),
            source,
        };
        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let body = serde_json::to_vec_pretty(&outcomes).map_err(|e| PipelineError::BatchFormat {
            path: output.to_path_buf(),
            reason: e.to_string(),
        })?;
        tokio::fs::write(output, body).await.map_err(write_err)?;

        let summary = BatchSummary::from_outcomes(&outcomes);
        info!(
            total = summary.total,
            success = summary.success,
            output = %output.display(),
            "Batch complete"
        );
        Ok(summary)
    }

    /// `None` when `cases` is empty. At most `concurrency` cases run at once.
    pub async fn run_benchmark(
        &self,
        cases: Vec<SupportCase>,
        concurrency: usize,
    ) -> Option<BenchmarkReport> {
        if cases.is_empty() {
            return None;
        }
        let concurrency = concurrency.max(1);
        info!(samples = cases.len(), concurrency, "Running benchmark");

        let started = Instant::now();
        let outcomes: Vec<CaseOutcome> = stream::iter(cases)
            .map(|case| self.process_case(case))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let report = BenchmarkReport::from_outcomes(&outcomes, concurrency, started.elapsed());
        self.metrics
            .set_performance("benchmark_throughput", report.throughput);
        self.metrics
            .set_performance("benchmark_p95_ms", report.latency.p95_ms);
        self.metrics
            .set_performance("benchmark_success_rate", report.success_rate);
        Some(report)
    }

    async fn llm_connectivity(&self) -> HealthReport {
        let started = Instant::now();
        let completion = self
            .client
            .invoke(ping_request(&self.client.config().simple_model))
            .await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let client = self.client.check_health().await;

        let connected = client.ready && !completion.is_offline();
        let detail = json!({
            "connected": connected,
            "latency_ms": latency_ms,
            "client": client.detail,
        });
        if connected {
            HealthReport::ready(detail)
        } else {
            HealthReport::not_ready(detail)
        }
    }

    /// Checks model connectivity, retrieval, routing and the cache concurrently.
    pub async fn check_health(&self) -> PipelineHealth {
        let retriever = async {
            match &self.retriever {
                Some(retriever) => retriever.check_health().await,
                None => HealthReport::not_ready(json!({ "reason": "no knowledge engine" })),
            }
        };
        let cache = async {
            match &self.cache {
                Some(cache) => Some(cache.check_health().await),
                None => None,
            }
        };
        let (llm, retriever, router, cache) = tokio::join!(
            self.llm_connectivity(),
            retriever,
            self.router.check_health(),
            cache
        );

        let mut components = BTreeMap::new();
        components.insert("llm", llm);
        components.insert("retriever", retriever);
        components.insert(self.router.component(), router);
        if let Some(cache) = cache {
            components.insert("cache", cache);
        }

        for (component, report) in &components {
            self.metrics.set_component_status(component, report.ready);
        }
        let healthy = components.values().all(|report| report.ready);
        PipelineHealth {
            healthy,
            status: if healthy { "healthy" } else { "degraded" },
            uptime_secs: self.started.elapsed().as_secs(),
            components,
        }
    }

    /// Primes retrieval and the model connection. Failures are logged, not returned.
    pub async fn warmup(&self) -> WarmupReport {
        info!("Warming up pipeline");
        let retrieval = async {
            match &self.retriever {
                Some(retriever) => Some(match retriever.retrieve_uncached(WARMUP_QUERY).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(error = %e, "Retrieval warmup failed");
                        false
                    }
                }),
                None => None,
            }
        };
        let model = async {
            !self
                .client
                .invoke(ping_request(&self.client.config().simple_model))
                .await
                .is_offline()
        };
        let (retrieval, model) = tokio::join!(retrieval, model);

        let attempted = 1 + usize::from(retrieval.is_some());
        let succeeded = usize::from(model) + usize::from(retrieval.unwrap_or(false));
        info!(attempted, succeeded, "Warmup complete");
        WarmupReport {
            attempted,
            succeeded,
        }
    }

    pub fn system_status(&self) -> SystemStatus {
        SystemStatus {
            version: env!("CARGO_PKG_VERSION"),
            started_at: self.started_at.to_rfc3339(),
            uptime_secs: self.started.elapsed().as_secs(),
            requests: self.requests.load(Ordering::Relaxed),
            admission: self.admission.stats(),
            router: self.router.stats(),
            network: self.client.network_status(),
            cache: self.cache.as_ref().map(CacheManager::stats),
            retrieval: self.retriever.as_ref().map(|r| r.engine().stats()),
            metrics: self.metrics.summary(),
        }
    }

    /// Stops admitting cases and halts the cache sweep. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.admission.close();
        if let Some(cache) = &self.cache {
            cache.shutdown();
        }
        let summary = self.metrics.summary();
        info!(
            requests = self.requests.load(Ordering::Relaxed),
            success_rate = summary.requests.success_rate,
            cache_hit_rate = summary.cache_hit_rate,
            errors = summary.errors.values().sum::<u64>(),
            "Support pipeline shut down"
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
