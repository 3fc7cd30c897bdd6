use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use tokio::sync::Semaphore;
use tracing::{debug, error, instrument};

use crate::constants::{RETRIEVER_CACHE_CAPACITY, RETRIEVER_CACHE_TTL_SECS, RETRIEVER_WORKERS};
use crate::hashing::{hash_query, to_hex};
use crate::health::{HealthCheckable, HealthReport};
use crate::knowledge::{KnowledgeEngine, KnowledgeError, KnowledgeResult, ScoredChunk};

type Hits = Arc<Vec<ScoredChunk>>;

/// Async front for the blocking [`KnowledgeEngine::search`].
///
/// Hits are served from an in-memory cache without leaving the calling task;
/// misses run on the blocking pool, at most `workers` at a time.
#[derive(Clone)]
pub struct AsyncRetriever {
    engine: Arc<KnowledgeEngine>,
    cache: Cache<String, Hits>,
    workers: Arc<Semaphore>,
}

impl std::fmt::Debug for AsyncRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRetriever")
            .field("cached", &self.cache.entry_count())
            .field("idle_workers", &self.workers.available_permits())
            .finish()
    }
}

impl AsyncRetriever {
    pub fn new(engine: Arc<KnowledgeEngine>) -> Self {
        Self::with_limits(
            engine,
            RETRIEVER_WORKERS,
            Duration::from_secs(RETRIEVER_CACHE_TTL_SECS),
            RETRIEVER_CACHE_CAPACITY,
        )
    }

    pub fn with_limits(
        engine: Arc<KnowledgeEngine>,
        workers: usize,
        ttl: Duration,
        capacity: u64,
    ) -> Self {
        Self {
            engine,
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn engine(&self) -> &Arc<KnowledgeEngine> {
        &self.engine
    }

    fn cache_key(&self, query: &str) -> String {
        format!(
            "retrieve:{}",
            to_hex(&hash_query(query, self.engine.config().top_k))
        )
    }

    /// Top results for `query`; empty when nothing is relevant or the search failed.
    #[instrument(skip(self), level = "debug")]
    pub async fn retrieve(&self, query: &str) -> Vec<ScoredChunk> {
        let key = self.cache_key(query);
        if let Some(hits) = self.cache.get(&key) {
            debug!(results = hits.len(), "Retriever cache hit");
            return hits.as_ref().clone();
        }

        match self.search_blocking(query).await {
            Ok(hits) => {
                if !hits.is_empty() {
                    self.cache.insert(key, Arc::new(hits.clone()));
                }
                hits
            }
            Err(e) => {
                error!(error = %e, "Async retrieval failed");
                Vec::new()
            }
        }
    }

    /// Bypasses the retriever cache and reports failures.
    pub async fn retrieve_uncached(&self, query: &str) -> KnowledgeResult<Vec<ScoredChunk>> {
        self.search_blocking(query).await
    }

    async fn search_blocking(&self, query: &str) -> KnowledgeResult<Vec<ScoredChunk>> {
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|e| KnowledgeError::Search {
                reason: e.to_string(),
            })?;

        let engine = Arc::clone(&self.engine);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || engine.search(&query, None))
            .await
            .map_err(|e| KnowledgeError::Search {
                reason: format!("search task failed: {e}"),
            })?
    }

    pub fn cached_queries(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }
}

#[async_trait]
impl HealthCheckable for AsyncRetriever {
    fn component(&self) -> &'static str {
        "retriever"
    }

    async fn check_health(&self) -> HealthReport {
        let engine = self.engine.check_health().await;
        let detail = serde_json::json!({
            "engine": engine.detail,
            "cached_queries": self.cached_queries(),
            "idle_workers": self.workers.available_permits(),
        });
        if engine.ready {
            HealthReport::ready(detail)
        } else {
            HealthReport::not_ready(detail)
        }
    }
}
