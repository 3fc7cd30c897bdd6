//! Two-stage retrieval: bi-encoder search, cross-encoder rerank, lexical fallback.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use super::chunker::{FlatDocument, KnowledgeChunk, chunk_documents, flatten};
use super::config::RetrievalConfig;
use super::error::{KnowledgeError, KnowledgeResult};
use super::index::{VectorIndex, encoder_tag};
use super::query_cache::QueryCache;
use crate::embedding::{Reranker, RerankerConfig, RerankerError, TextEncoder, load_encoder};
use crate::hashing::hash_query;
use crate::health::{HealthCheckable, HealthReport};

/// Which path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// Stage-1 hit returned without reranking.
    Vector,
    Reranked,
    /// Stage-1 hit returned because reranking failed for this query.
    VectorFallback,
    TextMatchFallback,
}

impl ScoreSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoreSource::Vector => "vector",
            ScoreSource::Reranked => "reranked",
            ScoreSource::VectorFallback => "vector_fallback",
            ScoreSource::TextMatchFallback => "text_match_fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub similarity: f32,
    pub rerank_score: Option<f32>,
    pub source: ScoreSource,
}

impl ScoredChunk {
    pub fn text(&self) -> &str {
        &self.chunk.text
    }
}

/// Pairwise `(query, candidate)` scorer used by the rerank stage.
///
/// Scores must be on `[0, 1]`; the engine compares them against `rerank_threshold`.
pub trait RelevanceScorer: Send + Sync + std::fmt::Debug {
    fn score_pairs(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>, RerankerError>;

    /// `true` when scores come from a loaded checkpoint rather than a heuristic.
    fn is_model_backed(&self) -> bool;
}

impl RelevanceScorer for Reranker {
    fn score_pairs(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>, RerankerError> {
        candidates
            .iter()
            .map(|candidate| self.score(query, candidate))
            .collect()
    }

    fn is_model_backed(&self) -> bool {
        self.is_model_loaded()
    }
}

/// Observability snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub total_searches: u64,
    pub cache_hits: u64,
    pub vector_searches: u64,
    pub rerank_triggered: u64,
    pub fallback_searches: u64,
    pub avg_search_ms: f64,
    pub last_error: Option<String>,
    pub index_size: usize,
    pub has_embedding_model: bool,
    pub has_reranker_model: bool,
    pub cache_size: usize,
    pub initialized: bool,
}

#[derive(Debug, Default)]
struct SearchCounters {
    total_searches: u64,
    cache_hits: u64,
    vector_searches: u64,
    rerank_triggered: u64,
    fallback_searches: u64,
    timed_searches: u64,
    avg_search_ms: f64,
    last_error: Option<String>,
}

enum ModelSource {
    FromConfig,
    Provided {
        encoder: Option<Arc<dyn TextEncoder>>,
        scorer: Option<Arc<dyn RelevanceScorer>>,
    },
}

struct LoadedIndex {
    index: VectorIndex,
    encoder: Option<Arc<dyn TextEncoder>>,
    scorer: Option<Arc<dyn RelevanceScorer>>,
}

/// Retrieval engine over a JSON knowledge source.
///
/// `search` is blocking (embedding and scoring run inline); async callers go
/// through [`crate::pipeline::AsyncRetriever`].
pub struct KnowledgeEngine {
    config: RetrievalConfig,
    models: ModelSource,
    state: RwLock<Option<Arc<LoadedIndex>>>,
    init_lock: Mutex<()>,
    query_cache: QueryCache,
    counters: Mutex<SearchCounters>,
}

impl std::fmt::Debug for KnowledgeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeEngine")
            .field("source_path", &self.config.source_path)
            .field("initialized", &self.is_initialized())
            .field("query_cache", &self.query_cache)
            .finish()
    }
}

impl KnowledgeEngine {
    /// Creates an engine that loads its encoder and reranker from `config`.
    ///
    /// With `lazy_load = false` the index is built before returning.
    pub fn new(config: RetrievalConfig) -> KnowledgeResult<Self> {
        Self::construct(config, ModelSource::FromConfig)
    }

    /// Creates an engine with caller-supplied models. `None` disables that stage.
    pub fn with_models(
        config: RetrievalConfig,
        encoder: Option<Arc<dyn TextEncoder>>,
        scorer: Option<Arc<dyn RelevanceScorer>>,
    ) -> KnowledgeResult<Self> {
        Self::construct(config, ModelSource::Provided { encoder, scorer })
    }

    fn construct(config: RetrievalConfig, models: ModelSource) -> KnowledgeResult<Self> {
        let engine = Self {
            query_cache: QueryCache::new(config.query_cache_ttl, config.query_cache_capacity),
            config,
            models,
            state: RwLock::new(None),
            init_lock: Mutex::new(()),
            counters: Mutex::new(SearchCounters::default()),
        };

        if !engine.config.lazy_load {
            engine.initialize()?;
        }
        Ok(engine)
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    /// Builds or loads the index. Idempotent; concurrent callers wait for one build.
    pub fn initialize(&self) -> KnowledgeResult<()> {
        self.ensure_initialized().map(|_| ())
    }

    /// Rebuilds the index from the source, ignoring any snapshot, and swaps it in.
    pub fn reload(&self) -> KnowledgeResult<()> {
        let _guard = self.init_lock.lock();
        let (encoder, scorer) = self.resolve_models();
        let index = self.build_from_source(encoder.as_deref())?;
        *self.state.write() = Some(Arc::new(LoadedIndex {
            index,
            encoder,
            scorer,
        }));
        self.query_cache.clear();
        info!("Knowledge index reloaded");
        Ok(())
    }

    fn ensure_initialized(&self) -> KnowledgeResult<Arc<LoadedIndex>> {
        if let Some(loaded) = self.state.read().as_ref() {
            return Ok(Arc::clone(loaded));
        }

        let _guard = self.init_lock.lock();
        if let Some(loaded) = self.state.read().as_ref() {
            return Ok(Arc::clone(loaded));
        }

        let started = Instant::now();
        let (encoder, scorer) = self.resolve_models();
        let index = self.load_or_build(encoder.as_deref())?;

        info!(
            chunks = index.len(),
            embeddings = index.has_embeddings(),
            reranker = scorer.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Knowledge engine initialized"
        );

        let loaded = Arc::new(LoadedIndex {
            index,
            encoder,
            scorer,
        });
        *self.state.write() = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    fn resolve_models(&self) -> (Option<Arc<dyn TextEncoder>>, Option<Arc<dyn RelevanceScorer>>) {
        match &self.models {
            ModelSource::Provided { encoder, scorer } => (encoder.clone(), scorer.clone()),
            ModelSource::FromConfig => {
                let encoder = match load_encoder(&self.config.encoder) {
                    Ok(encoder) => encoder,
                    Err(e) => {
                        info!(error = %e, "Encoder unavailable, retrieval runs lexical-only");
                        None
                    }
                };

                let scorer = self.config.reranker.as_ref().and_then(|rc| {
                    let config = RerankerConfig {
                        threshold: self.config.rerank_threshold,
                        ..rc.clone()
                    };
                    match Reranker::load(config) {
                        Ok(reranker) => Some(Arc::new(reranker) as Arc<dyn RelevanceScorer>),
                        Err(e) => {
                            warn!(error = %e, "Reranker unavailable, rerank stage disabled");
                            None
                        }
                    }
                });

                (encoder, scorer)
            }
        }
    }

    fn load_or_build(&self, encoder: Option<&dyn TextEncoder>) -> KnowledgeResult<VectorIndex> {
        let source = &self.config.source_path;
        let tag = encoder_tag(encoder);

        if !source.exists() {
            return match VectorIndex::load(&self.config.index_dir, None, &tag) {
                Ok(index) => {
                    warn!(
                        source = %source.display(),
                        "Knowledge source missing, serving from snapshot"
                    );
                    Ok(index)
                }
                Err(_) => Err(KnowledgeError::KnowledgeBaseNotFound {
                    path: source.clone(),
                }),
            };
        }

        let mtime = source_mtime(source)?;
        match VectorIndex::load(&self.config.index_dir, mtime, &tag) {
            Ok(index) => return Ok(index),
            Err(status) => debug!(?status, "Index snapshot unusable, rebuilding"),
        }

        self.build_from_source(encoder)
    }

    fn build_from_source(&self, encoder: Option<&dyn TextEncoder>) -> KnowledgeResult<VectorIndex> {
        let source = &self.config.source_path;
        if !source.exists() {
            return Err(KnowledgeError::KnowledgeBaseNotFound {
                path: source.clone(),
            });
        }

        let documents = read_source(source)?;
        let chunks = chunk_documents(
            &documents,
            self.config.chunk_size,
            self.config.chunk_overlap,
        );
        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            "Knowledge source chunked"
        );

        let index = VectorIndex::build(chunks, encoder, self.config.embed_batch_size)?;
        if let Err(e) = index.save(&self.config.index_dir) {
            warn!(error = %e, "Failed to write index snapshot");
        }
        Ok(index)
    }

    /// Returns up to `top_k` (default `config.top_k`) chunks for `query`.
    ///
    /// Errors only when the index cannot be initialized. Per-query failures
    /// fall back to substring matching.
    #[instrument(skip(self), fields(query_len = query.len()))]
    pub fn search(&self, query: &str, top_k: Option<usize>) -> KnowledgeResult<Vec<ScoredChunk>> {
        if query.trim().is_empty() {
            warn!("Ignoring empty retrieval query");
            return Ok(Vec::new());
        }

        let started = Instant::now();
        self.counters.lock().total_searches += 1;

        let loaded = self.ensure_initialized()?;
        let k = top_k.unwrap_or(self.config.top_k).max(1);
        let key = hash_query(query, k);

        if let Some(hit) = self.query_cache.get(&key) {
            self.counters.lock().cache_hits += 1;
            debug!(results = hit.len(), "Query cache hit");
            return Ok(hit.as_ref().clone());
        }

        let results = match self.run_stages(&loaded, query, k) {
            Ok(results) => {
                self.query_cache.insert(key, results.clone());
                results
            }
            Err(e) => {
                error!(error = %e, "Semantic search failed, using text match");
                {
                    let mut counters = self.counters.lock();
                    counters.last_error = Some(e.to_string());
                    counters.fallback_searches += 1;
                }
                text_match(&loaded.index, query, k)
            }
        };

        self.record_latency(started.elapsed());
        debug!(
            results = results.len(),
            source = results.first().map(|r| r.source.as_str()),
            "Search complete"
        );
        Ok(results)
    }

    fn run_stages(
        &self,
        loaded: &LoadedIndex,
        query: &str,
        k: usize,
    ) -> KnowledgeResult<Vec<ScoredChunk>> {
        let Some(encoder) = loaded.encoder.as_ref().filter(|_| loaded.index.has_embeddings())
        else {
            debug!("No embeddings available, using text match");
            self.counters.lock().fallback_searches += 1;
            return Ok(text_match(&loaded.index, query, k));
        };

        let query_vec = encoder.encode(query)?;
        let mut candidates: Vec<ScoredChunk> = loaded
            .index
            .search(&query_vec, self.config.vector_threshold, self.config.retrieve_k)
            .into_iter()
            .filter_map(|(idx, similarity)| {
                loaded.index.chunk(idx).map(|chunk| ScoredChunk {
                    chunk: chunk.clone(),
                    similarity,
                    rerank_score: None,
                    source: ScoreSource::Vector,
                })
            })
            .collect();
        self.counters.lock().vector_searches += 1;

        match &loaded.scorer {
            Some(scorer) if !candidates.is_empty() => {
                self.counters.lock().rerank_triggered += 1;
                Ok(self.rerank(scorer.as_ref(), query, candidates, k))
            }
            _ => {
                candidates.truncate(k);
                Ok(candidates)
            }
        }
    }

    fn rerank(
        &self,
        scorer: &dyn RelevanceScorer,
        query: &str,
        mut candidates: Vec<ScoredChunk>,
        k: usize,
    ) -> Vec<ScoredChunk> {
        let texts: Vec<&str> = candidates.iter().map(ScoredChunk::text).collect();
        let scored = scorer.score_pairs(query, &texts).and_then(|scores| {
            if scores.len() == candidates.len() {
                Ok(scores)
            } else {
                Err(RerankerError::Scoring {
                    reason: format!(
                        "scorer returned {} scores for {} candidates",
                        scores.len(),
                        candidates.len()
                    ),
                })
            }
        });

        match scored {
            Ok(scores) => {
                let threshold = self.config.rerank_threshold;
                let mut kept: Vec<ScoredChunk> = candidates
                    .into_iter()
                    .zip(scores)
                    .filter(|(_, score)| *score > threshold)
                    .map(|(mut candidate, score)| {
                        candidate.rerank_score = Some(score);
                        candidate.source = ScoreSource::Reranked;
                        candidate
                    })
                    .collect();
                kept.sort_by(|a, b| {
                    let a = a.rerank_score.unwrap_or(0.0);
                    let b = b.rerank_score.unwrap_or(0.0);
                    b.total_cmp(&a)
                });
                kept.truncate(k);
                kept
            }
            Err(e) => {
                warn!(error = %e, "Rerank failed, returning vector results");
                self.counters.lock().last_error = Some(e.to_string());
                candidates.truncate(k);
                for candidate in &mut candidates {
                    candidate.source = ScoreSource::VectorFallback;
                }
                candidates
            }
        }
    }

    fn record_latency(&self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        let mut counters = self.counters.lock();
        counters.timed_searches += 1;
        let n = counters.timed_searches as f64;
        counters.avg_search_ms += (ms - counters.avg_search_ms) / n;
    }

    /// Runs each query once to populate the query cache. Returns how many succeeded.
    pub fn warmup(&self, queries: &[&str]) -> usize {
        let started = Instant::now();
        let mut succeeded = 0;
        for query in queries {
            match self.search(query, None) {
                Ok(_) => succeeded += 1,
                Err(e) => warn!(query, error = %e, "Warmup query failed"),
            }
        }
        info!(
            queries = queries.len(),
            succeeded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Warmup complete"
        );
        succeeded
    }

    pub fn clear_cache(&self) {
        self.query_cache.clear();
        info!("Query cache cleared");
    }

    pub fn stats(&self) -> KnowledgeStats {
        let state = self.state.read().clone();
        let counters = self.counters.lock();
        KnowledgeStats {
            total_searches: counters.total_searches,
            cache_hits: counters.cache_hits,
            vector_searches: counters.vector_searches,
            rerank_triggered: counters.rerank_triggered,
            fallback_searches: counters.fallback_searches,
            avg_search_ms: counters.avg_search_ms,
            last_error: counters.last_error.clone(),
            index_size: state.as_ref().map(|s| s.index.len()).unwrap_or(0),
            has_embedding_model: state.as_ref().is_some_and(|s| s.encoder.is_some()),
            has_reranker_model: state
                .as_ref()
                .and_then(|s| s.scorer.as_ref())
                .is_some_and(|s| s.is_model_backed()),
            cache_size: self.query_cache.len(),
            initialized: state.is_some(),
        }
    }
}

#[async_trait]
impl HealthCheckable for KnowledgeEngine {
    fn component(&self) -> &'static str {
        "knowledge"
    }

    async fn check_health(&self) -> HealthReport {
        let stats = self.stats();
        let source_exists = self.config.source_path.exists();
        let ready = if stats.initialized {
            stats.index_size > 0
        } else {
            self.config.lazy_load && source_exists
        };

        let detail = json!({
            "initialized": stats.initialized,
            "index_size": stats.index_size,
            "source_exists": source_exists,
            "has_embedding_model": stats.has_embedding_model,
            "has_reranker_model": stats.has_reranker_model,
            "last_error": stats.last_error,
        });

        if ready {
            HealthReport::ready(detail)
        } else {
            HealthReport::not_ready(detail)
        }
    }
}

fn text_match(index: &VectorIndex, query: &str, k: usize) -> Vec<ScoredChunk> {
    index
        .text_match(query, k)
        .into_iter()
        .filter_map(|idx| index.chunk(idx))
        .map(|chunk| ScoredChunk {
            chunk: chunk.clone(),
            similarity: 1.0,
            rerank_score: None,
            source: ScoreSource::TextMatchFallback,
        })
        .collect()
}

/// Newest modification time across the source file, or a directory and its JSON files.
fn source_mtime(source: &Path) -> KnowledgeResult<Option<SystemTime>> {
    let mut newest = std::fs::metadata(source)?.modified().ok();
    if source.is_dir() {
        for path in json_files(source)? {
            let modified = std::fs::metadata(&path)?.modified().ok();
            newest = newest.max(modified);
        }
    }
    Ok(newest)
}

fn json_files(dir: &Path) -> KnowledgeResult<Vec<std::path::PathBuf>> {
    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

fn read_json(path: &Path) -> KnowledgeResult<Vec<FlatDocument>> {
    let raw = std::fs::read_to_string(path)?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| KnowledgeError::InvalidSource {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(flatten(&value))
}

/// Flattens a knowledge file, or every `*.json` file of a directory in name order.
pub(crate) fn read_source(source: &Path) -> KnowledgeResult<Vec<FlatDocument>> {
    if !source.is_dir() {
        return read_json(source);
    }

    let mut documents = Vec::new();
    for path in json_files(source)? {
        documents.extend(read_json(&path)?);
    }
    Ok(documents)
}
