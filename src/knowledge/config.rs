use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_RERANK_THRESHOLD, DEFAULT_RETRIEVE_K,
    DEFAULT_TOP_K, DEFAULT_VECTOR_THRESHOLD, QUERY_CACHE_CAPACITY, QUERY_CACHE_TTL_SECS,
};
use crate::embedding::{EncoderConfig, RerankerConfig};

pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

/// Retrieval engine settings.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// JSON file, or a directory of `*.json` files.
    pub source_path: PathBuf,
    /// Directory holding `vector_index.rkyv`.
    pub index_dir: PathBuf,

    pub chunk_size: usize,
    pub chunk_overlap: usize,

    /// Stage-1 candidate count.
    pub retrieve_k: usize,
    /// Final result count when the caller passes none.
    pub top_k: usize,
    pub vector_threshold: f32,
    pub rerank_threshold: f32,

    /// Defer index construction to the first search.
    pub lazy_load: bool,

    pub query_cache_ttl: Duration,
    pub query_cache_capacity: usize,
    pub embed_batch_size: usize,

    pub encoder: EncoderConfig,
    /// `None` disables the rerank stage.
    pub reranker: Option<RerankerConfig>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("data/knowledge_base.json"),
            index_dir: PathBuf::from("data/vector_cache"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            retrieve_k: DEFAULT_RETRIEVE_K,
            top_k: DEFAULT_TOP_K,
            vector_threshold: DEFAULT_VECTOR_THRESHOLD,
            rerank_threshold: DEFAULT_RERANK_THRESHOLD,
            lazy_load: true,
            query_cache_ttl: Duration::from_secs(QUERY_CACHE_TTL_SECS),
            query_cache_capacity: QUERY_CACHE_CAPACITY,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            encoder: EncoderConfig::default(),
            reranker: Some(RerankerConfig::lexical()),
        }
    }
}

impl RetrievalConfig {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(source_path: P, index_dir: Q) -> Self {
        Self {
            source_path: source_path.into(),
            index_dir: index_dir.into(),
            ..Default::default()
        }
    }

    /// Lexical-only engine: no encoder, no reranker.
    pub fn lexical_only(mut self) -> Self {
        self.encoder = EncoderConfig::Disabled;
        self.reranker = None;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_lazy_load(mut self, lazy_load: bool) -> Self {
        self.lazy_load = lazy_load;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(1..=100).contains(&self.top_k) {
            return Err(format!("top_k must be in 1..=100, got {}", self.top_k));
        }
        if self.retrieve_k == 0 {
            return Err("retrieve_k must be non-zero".to_string());
        }
        if !(0.0..=1.0).contains(&self.vector_threshold) {
            return Err(format!(
                "vector_threshold must be between 0.0 and 1.0, got {}",
                self.vector_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.rerank_threshold) {
            return Err(format!(
                "rerank_threshold must be between 0.0 and 1.0, got {}",
                self.rerank_threshold
            ));
        }
        if self.chunk_size == 0 {
            return Err("chunk_size must be non-zero".to_string());
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            ));
        }
        if self.query_cache_capacity == 0 {
            return Err("query_cache_capacity must be non-zero".to_string());
        }
        self.encoder.validate()?;
        if let Some(reranker) = &self.reranker {
            reranker.validate()?;
        }
        Ok(())
    }
}
