//! Cross-cutting, shared constants.
//!
//! Module-level config types default to these values, so tests and the binary
//! agree on the same numbers without importing each other's config.

/// Candidates pulled from the vector stage before reranking.
pub const DEFAULT_RETRIEVE_K: usize = 20;
/// Results returned to the caller after reranking.
pub const DEFAULT_TOP_K: usize = 3;
/// Stage-1 similarity floor (exclusive).
pub const DEFAULT_VECTOR_THRESHOLD: f32 = 0.35;
/// Stage-2 floor (exclusive) on the sigmoid-normalized rerank score.
pub const DEFAULT_RERANK_THRESHOLD: f32 = 0.5;

pub const DEFAULT_CHUNK_SIZE: usize = 300;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
/// Windowed chunks whose trimmed text is shorter than this are dropped.
pub const MIN_CHUNK_LENGTH: usize = 10;
/// Flattened documents shorter than this are never chunked.
pub const MIN_DOCUMENT_LENGTH: usize = 5;
/// Characters of the source document kept on windowed chunks for provenance.
pub const ORIGINAL_DOC_EXCERPT_CHARS: usize = 200;

pub const QUERY_CACHE_TTL_SECS: u64 = 3600;
pub const QUERY_CACHE_CAPACITY: usize = 2000;
/// Fraction of the query cache dropped when nothing has expired yet.
pub const QUERY_CACHE_EVICT_FRACTION: f64 = 0.2;

pub const RETRIEVER_CACHE_TTL_SECS: u64 = 600;
pub const RETRIEVER_CACHE_CAPACITY: u64 = 2000;
pub const RETRIEVER_WORKERS: usize = 4;

pub const DEFAULT_MEMORY_MAX_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_DISK_MAX_BYTES: u64 = 1024 * 1024 * 1024;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;
/// Disk usage target, as a fraction of the ceiling, after an over-limit sweep.
pub const DISK_TARGET_RATIO: f64 = 0.8;
/// Entries larger than `memory budget / MEMORY_ENTRY_DIVISOR` skip the memory tier.
pub const MEMORY_ENTRY_DIVISOR: u64 = 10;

pub const DEFAULT_SIMPLE_LIMIT: usize = 20;
pub const DEFAULT_COMPLEX_LIMIT: usize = 5;
pub const DEFAULT_UNKNOWN_LIMIT: usize = 5;

pub const MAX_PROMPT_TOKENS: usize = 98_304;
pub const CHARS_PER_TOKEN: usize = 4;
pub const TRUNCATION_MARKER: &str = "...[内容已截断]";
pub const MAX_REPLY_CHARS: usize = 2000;
pub const TRUNCATED_REPLY_CHARS: usize = 1950;
pub const EMPTY_REPLY_TEXT: &str = "抱歉，回复内容为空，请重试。";

pub const MODEL_CACHE_TTL_SECS: u64 = 3600;
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;
pub const MAX_ATTEMPTS_PER_MODEL: u32 = 3;
pub const MIN_REQUEST_INTERVAL_MS: u64 = 1000;
pub const FAILOVER_PAUSE_MS: u64 = 500;
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

pub const MODEL_V32: &str = "deepseek/deepseek-v3.2";
pub const MODEL_V32_THINK: &str = "deepseek/deepseek-v3.2-think";
pub const MODEL_V31: &str = "deepseek/deepseek-v3.1";

/// Ordered failover chain tried after the requested model.
pub const FALLBACK_MODELS: [&str; 3] = [MODEL_V32, MODEL_V32_THINK, MODEL_V31];

pub const DEFAULT_BASE_URL: &str = "https://router.shengsuanyun.com/api/v1";

pub const NO_KNOWLEDGE_REPLY: &str = "抱歉，知识库中暂时没有相关记录。";
