//! Knowledge retrieval.
//!
//! A JSON knowledge tree is flattened and chunked ([`chunker`]), embedded into
//! an exact inner-product [`index`], and searched by [`KnowledgeEngine`] in two
//! stages with a lexical fallback and a query-level cache.

pub mod chunker;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod query_cache;

#[cfg(test)]
mod tests;

pub use chunker::{ChunkMetadata, FlatDocument, KnowledgeChunk, chunk_documents, flatten};
pub use config::RetrievalConfig;
pub use engine::{KnowledgeEngine, KnowledgeStats, RelevanceScorer, ScoreSource, ScoredChunk};
pub use error::{KnowledgeError, KnowledgeResult};
pub use index::{SNAPSHOT_FILENAME, SNAPSHOT_VERSION, VectorIndex};
pub use query_cache::QueryCache;
