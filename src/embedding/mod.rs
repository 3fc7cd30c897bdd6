//! Embedding + model utilities.
//!
//! - [`encoder`] produces the bi-encoder vectors searched by [`crate::knowledge`].
//! - [`reranker`] provides cross-encoder scoring for the second retrieval stage.

/// BERT-family model wrappers shared by the encoder and reranker.
pub mod bert;
/// Device selection (CPU / Metal / CUDA).
pub mod device;
/// Bi-encoder backends.
pub mod encoder;
mod error;
/// Cross-encoder reranker.
pub mod reranker;
/// Tokenizer loading helpers.
pub mod tokenizer;

pub use encoder::{
    BertEncoder, EncoderConfig, NGRAM_EMBEDDING_DIM, NgramEncoder, TextEncoder, load_encoder,
};
pub use error::EmbeddingError;
pub use reranker::{DEFAULT_THRESHOLD, Reranker, RerankerConfig, RerankerError};
