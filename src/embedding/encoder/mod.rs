//! Bi-encoders used by the vector stage.
//!
//! Two backends implement [`TextEncoder`]:
//! - [`NgramEncoder`]: signed feature hashing over character unigrams and bigrams.
//!   No model files, fully deterministic, works for CJK text without segmentation.
//! - [`BertEncoder`]: a BERT checkpoint mean-pooled over the attention mask.
//!
//! All vectors are L2-normalized, so inner product equals cosine similarity.

pub mod config;

#[cfg(test)]
mod tests;

pub use config::{ENCODER_MAX_SEQ_LEN, EncoderConfig, NGRAM_EMBEDDING_DIM};

use std::path::Path;
use std::sync::Arc;

use candle_core::{Device, Tensor};
use half::f16;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::bert::PooledEncoderModel;
use super::device::{device_label, select_device};
use super::error::EmbeddingError;
use super::tokenizer::load_truncating_tokenizer;
use crate::hashing::hash_to_u64;

/// Produces normalized sentence embeddings.
pub trait TextEncoder: Send + Sync + std::fmt::Debug {
    /// Backend label for stats and health output.
    fn backend(&self) -> &'static str;

    fn dim(&self) -> usize;

    fn encode(&self, text: &str) -> Result<Vec<f16>, EmbeddingError>;

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f16>>, EmbeddingError> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}

/// Loads the encoder selected by `config`. `Ok(None)` means lexical-only mode.
pub fn load_encoder(config: &EncoderConfig) -> Result<Option<Arc<dyn TextEncoder>>, EmbeddingError> {
    match config {
        EncoderConfig::Disabled => {
            info!("Vector encoder disabled, retrieval runs lexical-only");
            Ok(None)
        }
        EncoderConfig::Ngram { dim } => Ok(Some(Arc::new(NgramEncoder::new(*dim)?))),
        EncoderConfig::Bert {
            model_dir,
            max_seq_len,
        } => Ok(Some(Arc::new(BertEncoder::load(model_dir, *max_seq_len)?))),
    }
}

/// L2-normalizes `values` and narrows them to `f16`. Zero vectors stay zero.
pub(crate) fn normalize_to_f16(mut values: Vec<f32>) -> Vec<f16> {
    let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut values {
            *x /= norm;
        }
    }
    values.into_iter().map(f16::from_f32).collect()
}

const UNIGRAM_WEIGHT: f32 = 0.5;
const BIGRAM_WEIGHT: f32 = 1.0;

/// Feature-hashing encoder over character n-grams.
#[derive(Debug, Clone)]
pub struct NgramEncoder {
    dim: usize,
}

impl NgramEncoder {
    pub fn new(dim: usize) -> Result<Self, EmbeddingError> {
        if dim == 0 {
            return Err(EmbeddingError::Settings {
                reason: "n-gram encoder dimension must be non-zero".to_string(),
            });
        }
        Ok(Self { dim })
    }

    fn bump(&self, out: &mut [f32], gram: &str, weight: f32) {
        let h = hash_to_u64(gram.as_bytes());
        let idx = (h % self.dim as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        out[idx] += sign * weight;
    }
}

impl Default for NgramEncoder {
    fn default() -> Self {
        Self {
            dim: NGRAM_EMBEDDING_DIM,
        }
    }
}

impl TextEncoder for NgramEncoder {
    fn backend(&self) -> &'static str {
        "ngram"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn encode(&self, text: &str) -> Result<Vec<f16>, EmbeddingError> {
        let chars: Vec<char> = text
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();

        let mut features = vec![0.0f32; self.dim];
        let mut gram = String::with_capacity(8);
        for (i, c) in chars.iter().enumerate() {
            gram.clear();
            gram.push(*c);
            self.bump(&mut features, &gram, UNIGRAM_WEIGHT);

            if let Some(next) = chars.get(i + 1) {
                gram.push(*next);
                self.bump(&mut features, &gram, BIGRAM_WEIGHT);
            }
        }

        Ok(normalize_to_f16(features))
    }
}

/// Mean-pooled BERT sentence encoder.
pub struct BertEncoder {
    model: PooledEncoderModel,
    tokenizer: Arc<Tokenizer>,
    device: Device,
}

impl std::fmt::Debug for BertEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BertEncoder")
            .field("device", &device_label(&self.device))
            .field("dim", &self.model.hidden_size())
            .finish()
    }
}

impl BertEncoder {
    pub fn load(model_dir: &Path, max_seq_len: usize) -> Result<Self, EmbeddingError> {
        for required in ["config.json", "model.safetensors"] {
            if !model_dir.join(required).exists() {
                return Err(EmbeddingError::MissingFile {
                    path: model_dir.join(required),
                });
            }
        }

        let device = select_device(false)?;
        let tokenizer = load_truncating_tokenizer(model_dir, max_seq_len).map_err(|e| {
            EmbeddingError::Tokenizer {
                reason: format!("failed to load tokenizer: {e}"),
            }
        })?;
        let model = PooledEncoderModel::load(model_dir, &device).map_err(|e| {
            EmbeddingError::Load {
                reason: format!("failed to load BERT encoder: {e}"),
            }
        })?;

        info!(
            model_dir = %model_dir.display(),
            device = device_label(&device),
            dim = model.hidden_size(),
            "BERT encoder loaded"
        );

        Ok(Self {
            model,
            tokenizer: Arc::new(tokenizer),
            device,
        })
    }

    fn row_tensor(&self, values: &[u32]) -> Result<Tensor, EmbeddingError> {
        Ok(Tensor::new(values, &self.device)?.unsqueeze(0)?)
    }
}

impl TextEncoder for BertEncoder {
    fn backend(&self) -> &'static str {
        "bert"
    }

    fn dim(&self) -> usize {
        self.model.hidden_size()
    }

    fn encode(&self, text: &str) -> Result<Vec<f16>, EmbeddingError> {
        let encoding =
            self.tokenizer
                .encode(text, true)
                .map_err(|e| EmbeddingError::Tokenizer {
                    reason: e.to_string(),
                })?;

        if encoding.get_ids().is_empty() {
            return Ok(vec![f16::ZERO; self.dim()]);
        }

        debug!(
            text_len = text.len(),
            tokens = encoding.get_ids().len(),
            "Encoding text"
        );

        let input_ids = self.row_tensor(encoding.get_ids())?;
        let type_ids = self.row_tensor(encoding.get_type_ids())?;
        let mask = self.row_tensor(encoding.get_attention_mask())?;

        let pooled = self.model.embed(&input_ids, &type_ids, &mask)?;
        Ok(normalize_to_f16(pooled))
    }
}
