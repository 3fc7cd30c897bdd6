pub mod config;
pub mod error;


pub use config::{CHECKPOINT_FILES, DEFAULT_THRESHOLD, MAX_SEQ_LEN, RerankerConfig};
pub use error::RerankerError;

use std::collections::HashSet;

use candle_core::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::embedding::bert::CrossEncoderModel;
use crate::embedding::device::{device_label, select_device};
use crate::embedding::error::EmbeddingError;
use crate::embedding::tokenizer::load_truncating_tokenizer;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "have", "has", "had", "do",
    "does", "did", "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "and", "but",
    "or", "if", "so", "what", "which", "who", "how", "when", "where", "why", "this", "that",
    "it", "its", "can", "will", "i", "you", "my", "me", "please", "的", "了", "吗", "呢", "吧",
    "啊", "是", "在", "我", "你", "请", "和", "有", "么",
];

/// Logistic squash onto `(0, 1)`.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Cross-encoder relevance scorer.
///
/// Scores are always sigmoid-normalized, so the engine's rerank threshold lives on
/// `[0, 1]` whether a checkpoint is loaded or the lexical scorer is in use.
pub struct Reranker {
    device: candle_core::Device,
    config: RerankerConfig,
    model: Option<CrossEncoderModel>,
    tokenizer: Option<Tokenizer>,
}

impl std::fmt::Debug for Reranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reranker")
            .field("device", &device_label(&self.device))
            .field("config", &self.config)
            .field("model_loaded", &self.is_model_loaded())
            .finish()
    }
}

impl Reranker {
    /// Loads the configured cross-encoder, or the lexical scorer when no path is set.
    pub fn load(config: RerankerConfig) -> Result<Self, RerankerError> {
        config
            .validate()
            .map_err(|reason| RerankerError::Settings { reason })?;

        let Some(model_path) = config.model_path.clone() else {
            info!("No reranker model configured, using lexical scorer");
            return Ok(Self::lexical_with(config));
        };

        if let Some(missing) = CHECKPOINT_FILES
            .iter()
            .map(|file| model_path.join(file))
            .find(|path| !path.exists())
        {
            return Err(EmbeddingError::MissingFile { path: missing }.into());
        }

        let device = select_device(false)?;
        info!(
            model_path = %model_path.display(),
            device = device_label(&device),
            threshold = config.threshold,
            "Loading cross-encoder"
        );

        let model = CrossEncoderModel::load(&model_path, &device).map_err(|e| {
            EmbeddingError::Load {
                reason: format!("cross-encoder weights: {e}"),
            }
        })?;
        let tokenizer = load_truncating_tokenizer(&model_path, config.max_seq_len).map_err(|e| {
            EmbeddingError::Load {
                reason: format!("cross-encoder tokenizer: {e}"),
            }
        })?;

        info!("Cross-encoder ready");

        Ok(Self {
            device,
            config,
            model: Some(model),
            tokenizer: Some(tokenizer),
        })
    }

    /// Reranker backed by the lexical scorer with default settings.
    pub fn lexical() -> Self {
        Self::lexical_with(RerankerConfig::lexical())
    }

    fn lexical_with(config: RerankerConfig) -> Self {
        Self {
            device: candle_core::Device::Cpu,
            config,
            model: None,
            tokenizer: None,
        }
    }

    /// Returns the sigmoid-normalized relevance of `candidate` to `query`.
    pub fn score(&self, query: &str, candidate: &str) -> Result<f32, RerankerError> {
        let raw = match (&self.model, &self.tokenizer) {
            (Some(model), Some(tokenizer)) => self.model_logit(model, tokenizer, query, candidate)?,
            _ => lexical_logit(query, candidate),
        };
        let score = sigmoid(raw);

        debug!(
            query_len = query.len(),
            candidate_len = candidate.len(),
            raw,
            score,
            "Scored query-candidate pair"
        );

        Ok(score)
    }

    fn model_logit(
        &self,
        model: &CrossEncoderModel,
        tokenizer: &Tokenizer,
        query: &str,
        candidate: &str,
    ) -> Result<f32, RerankerError> {
        let tokens = tokenizer
            .encode((query, candidate), true)
            .map_err(|e| RerankerError::scoring(format!("tokenization: {e}")))?;

        let token_ids = Tensor::new(tokens.get_ids(), &self.device)?.unsqueeze(0)?;
        let type_ids = Tensor::new(tokens.get_type_ids(), &self.device)?.unsqueeze(0)?;
        let attention_mask = Tensor::new(tokens.get_attention_mask(), &self.device)?.unsqueeze(0)?;

        let logits = model
            .forward(&token_ids, &type_ids, &attention_mask)
            .map_err(|e| RerankerError::scoring(e.to_string()))?;

        logits
            .flatten_all()?
            .to_vec1::<f32>()?
            .first()
            .copied()
            .ok_or_else(|| RerankerError::scoring("cross-encoder returned no logits"))
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model.is_some()
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0x3040..=0x30FF | 0xAC00..=0xD7AF | 0xF900..=0xFAFF)
}

/// Splits text into lexical terms: lowercase ASCII/Latin words, plus character
/// bigrams over CJK runs (a lone CJK character becomes a unigram).
pub(crate) fn lexical_terms(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    let mut terms = HashSet::new();
    let mut word = String::new();
    let mut cjk_run: Vec<char> = Vec::new();

    let flush_word = |word: &mut String, terms: &mut HashSet<String>| {
        if !word.is_empty() && !STOP_WORDS.contains(&word.as_str()) {
            terms.insert(std::mem::take(word));
        }
        word.clear();
    };
    let flush_cjk = |run: &mut Vec<char>, terms: &mut HashSet<String>| {
        let kept: Vec<char> = run
            .iter()
            .copied()
            .filter(|c| {
                let mut buf = [0u8; 4];
                !STOP_WORDS.contains(&&*c.encode_utf8(&mut buf))
            })
            .collect();
        match kept.len() {
            0 => {}
            1 => {
                terms.insert(kept[0].to_string());
            }
            _ => {
                for pair in kept.windows(2) {
                    terms.insert(pair.iter().collect());
                }
            }
        }
        run.clear();
    };

    for c in lowered.chars() {
        if is_cjk(c) {
            flush_word(&mut word, &mut terms);
            cjk_run.push(c);
        } else if c.is_alphanumeric() {
            flush_cjk(&mut cjk_run, &mut terms);
            word.push(c);
        } else {
            flush_word(&mut word, &mut terms);
            flush_cjk(&mut cjk_run, &mut terms);
        }
    }
    flush_word(&mut word, &mut terms);
    flush_cjk(&mut cjk_run, &mut terms);

    terms
}

/// Lexical relevance logit: `8 * (0.6 * recall + 0.4 * jaccard - 0.5)`.
fn lexical_logit(query: &str, candidate: &str) -> f32 {
    let query_terms = lexical_terms(query);
    let candidate_terms = lexical_terms(candidate);

    if query_terms.is_empty() {
        let shorter = query.chars().count().min(candidate.chars().count()) as f32;
        let longer = query.chars().count().max(candidate.chars().count()).max(1) as f32;
        return 8.0 * (0.3 * shorter / longer - 0.5);
    }

    let matches = query_terms.intersection(&candidate_terms).count();
    let recall = matches as f32 / query_terms.len() as f32;
    let union = query_terms.union(&candidate_terms).count();
    let jaccard = if union > 0 {
        matches as f32 / union as f32
    } else {
        0.0
    };

    let base = 0.6 * recall + 0.4 * jaccard;
    8.0 * (base - 0.5)
}
