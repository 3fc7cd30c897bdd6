use std::path::PathBuf;

pub const DEFAULT_THRESHOLD: f32 = crate::constants::DEFAULT_RERANK_THRESHOLD;

/// Token limit for a query-candidate pair.
pub const MAX_SEQ_LEN: usize = 512;

/// Files a cross-encoder checkpoint directory must contain.
pub const CHECKPOINT_FILES: [&str; 2] = ["config.json", "model.safetensors"];

/// Second-stage scorer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankerConfig {
    /// Cross-encoder checkpoint directory. `None` selects the lexical scorer.
    pub model_path: Option<PathBuf>,
    /// Candidates must score strictly above this, after sigmoid normalization.
    pub threshold: f32,
    pub max_seq_len: usize,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self::lexical()
    }
}

impl RerankerConfig {
    pub const ENV_MODEL_PATH: &'static str = "KESTREL_RERANKER_PATH";
    pub const ENV_THRESHOLD: &'static str = "KESTREL_RERANK_THRESHOLD";

    /// Cross-encoder loaded from `model_path`.
    pub fn new<P: Into<PathBuf>>(model_path: P) -> Self {
        Self {
            model_path: Some(model_path.into()),
            ..Self::lexical()
        }
    }

    pub fn lexical() -> Self {
        Self {
            model_path: None,
            threshold: DEFAULT_THRESHOLD,
            max_seq_len: MAX_SEQ_LEN,
        }
    }

    /// Out-of-range values are rejected by [`validate`](Self::validate).
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn is_lexical(&self) -> bool {
        self.model_path.is_none()
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(format!(
                "rerank threshold must be within [0, 1], got {}",
                self.threshold
            ));
        }
        if self.max_seq_len == 0 {
            return Err("reranker max_seq_len must be non-zero".to_string());
        }
        match &self.model_path {
            Some(path) if path.as_os_str().is_empty() => {
                Err("reranker model_path is set but empty".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Reads `KESTREL_RERANKER_PATH` and `KESTREL_RERANK_THRESHOLD`.
    ///
    /// Fails only on an unparsable threshold.
    pub fn from_env() -> Result<Self, String> {
        let mut config = match std::env::var(Self::ENV_MODEL_PATH) {
            Ok(path) if !path.trim().is_empty() => Self::new(path.trim()),
            _ => Self::lexical(),
        };

        if let Ok(raw) = std::env::var(Self::ENV_THRESHOLD) {
            config.threshold = raw
                .trim()
                .parse()
                .map_err(|e| format!("{} is not a number: {e}", Self::ENV_THRESHOLD))?;
        }
        Ok(config)
    }
}
