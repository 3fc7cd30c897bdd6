use std::path::PathBuf;

/// Output dimension of the n-gram encoder.
pub const NGRAM_EMBEDDING_DIM: usize = 512;

/// Token limit for BERT encoder inputs.
pub const ENCODER_MAX_SEQ_LEN: usize = 512;

/// Which bi-encoder backend the retrieval engine uses.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderConfig {
    /// No vector stage; every search uses the lexical fallback.
    Disabled,
    Ngram {
        dim: usize,
    },
    Bert {
        model_dir: PathBuf,
        max_seq_len: usize,
    },
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig::Ngram {
            dim: NGRAM_EMBEDDING_DIM,
        }
    }
}

impl EncoderConfig {
    pub const ENV_BACKEND: &'static str = "KESTREL_ENCODER";
    pub const ENV_MODEL_DIR: &'static str = "KESTREL_ENCODER_PATH";

    pub fn bert<P: Into<PathBuf>>(model_dir: P) -> Self {
        EncoderConfig::Bert {
            model_dir: model_dir.into(),
            max_seq_len: ENCODER_MAX_SEQ_LEN,
        }
    }

    /// Reads `KESTREL_ENCODER` (`ngram` | `bert` | `none`) and `KESTREL_ENCODER_PATH`.
    ///
    /// A model path without an explicit backend selects `bert`.
    pub fn from_env() -> Result<Self, String> {
        let backend = std::env::var(Self::ENV_BACKEND)
            .ok()
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty());
        let model_dir = std::env::var(Self::ENV_MODEL_DIR)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        match (backend.as_deref(), model_dir) {
            (Some("none") | Some("disabled"), _) => Ok(EncoderConfig::Disabled),
            (Some("ngram"), _) | (None, None) => Ok(EncoderConfig::default()),
            (Some("bert"), Some(dir)) | (None, Some(dir)) => Ok(EncoderConfig::bert(dir)),
            (Some("bert"), None) => Err(format!(
                "{} must be set when {}=bert",
                Self::ENV_MODEL_DIR,
                Self::ENV_BACKEND
            )),
            (Some(other), _) => Err(format!("unknown encoder backend '{other}'")),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            EncoderConfig::Disabled => Ok(()),
            EncoderConfig::Ngram { dim } if *dim == 0 => {
                Err("n-gram dimension must be non-zero".to_string())
            }
            EncoderConfig::Ngram { .. } => Ok(()),
            EncoderConfig::Bert { model_dir, .. } if model_dir.as_os_str().is_empty() => {
                Err("encoder model_dir cannot be empty".to_string())
            }
            EncoderConfig::Bert { max_seq_len, .. } if *max_seq_len == 0 => {
                Err("encoder max_seq_len must be non-zero".to_string())
            }
            EncoderConfig::Bert { .. } => Ok(()),
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, EncoderConfig::Disabled)
    }
}
