//! Environment-backed configuration.
//!
//! Every setting has a default. Override with `KESTREL_*` environment variables.

pub mod error;


pub use error::ConfigError;

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::cache::CacheConfig;
use crate::constants::{MODEL_V31, MODEL_V32, MODEL_V32_THINK};
use crate::embedding::{EncoderConfig, RerankerConfig};
use crate::knowledge::RetrievalConfig;
use crate::llm::ModelConfig;
use crate::routing::AdmissionConfig;

/// Model names validated without a warning.
pub const ALLOWED_MODELS: [&str; 3] = [MODEL_V32, MODEL_V32_THINK, MODEL_V31];

/// Settings for every pipeline component.
///
/// Use [`PipelineConfig::from_env`] to read `KESTREL_*` overrides on top of defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub retrieval: RetrievalConfig,
    pub cache: CacheConfig,
    pub admission: AdmissionConfig,
    pub model: ModelConfig,
    /// Run [`crate::pipeline::SupportPipeline::warmup`] after startup. Default: `true`.
    pub auto_warmup: bool,
    /// Start the periodic cache sweep. Default: `true`.
    pub cache_sweeper: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retrieval: RetrievalConfig::default(),
            cache: CacheConfig::default(),
            admission: AdmissionConfig::default(),
            model: ModelConfig::default(),
            auto_warmup: true,
            cache_sweeper: true,
        }
    }
}

impl PipelineConfig {
    pub const ENV_API_KEY: &'static str = "KESTREL_API_KEY";
    /// Accepted when `KESTREL_API_KEY` is unset.
    pub const ENV_LEGACY_API_KEY: &'static str = "DEEPSEEK_API_KEY";
    pub const ENV_BASE_URL: &'static str = "KESTREL_BASE_URL";
    pub const ENV_SIMPLE_MODEL: &'static str = "KESTREL_SIMPLE_MODEL";
    pub const ENV_COMPLEX_MODEL: &'static str = "KESTREL_COMPLEX_MODEL";
    /// Empty or `none` disables the model routing tier.
    pub const ENV_ROUTER_MODEL: &'static str = "KESTREL_ROUTER_MODEL";
    pub const ENV_REQUEST_TIMEOUT_SECS: &'static str = "KESTREL_REQUEST_TIMEOUT_SECS";
    pub const ENV_MODEL_CACHE_TTL_SECS: &'static str = "KESTREL_MODEL_CACHE_TTL_SECS";
    pub const ENV_OFFLINE_REPLIES: &'static str = "KESTREL_OFFLINE_REPLIES";

    pub const ENV_KNOWLEDGE_PATH: &'static str = "KESTREL_KNOWLEDGE_PATH";
    pub const ENV_INDEX_DIR: &'static str = "KESTREL_INDEX_DIR";
    pub const ENV_TOP_K: &'static str = "KESTREL_TOP_K";
    pub const ENV_VECTOR_THRESHOLD: &'static str = "KESTREL_VECTOR_THRESHOLD";
    pub const ENV_LAZY_LOAD: &'static str = "KESTREL_LAZY_LOAD";

    pub const ENV_CACHE_DIR: &'static str = "KESTREL_CACHE_DIR";
    pub const ENV_MEMORY_MAX_BYTES: &'static str = "KESTREL_MEMORY_MAX_BYTES";
    pub const ENV_DISK_MAX_BYTES: &'static str = "KESTREL_DISK_MAX_BYTES";
    pub const ENV_CACHE_TTL_SECS: &'static str = "KESTREL_CACHE_TTL_SECS";

    pub const ENV_SIMPLE_LIMIT: &'static str = "KESTREL_SIMPLE_LIMIT";
    pub const ENV_COMPLEX_LIMIT: &'static str = "KESTREL_COMPLEX_LIMIT";

    pub const ENV_AUTO_WARMUP: &'static str = "KESTREL_AUTO_WARMUP";

    /// Loads configuration from environment variables (falling back to defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let mut model = defaults.model;
        model.api_key = Self::parse_optional_string_from_env(Self::ENV_API_KEY)
            .or_else(|| Self::parse_optional_string_from_env(Self::ENV_LEGACY_API_KEY))
            .unwrap_or(model.api_key);
        model.base_url = Self::parse_string_from_env(Self::ENV_BASE_URL, model.base_url);
        model.simple_model = Self::parse_string_from_env(Self::ENV_SIMPLE_MODEL, model.simple_model);
        model.complex_model =
            Self::parse_string_from_env(Self::ENV_COMPLEX_MODEL, model.complex_model);
        if let Ok(value) = env::var(Self::ENV_ROUTER_MODEL) {
            let value = value.trim();
            model.router_model = match value {
                "" => None,
                v if v.eq_ignore_ascii_case("none") => None,
                v => Some(v.to_string()),
            };
        }
        model.request_timeout =
            Self::parse_secs_from_env(Self::ENV_REQUEST_TIMEOUT_SECS, model.request_timeout)?;
        model.cache_ttl = Self::parse_secs_from_env(Self::ENV_MODEL_CACHE_TTL_SECS, model.cache_ttl)?;
        if let Some(path) = Self::parse_optional_path_from_env(Self::ENV_OFFLINE_REPLIES) {
            model.offline_replies_path = Some(path);
        }

        let mut retrieval = defaults.retrieval;
        retrieval.source_path =
            Self::parse_path_from_env(Self::ENV_KNOWLEDGE_PATH, retrieval.source_path);
        retrieval.index_dir = Self::parse_path_from_env(Self::ENV_INDEX_DIR, retrieval.index_dir);
        retrieval.top_k = Self::parse_from_env(Self::ENV_TOP_K, retrieval.top_k)?;
        retrieval.vector_threshold =
            Self::parse_from_env(Self::ENV_VECTOR_THRESHOLD, retrieval.vector_threshold)?;
        retrieval.lazy_load = Self::parse_bool_from_env(Self::ENV_LAZY_LOAD, retrieval.lazy_load)?;
        retrieval.encoder = EncoderConfig::from_env().map_err(|reason| ConfigError::InvalidEnvVar {
            name: EncoderConfig::ENV_BACKEND,
            value: env::var(EncoderConfig::ENV_BACKEND).unwrap_or_default(),
            reason,
        })?;
        let reranker = RerankerConfig::from_env().map_err(|reason| ConfigError::InvalidEnvVar {
            name: RerankerConfig::ENV_THRESHOLD,
            value: env::var(RerankerConfig::ENV_THRESHOLD).unwrap_or_default(),
            reason,
        })?;
        retrieval.rerank_threshold = reranker.threshold;
        retrieval.reranker = Some(reranker);

        let mut cache = defaults.cache;
        cache.cache_dir = Self::parse_path_from_env(Self::ENV_CACHE_DIR, cache.cache_dir);
        cache.memory_max_bytes =
            Self::parse_from_env(Self::ENV_MEMORY_MAX_BYTES, cache.memory_max_bytes)?;
        cache.disk_max_bytes = Self::parse_from_env(Self::ENV_DISK_MAX_BYTES, cache.disk_max_bytes)?;
        cache.default_ttl = Self::parse_secs_from_env(Self::ENV_CACHE_TTL_SECS, cache.default_ttl)?;

        let mut admission = defaults.admission;
        admission.simple_limit = Self::parse_from_env(Self::ENV_SIMPLE_LIMIT, admission.simple_limit)?;
        admission.complex_limit =
            Self::parse_from_env(Self::ENV_COMPLEX_LIMIT, admission.complex_limit)?;

        let auto_warmup = Self::parse_bool_from_env(Self::ENV_AUTO_WARMUP, defaults.auto_warmup)?;

        Ok(Self {
            retrieval,
            cache,
            admission,
            model,
            auto_warmup,
            cache_sweeper: defaults.cache_sweeper,
        })
    }

    /// Checks every section. Model names outside [`ALLOWED_MODELS`] only warn.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.admission
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                section: "admission",
                reason,
            })?;
        self.retrieval
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                section: "retrieval",
                reason,
            })?;
        self.cache.validate().map_err(|reason| ConfigError::Invalid {
            section: "cache",
            reason,
        })?;
        self.model.validate().map_err(|reason| ConfigError::Invalid {
            section: "model",
            reason,
        })?;

        for (role, model) in self.model.roles() {
            if !ALLOWED_MODELS.contains(&model) {
                warn!(role, model, "Model is not in the recommended list");
            }
        }
        Ok(())
    }

    /// Models used outside [`ALLOWED_MODELS`], as `(role, model)`.
    pub fn unlisted_models(&self) -> Vec<(&'static str, &str)> {
        self.model
            .roles()
            .into_iter()
            .filter(|(_, model)| !ALLOWED_MODELS.contains(model))
            .collect()
    }

    fn parse_from_env<T>(var_name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(var_name) {
            Ok(value) => value
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar {
                    name: var_name,
                    reason: e.to_string(),
                    value,
                }),
            Err(_) => Ok(default),
        }
    }

    fn parse_secs_from_env(var_name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        Self::parse_from_env(var_name, default.as_secs()).map(Duration::from_secs)
    }

    fn parse_bool_from_env(var_name: &'static str, default: bool) -> Result<bool, ConfigError> {
        match env::var(var_name) {
            Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidEnvVar {
                    name: var_name,
                    value,
                    reason: "expected a boolean".to_string(),
                }),
            },
            Err(_) => Ok(default),
        }
    }

    fn parse_path_from_env(var_name: &str, default: PathBuf) -> PathBuf {
        Self::parse_optional_path_from_env(var_name).unwrap_or(default)
    }

    fn parse_optional_path_from_env(var_name: &str) -> Option<PathBuf> {
        Self::parse_optional_string_from_env(var_name).map(PathBuf::from)
    }

    fn parse_string_from_env(var_name: &str, default: String) -> String {
        Self::parse_optional_string_from_env(var_name).unwrap_or(default)
    }

    fn parse_optional_string_from_env(var_name: &str) -> Option<String> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}
