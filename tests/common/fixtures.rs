//! Shared setup for integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use kestrel::cache::CacheConfig;
use kestrel::config::PipelineConfig;
use kestrel::knowledge::RetrievalConfig;
use kestrel::llm::ModelConfig;
use serde_json::{Value, json};

pub const BILLING_RULE: &str = "API调用计费规则：按调用次数计费，每千次调用0.5元";
pub const SLA_RULE: &str = "系统可用性99.9%，故障响应时间小于15分钟";

pub fn knowledge_base() -> Value {
    json!({
        "billing": {"rules": BILLING_RULE},
        "sla": [SLA_RULE, "全年无休，节假日同样提供技术支持"]
    })
}

pub fn write_json(path: &Path, value: &Value) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

/// Writes the default knowledge base under `root` and returns its path.
pub fn write_knowledge_base(root: &Path) -> PathBuf {
    let path = root.join("knowledge_base.json");
    write_json(&path, &knowledge_base());
    path
}

/// Model settings with no routing model, no fallbacks and no pacing.
pub fn model_config() -> ModelConfig {
    ModelConfig {
        router_model: None,
        fallback_models: Vec::new(),
        offline_replies_path: None,
        max_attempts: 1,
        min_request_interval: Duration::ZERO,
        failover_pause: Duration::ZERO,
        ..ModelConfig::default()
    }
}

/// Pipeline settings rooted in `root`, using lexical retrieval only.
pub fn pipeline_config(root: &Path) -> PipelineConfig {
    let source = write_knowledge_base(root);
    PipelineConfig {
        retrieval: RetrievalConfig::new(source, root.join("vector_cache")).lexical_only(),
        cache: CacheConfig::new(root.join("cache")),
        model: model_config(),
        auto_warmup: false,
        cache_sweeper: false,
        ..PipelineConfig::default()
    }
}
