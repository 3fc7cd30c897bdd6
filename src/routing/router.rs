use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::health::{HealthCheckable, HealthReport};
use crate::llm::{ChatMessage, ChatRequest, Completion, ModelClient};

pub const SIMPLE_PATTERNS: [&str; 4] = [
    r"(?i)^(你好|在吗|hi|hello|早上好|晚上好|午安|晚安)$",
    r"(?i)^(谢谢|感谢|再见|拜拜|ok|好的|好的呢|嗯嗯)$",
    r"^.{0,4}$",
    r"(?i)^(请问|你好|哈喽)[，。！？]*$",
];

pub const COMPLEX_PATTERNS: [&str; 4] = [
    r"(?i)(怎么|如何|为什么|什么原因|怎么办|怎么解决|怎么处理)",
    r"(?i)(错误|故障|异常|报错|bug|问题|issue)",
    r"(?i)(配置|设置|安装|部署|搭建|启动|运行)",
    r"(?i)(api|接口|调用|请求|响应|返回)",
];

/// Queries longer than this (in chars) fall back to COMPLEX.
pub const FALLBACK_COMPLEX_CHARS: usize = 50;

const SIMPLE_MARKER: &str = "[SIMPLE]";

const INTENT_PROMPT: &str = "判断下面这条客服消息的意图。\
如果是问候、寒暄、致谢等无需查询资料的简单对话，只回复[SIMPLE]；\
如果需要查询知识库或提供技术支持，只回复[COMPLEX]。\n消息：";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteClass {
    Simple,
    Complex,
    /// Admission pool for traffic that is neither; the router never emits it.
    Unknown,
}

impl RouteClass {
    pub const ALL: [RouteClass; 3] = [RouteClass::Simple, RouteClass::Complex, RouteClass::Unknown];

    pub fn as_str(self) -> &'static str {
        match self {
            RouteClass::Simple => "SIMPLE",
            RouteClass::Complex => "COMPLEX",
            RouteClass::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for RouteClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tier produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Rule,
    Model,
    Fallback,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteDecision {
    pub class: RouteClass,
    pub provenance: Provenance,
}

impl RouteDecision {
    fn new(class: RouteClass, provenance: Provenance) -> Self {
        Self { class, provenance }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    pub rule_hit_simple: u64,
    pub rule_hit_complex: u64,
    pub model_simple: u64,
    pub model_complex: u64,
    pub fallback_simple: u64,
    pub fallback_complex: u64,
}

struct ModelClassifier {
    client: Arc<ModelClient>,
    model: String,
}

/// Three-tier query classifier: regex rules, an optional model call, then a length heuristic.
pub struct Router {
    simple: Vec<Regex>,
    complex: Vec<Regex>,
    classifier: Option<ModelClassifier>,
    stats: Mutex<RouterStats>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("simple_rules", &self.simple.len())
            .field("complex_rules", &self.complex.len())
            .field(
                "classifier_model",
                &self.classifier.as_ref().map(|c| c.model.as_str()),
            )
            .finish()
    }
}

fn compile(patterns: &[&str]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}

impl Router {
    /// Rule and fallback tiers only.
    pub fn new() -> Result<Self, regex::Error> {
        Self::with_patterns(&SIMPLE_PATTERNS, &COMPLEX_PATTERNS)
    }

    pub fn with_patterns(simple: &[&str], complex: &[&str]) -> Result<Self, regex::Error> {
        Ok(Self {
            simple: compile(simple)?,
            complex: compile(complex)?,
            classifier: None,
            stats: Mutex::new(RouterStats::default()),
        })
    }

    /// Enables the model tier.
    pub fn with_classifier(mut self, client: Arc<ModelClient>, model: impl Into<String>) -> Self {
        self.classifier = Some(ModelClassifier {
            client,
            model: model.into(),
        });
        self
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn classify(&self, query: &str) -> RouteDecision {
        let query = query.trim();
        if query.is_empty() {
            return RouteDecision::new(RouteClass::Simple, Provenance::Empty);
        }

        if self.simple.iter().any(|re| re.is_match(query)) {
            self.stats.lock().rule_hit_simple += 1;
            return RouteDecision::new(RouteClass::Simple, Provenance::Rule);
        }
        if self.complex.iter().any(|re| re.is_match(query)) {
            self.stats.lock().rule_hit_complex += 1;
            return RouteDecision::new(RouteClass::Complex, Provenance::Rule);
        }

        if let Some(class) = self.ask_model(query).await {
            let mut stats = self.stats.lock();
            match class {
                RouteClass::Simple => stats.model_simple += 1,
                _ => stats.model_complex += 1,
            }
            return RouteDecision::new(class, Provenance::Model);
        }

        let complex = query.chars().count() > FALLBACK_COMPLEX_CHARS
            || query.contains('?')
            || query.contains('？');
        let mut stats = self.stats.lock();
        if complex {
            stats.fallback_complex += 1;
            RouteDecision::new(RouteClass::Complex, Provenance::Fallback)
        } else {
            stats.fallback_simple += 1;
            RouteDecision::new(RouteClass::Simple, Provenance::Fallback)
        }
    }

    /// `None` when no classifier is configured or the model could not answer.
    async fn ask_model(&self, query: &str) -> Option<RouteClass> {
        let classifier = self.classifier.as_ref()?;
        let request = ChatRequest::new(
            classifier.model.clone(),
            vec![ChatMessage::user(format!("{INTENT_PROMPT}{query}"))],
        )
        .with_temperature(0.0)
        .with_max_tokens(10);

        match classifier.client.invoke(request).await {
            Completion::Generated { text, .. } => {
                let class = if text.contains(SIMPLE_MARKER) {
                    RouteClass::Simple
                } else {
                    RouteClass::Complex
                };
                debug!(class = %class, "Model tier classified query");
                Some(class)
            }
            Completion::Offline { .. } => {
                warn!("Router model unavailable; using fallback heuristic");
                None
            }
        }
    }

    pub fn stats(&self) -> RouterStats {
        self.stats.lock().clone()
    }
}

#[async_trait]
impl HealthCheckable for Router {
    fn component(&self) -> &'static str {
        "router"
    }

    async fn check_health(&self) -> HealthReport {
        HealthReport::ready(json!({
            "simple_rules": self.simple.len(),
            "complex_rules": self.complex.len(),
            "classifier": self.classifier.as_ref().map(|c| c.model.clone()),
            "stats": self.stats(),
        }))
    }
}
