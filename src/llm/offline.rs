//! Canned replies used when no model can be reached.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::types::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfflineTopic {
    SystemStatus,
    Billing,
    Error,
    Default,
}

impl OfflineTopic {
    pub const ALL: [OfflineTopic; 4] = [
        OfflineTopic::SystemStatus,
        OfflineTopic::Billing,
        OfflineTopic::Error,
        OfflineTopic::Default,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OfflineTopic::SystemStatus => "system_status",
            OfflineTopic::Billing => "billing",
            OfflineTopic::Error => "error",
            OfflineTopic::Default => "default",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    fn builtin_reply(self) -> &'static str {
        match self {
            OfflineTopic::SystemStatus => "抱歉，当前无法获取实时系统状态，请联系技术支持。",
            OfflineTopic::Billing => "计费相关问题请参考知识库文档或联系客服。",
            OfflineTopic::Error => "系统遇到临时问题，正在自动修复中，请稍后重试。",
            OfflineTopic::Default => {
                "系统暂时无法连接到AI服务，请稍后重试。我将基于知识库为您提供帮助。"
            }
        }
    }
}

const SYSTEM_KEYWORDS: [&str; 4] = ["系统", "稳定", "状态", "监控"];
const BILLING_KEYWORDS: [&str; 4] = ["计费", "收费", "价格", "费用"];
const ERROR_KEYWORDS: [&str; 3] = ["错误", "异常", "问题"];

/// Topic of the latest message. Checked in order: system status, billing, error.
pub fn classify_topic(messages: &[ChatMessage]) -> OfflineTopic {
    let Some(latest) = messages.last() else {
        return OfflineTopic::Default;
    };
    let text = latest.content.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| text.contains(w));

    if mentions(&SYSTEM_KEYWORDS) {
        OfflineTopic::SystemStatus
    } else if mentions(&BILLING_KEYWORDS) {
        OfflineTopic::Billing
    } else if mentions(&ERROR_KEYWORDS) {
        OfflineTopic::Error
    } else {
        OfflineTopic::Default
    }
}

#[derive(Debug, Clone)]
pub struct OfflineReplies {
    replies: HashMap<OfflineTopic, String>,
}

impl Default for OfflineReplies {
    fn default() -> Self {
        Self {
            replies: OfflineTopic::ALL
                .into_iter()
                .map(|t| (t, t.builtin_reply().to_string()))
                .collect(),
        }
    }
}

impl OfflineReplies {
    /// Built-ins overridden by a `{topic: reply}` JSON object at `path`.
    ///
    /// A missing or unreadable file leaves the built-ins in place.
    pub fn load(path: &Path) -> Self {
        let mut replies = Self::default();
        if !path.exists() {
            return replies;
        }

        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                serde_json::from_str::<HashMap<String, String>>(&raw).map_err(|e| e.to_string())
            });

        match parsed {
            Ok(overrides) => {
                let mut applied = 0usize;
                for (name, text) in overrides {
                    match OfflineTopic::parse(&name) {
                        Some(topic) if !text.trim().is_empty() => {
                            replies.replies.insert(topic, text);
                            applied += 1;
                        }
                        _ => warn!(topic = %name, "Ignoring unknown or empty offline reply"),
                    }
                }
                info!(path = %path.display(), applied, "Loaded offline replies");
            }
            Err(reason) => {
                warn!(path = %path.display(), %reason, "Failed to load offline replies; using built-ins")
            }
        }
        replies
    }

    pub fn reply(&self, topic: OfflineTopic) -> &str {
        self.replies
            .get(&topic)
            .map(String::as_str)
            .unwrap_or_else(|| topic.builtin_reply())
    }

    pub fn for_messages(&self, messages: &[ChatMessage]) -> (OfflineTopic, String) {
        let topic = classify_topic(messages);
        (topic, self.reply(topic).to_string())
    }
}
