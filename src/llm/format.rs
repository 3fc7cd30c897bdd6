//! Normalization of generated text before it reaches callers.

use tracing::{debug, warn};

use super::types::ResponseFormat;
use crate::constants::{EMPTY_REPLY_TEXT, MAX_REPLY_CHARS, TRUNCATED_REPLY_CHARS};

pub fn format_reply(text: &str, format: ResponseFormat) -> String {
    match format {
        ResponseFormat::Text => format_text(text),
        ResponseFormat::Json => format_json(text),
    }
}

/// Collapses whitespace runs and caps the length.
pub fn format_text(text: &str) -> String {
    if text.trim().is_empty() {
        return EMPTY_REPLY_TEXT.to_string();
    }

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX_REPLY_CHARS {
        debug!(chars = collapsed.chars().count(), "Reply truncated");
        let head: String = collapsed.chars().take(TRUNCATED_REPLY_CHARS).collect();
        return format!("{head}...");
    }
    collapsed
}

/// Returns valid JSON unchanged, unwraps one layer of ```` ```json ```` fencing,
/// and otherwise gives the text back as is.
pub fn format_json(text: &str) -> String {
    if serde_json::from_str::<serde_json::Value>(text).is_ok() {
        return text.to_string();
    }

    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    let cleaned = cleaned.trim();

    if serde_json::from_str::<serde_json::Value>(cleaned).is_ok() {
        debug!("Unwrapped fenced JSON reply");
        cleaned.to_string()
    } else {
        warn!("Reply is not valid JSON; returning it unchanged");
        text.to_string()
    }
}
