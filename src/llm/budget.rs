//! Prompt token budget.

use super::types::ChatMessage;
use crate::constants::{CHARS_PER_TOKEN, TRUNCATION_MARKER};

/// Character-count estimate: one token per four characters.
#[inline]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}

/// Keeps the newest messages that fit in `max_tokens`.
///
/// Walks newest to oldest. The first message that would overflow is cut so that,
/// with [`TRUNCATION_MARKER`] appended, it fills the remaining allowance; everything
/// older than that is dropped. Order is preserved and the estimated total never
/// exceeds `max_tokens`.
pub fn fit_to_budget(messages: &[ChatMessage], max_tokens: usize) -> Vec<ChatMessage> {
    let marker_tokens = estimate_tokens(TRUNCATION_MARKER);
    let mut used = 0usize;
    let mut kept = Vec::with_capacity(messages.len());

    for message in messages.iter().rev() {
        let mut tokens = estimate_tokens(&message.content);
        let mut message = message.clone();

        if used + tokens > max_tokens {
            let remaining = max_tokens.saturating_sub(used);
            if remaining <= marker_tokens {
                break;
            }
            let head: String = message
                .content
                .chars()
                .take((remaining - marker_tokens) * CHARS_PER_TOKEN)
                .collect();
            message.content = format!("{head}{TRUNCATION_MARKER}");
            tokens = estimate_tokens(&message.content);
            kept.push(message);
            used += tokens;
            break;
        }

        kept.push(message);
        used += tokens;
    }

    kept.reverse();
    kept
}
