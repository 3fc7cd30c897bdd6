use crate::knowledge::ScoredChunk;
use crate::llm::ChatMessage;

pub const SIMPLE_SYSTEM_PROMPT: &str = "你是一个热情专业的客服。请简短礼貌地回复。";

pub const SUPPORT_SYSTEM_PROMPT: &str = "你是一个智能客服监控Agent，具有以下能力：
1. 理解用户关于系统的问题
2. 监控系统API状态
3. 在系统异常时触发告警
4. 基于知识库准确回答业务问题

请严格按照要求执行任务。";

/// Reference passages included in a grounded prompt.
pub const MAX_CONTEXT_CHUNKS: usize = 3;

/// `[参考1] text` lines for the first [`MAX_CONTEXT_CHUNKS`] chunks.
pub fn format_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .take(MAX_CONTEXT_CHUNKS)
        .enumerate()
        .map(|(i, chunk)| format!("[参考{}] {}", i + 1, chunk.text()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn rag_prompt(chunks: &[ScoredChunk], query: &str, api_status: &str) -> String {
    format!(
        "请仅根据以下参考资料回答用户问题。资料中没有的信息请明确说明无法确认，不要编造。\n\n\
         参考资料：\n{context}\n\n系统状态：API: {api_status}\n\n用户问题：{query}",
        context = format_context(chunks),
    )
}

pub fn simple_chat_messages(query: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SIMPLE_SYSTEM_PROMPT),
        ChatMessage::user(query),
    ]
}

pub fn rag_messages(chunks: &[ScoredChunk], query: &str, api_status: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SUPPORT_SYSTEM_PROMPT),
        ChatMessage::user(rag_prompt(chunks, query, api_status)),
    ]
}
