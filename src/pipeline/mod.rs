//! Support-case orchestration.
//!
//! [`SupportPipeline::process_case`] raises an incident when the case reports
//! an upstream error, routes the query, holds an admission ticket for the
//! case's class, then either answers directly (SIMPLE) or retrieves knowledge
//! and answers from it (COMPLEX). When retrieval finds nothing the model is not
//! called and the reply says so.

mod benchmark;
mod case;
mod collaborators;
mod error;
mod orchestrator;
mod prompts;
mod retriever;


pub use benchmark::{BenchmarkReport, LatencySummary};
pub use case::{BatchSummary, CaseOutcome, Incident, ReplyKind, SupportCase};
pub use collaborators::{
    AlertDispatcher, AlertError, LogAlertDispatcher, RuleStatusInspector, StatusInspector,
    StatusReport,
};
pub use error::PipelineError;
pub use orchestrator::{
    FAILED_REPLY, PipelineBuilder, PipelineHealth, SupportPipeline, SystemStatus, WARMUP_QUERY,
    WarmupReport,
};
pub use prompts::{
    MAX_CONTEXT_CHUNKS, SIMPLE_SYSTEM_PROMPT, SUPPORT_SYSTEM_PROMPT, format_context, rag_messages,
    rag_prompt, simple_chat_messages,
};
pub use retriever::AsyncRetriever;
