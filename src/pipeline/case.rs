use serde::{Deserialize, Serialize};

use crate::llm::Completion;
use crate::routing::RouteClass;

/// One inbound support request, as found in a batch file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportCase {
    #[serde(default)]
    pub case_id: Option<String>,
    #[serde(default)]
    pub user_query: String,
    /// Free-form upstream API status, e.g. `"OK"` or `"ERROR: 502 from billing"`.
    #[serde(default)]
    pub api_status: Option<String>,
    #[serde(default)]
    pub monitor_log: Option<String>,
}

impl SupportCase {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            user_query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = Some(case_id.into());
        self
    }

    pub fn with_api_status(mut self, status: impl Into<String>) -> Self {
        self.api_status = Some(status.into());
        self
    }

    pub fn with_monitor_log(mut self, log: impl Into<String>) -> Self {
        self.monitor_log = Some(log.into());
        self
    }
}

/// Where the reply text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Generated,
    Cached,
    /// The model client was unavailable and answered from its offline table.
    Offline,
    /// Retrieval found nothing relevant; the model was not called.
    NoKnowledge,
    /// The case could not be handled at all.
    Failed,
}

impl ReplyKind {
    /// Same spelling as the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            ReplyKind::Generated => "generated",
            ReplyKind::Cached => "cached",
            ReplyKind::Offline => "offline",
            ReplyKind::NoKnowledge => "no_knowledge",
            ReplyKind::Failed => "failed",
        }
    }

    pub fn from_completion(completion: &Completion) -> Self {
        match completion {
            Completion::Generated { cached: true, .. } => ReplyKind::Cached,
            Completion::Generated { .. } => ReplyKind::Generated,
            Completion::Offline { .. } => ReplyKind::Offline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub case_id: String,
    /// `None` when the case failed before routing finished.
    pub mode: Option<RouteClass>,
    pub reply: String,
    pub reply_kind: ReplyKind,
    /// Confirmation ids of dispatched incidents.
    #[serde(default)]
    pub alerts: Vec<String>,
    pub duration_ms: f64,
    pub error: Option<String>,
}

impl CaseOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Raised when a case reports an upstream failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incident {
    pub case_id: String,
    pub api_status: String,
    pub reason: String,
    pub latest_error: Option<String>,
    /// RFC 3339.
    pub raised_at: String,
}

/// Totals returned by a batch file run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[CaseOutcome]) -> Self {
        Self {
            total: outcomes.len(),
            success: outcomes.iter().filter(|o| o.is_success()).count(),
        }
    }
}
