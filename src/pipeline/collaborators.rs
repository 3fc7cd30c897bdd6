//! Outbound seams the pipeline calls but does not implement for real.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::case::Incident;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AlertError {
    #[error("alert delivery failed: {reason}")]
    Delivery { reason: String },
}

/// Delivers incidents to an on-call channel.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    /// Returns a confirmation id for the delivered alert.
    async fn dispatch(&self, incident: &Incident) -> Result<String, AlertError>;
}

/// Writes incidents to the log and confirms each with a fresh UUID.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertDispatcher;

#[async_trait]
impl AlertDispatcher for LogAlertDispatcher {
    async fn dispatch(&self, incident: &Incident) -> Result<String, AlertError> {
        let id = Uuid::new_v4().to_string();
        warn!(
            alert_id = %id,
            case_id = %incident.case_id,
            api_status = %incident.api_status,
            reason = %incident.reason,
            latest_error = incident.latest_error.as_deref().unwrap_or(""),
            "Incident raised"
        );
        Ok(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub needs_alert: bool,
    pub reason: String,
    /// Last log line that looks like an error.
    pub latest_error: Option<String>,
}

/// Decides from a case's status fields whether an incident should be raised.
pub trait StatusInspector: Send + Sync {
    fn inspect(&self, api_status: &str, logs: &str) -> StatusReport;
}

/// Alerts when the API status mentions "error", in any case.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleStatusInspector;

const ERROR_MARKERS: [&str; 3] = ["error", "exception", "错误"];

impl StatusInspector for RuleStatusInspector {
    fn inspect(&self, api_status: &str, logs: &str) -> StatusReport {
        let latest_error = logs
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| {
                let lower = line.to_lowercase();
                ERROR_MARKERS.iter().any(|m| lower.contains(m))
            })
            .map(str::to_string);

        if api_status.to_lowercase().contains("error") {
            StatusReport {
                needs_alert: true,
                reason: format!("API status reports an error: {api_status}"),
                latest_error,
            }
        } else {
            StatusReport {
                needs_alert: false,
                reason: "API status nominal".to_string(),
                latest_error,
            }
        }
    }
}
