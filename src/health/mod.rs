//! Readiness capability implemented by retrieval, cache, routing and model components.

use async_trait::async_trait;
use serde::Serialize;

/// Structured readiness answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub ready: bool,
    pub detail: serde_json::Value,
}

impl HealthReport {
    pub fn ready(detail: serde_json::Value) -> Self {
        Self {
            ready: true,
            detail,
        }
    }

    pub fn not_ready(detail: serde_json::Value) -> Self {
        Self {
            ready: false,
            detail,
        }
    }
}

/// A component that can report whether it is able to serve traffic.
#[async_trait]
pub trait HealthCheckable: Send + Sync {
    /// Short component name used as the key in aggregated reports.
    fn component(&self) -> &'static str;

    async fn check_health(&self) -> HealthReport;
}
