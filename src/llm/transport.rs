use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::TransportError;
use super::types::WireRequest;

/// Sends one chat-completion request and returns the decoded JSON body.
///
/// Implementations map HTTP failures onto [`TransportError`]; they never retry.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the transport has what it needs to reach an endpoint.
    fn is_configured(&self) -> bool {
        true
    }

    async fn send(&self, request: &WireRequest) -> Result<Value, TransportError>;
}

/// Pulls `choices[0].message.content`, rejecting missing or empty content.
pub fn extract_content(body: &Value) -> Result<String, TransportError> {
    let invalid = |reason: &str| TransportError::InvalidResponse {
        reason: reason.to_string(),
    };

    let choices = body
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("response has no choices"))?;
    let first = choices.first().ok_or_else(|| invalid("choices is empty"))?;
    let message = first
        .get("message")
        .ok_or_else(|| invalid("choice has no message"))?;
    let content = message
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("message has no content"))?;

    if content.is_empty() {
        return Err(invalid("message content is empty"));
    }
    Ok(content.to_string())
}

/// `reqwest` transport for OpenAI-compatible `/chat/completions` endpoints.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .finish()
    }
}

impl HttpTransport {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl ChatTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn send(&self, request: &WireRequest) -> Result<Value, TransportError> {
        debug!(model = %request.model, messages = request.messages.len(), "Sending chat completion");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        reason: e.to_string(),
                    }
                } else {
                    TransportError::Connection {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Model endpoint returned an error");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::InvalidResponse {
                reason: format!("body is not JSON: {e}"),
            })
    }
}
