//! Scripted transport for tests and offline demos.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::time::Instant;

use super::error::TransportError;
use super::transport::ChatTransport;
use super::types::WireRequest;

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// A well-formed completion whose content is this text.
    Content(String),
    /// A raw JSON body, for malformed-response cases.
    Body(Value),
    Error(TransportError),
    /// Waits, then yields the inner reply.
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn content(text: impl Into<String>) -> Self {
        MockReply::Content(text.into())
    }

    pub fn status(status: u16) -> Self {
        MockReply::Error(TransportError::Status {
            status,
            body: format!("mock status {status}"),
        })
    }

    pub fn rate_limited() -> Self {
        MockReply::Error(TransportError::RateLimited { retry_after: None })
    }

    pub fn connection_error() -> Self {
        MockReply::Error(TransportError::Connection {
            reason: "mock connection refused".to_string(),
        })
    }

    pub fn delayed(delay: Duration, reply: MockReply) -> Self {
        MockReply::Delayed(delay, Box::new(reply))
    }
}

pub fn completion_body(content: &str) -> Value {
    json!({
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 0, "completion_tokens": 0}
    })
}

type Responder = Box<dyn Fn(&WireRequest) -> MockReply + Send + Sync>;

/// Replies come from, in order: the per-model script, the responder, the default reply.
pub struct MockTransport {
    scripts: Mutex<HashMap<String, VecDeque<MockReply>>>,
    responder: Option<Responder>,
    default_reply: Mutex<MockReply>,
    requests: Mutex<Vec<(Instant, WireRequest)>>,
    configured: bool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("requests", &self.requests.lock().len())
            .field("responder", &self.responder.is_some())
            .finish()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            responder: None,
            default_reply: Mutex::new(MockReply::content("mock reply")),
            requests: Mutex::new(Vec::new()),
            configured: true,
        }
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&WireRequest) -> MockReply + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    /// Reports itself as unconfigured, like an HTTP transport without an API key.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn push(&self, model: &str, reply: MockReply) {
        self.scripts
            .lock()
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn push_many(&self, model: &str, replies: impl IntoIterator<Item = MockReply>) {
        for reply in replies {
            self.push(model, reply);
        }
    }

    pub fn set_default(&self, reply: MockReply) {
        *self.default_reply.lock() = reply;
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn calls_for(&self, model: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|(_, r)| r.model == model)
            .count()
    }

    /// Models in the order they were sent.
    pub fn models_called(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|(_, r)| r.model.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        self.requests
            .lock()
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Send instants for `model`, on the tokio clock.
    pub fn send_times(&self, model: &str) -> Vec<Instant> {
        self.requests
            .lock()
            .iter()
            .filter(|(_, r)| r.model == model)
            .map(|(at, _)| *at)
            .collect()
    }

    fn next_reply(&self, request: &WireRequest) -> MockReply {
        if let Some(reply) = self
            .scripts
            .lock()
            .get_mut(&request.model)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }
        if let Some(responder) = &self.responder {
            return responder(request);
        }
        self.default_reply.lock().clone()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn send(&self, request: &WireRequest) -> Result<Value, TransportError> {
        self.requests.lock().push((Instant::now(), request.clone()));
        let mut reply = self.next_reply(request);
        loop {
            match reply {
                MockReply::Content(text) => return Ok(completion_body(&text)),
                MockReply::Body(body) => return Ok(body),
                MockReply::Error(e) => return Err(e),
                MockReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}
