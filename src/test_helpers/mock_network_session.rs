//! Scriptable [`NetworkSession`] for tests.
//!
//! Responses are served from a FIFO script; once the script runs dry the fallback
//! behaviour answers every request (by default a `200` echoing the request body).

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{QueueError, Result};
use crate::network::{HttpRequest, HttpResponse, NetworkSession};

/// What the mock does with one request
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Respond(HttpResponse),
    TransportError(String),
    /// `200` with the request body (or `{}`) as response body
    Echo,
}

#[derive(Debug, Default)]
struct MockSessionState {
    script: VecDeque<MockBehavior>,
    requests: Vec<HttpRequest>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Mock network session that records every request it receives
#[derive(Debug, Clone)]
pub struct MockNetworkSession {
    state: Arc<Mutex<MockSessionState>>,
    fallback: MockBehavior,
    /// Holds each request open before answering
    latency: Option<Duration>,
}

impl Default for MockNetworkSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNetworkSession {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockSessionState::default())),
            fallback: MockBehavior::Echo,
            latency: None,
        }
    }

    /// Session that fails every request at the transport level
    pub fn offline() -> Self {
        Self::new().with_fallback(MockBehavior::TransportError(
            "The Internet connection appears to be offline.".to_string(),
        ))
    }

    pub fn with_fallback(mut self, fallback: MockBehavior) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn push(&self, behavior: MockBehavior) {
        self.state.lock().script.push_back(behavior);
    }

    pub fn push_response(&self, response: HttpResponse) {
        self.push(MockBehavior::Respond(response));
    }

    pub fn push_transport_error(&self, message: impl Into<String>) {
        self.push(MockBehavior::TransportError(message.into()));
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// Highest number of requests that were open at the same time
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }
}

#[async_trait]
impl NetworkSession for MockNetworkSession {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let behavior = {
            let mut state = self.state.lock();
            state.requests.push(request.clone());
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state
                .script
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.state.lock().in_flight -= 1;

        match behavior {
            MockBehavior::Respond(response) => Ok(response),
            MockBehavior::TransportError(message) => Err(QueueError::transport(message)),
            MockBehavior::Echo => Ok(HttpResponse::new(
                200,
                request.body.clone().unwrap_or_else(|| b"{}".to_vec()),
            )),
        }
    }
}
