//! Scripted transport for tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::time::Instant;

use super::transport::{NetworkError, Transport};
use super::types::{HttpRequest, HttpResponse};

#[derive(Debug, Clone)]
pub enum MockReply {
  Respond(HttpResponse),
  /// Held back until the gate is notified
  Gated(Arc<Notify>, HttpResponse),
  Fail,
}

impl MockReply {
  pub fn ok(body: &str) -> Self {
    MockReply::Respond(HttpResponse::new(200, body))
  }

  pub fn status(status: u16) -> Self {
    MockReply::Respond(HttpResponse::new(status, ""))
  }

  pub fn gated(gate: &Arc<Notify>, body: &str) -> Self {
    MockReply::Gated(Arc::clone(gate), HttpResponse::new(200, body))
  }

  pub fn json(status: u16, value: serde_json::Value) -> Self {
    MockReply::Respond(HttpResponse::json(status, &value).unwrap())
  }
}

#[derive(Debug, Clone)]
pub struct Call {
  pub request: HttpRequest,
  pub at: Instant,
}

#[derive(Default)]
struct MockState {
  queue: VecDeque<MockReply>,
  routes: HashMap<String, MockReply>,
  offline: bool,
  calls: Vec<Call>,
}

/// Replies from a FIFO queue first, then from per-URL routes, otherwise fails.
#[derive(Default)]
pub struct MockTransport {
  state: Mutex<MockState>,
}

impl MockTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&self, reply: MockReply) {
    self.state.lock().unwrap().queue.push_back(reply);
  }

  pub fn route(&self, url: &str, reply: MockReply) {
    self.state.lock().unwrap().routes.insert(url.to_string(), reply);
  }

  pub fn set_offline(&self, offline: bool) {
    self.state.lock().unwrap().offline = offline;
  }

  pub fn calls(&self) -> Vec<Call> {
    self.state.lock().unwrap().calls.clone()
  }

  pub fn call_count(&self) -> usize {
    self.state.lock().unwrap().calls.len()
  }
}

#[async_trait]
impl Transport for MockTransport {
  async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
    let reply = {
      let mut state = self.state.lock().unwrap();
      state.calls.push(Call {
        request: request.clone(),
        at: Instant::now(),
      });

      if state.offline {
        MockReply::Fail
      } else if let Some(reply) = state.queue.pop_front() {
        reply
      } else {
        state
          .routes
          .get(request.url.as_str())
          .cloned()
          .unwrap_or(MockReply::Fail)
      }
    };

    match reply {
      MockReply::Respond(response) => Ok(response),
      MockReply::Gated(gate, response) => {
        gate.notified().await;
        Ok(response)
      }
      MockReply::Fail => Err(NetworkError::Connect {
        url: request.url.to_string(),
        message: "connection refused".to_string(),
      }),
    }
  }
}
