//! Retry with linear backoff.
//!
//! Network failures and 5xx responses are retried; 4xx responses are returned
//! straight away. The delay before retry `n` (1-based) is `base_delay * n`.

use std::time::Duration;
use tracing::{debug, warn};

use super::transport::{NetworkError, Transport};
use super::types::{HttpRequest, HttpResponse};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Maximum number of attempts (including the first one).
  pub max_attempts: u32,
  /// Delay unit; attempt index `i` waits `base_delay * (i + 1)` before the next try.
  pub base_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay: Duration::from_millis(1000),
    }
  }
}

impl RetryPolicy {
  pub fn new() -> Self {
    Self::default()
  }

  /// Set the maximum number of attempts. Zero is treated as one.
  pub fn with_max_attempts(mut self, attempts: u32) -> Self {
    self.max_attempts = attempts.max(1);
    self
  }

  pub fn with_base_delay(mut self, delay: Duration) -> Self {
    self.base_delay = delay;
    self
  }

  /// Delay after the failed attempt with the given 0-based index.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    self.base_delay * (attempt + 1)
  }
}

/// Client that retries transient failures of the wrapped transport.
pub struct ResilientClient<T> {
  transport: T,
  policy: RetryPolicy,
}

impl<T: Transport> ResilientClient<T> {
  pub fn new(transport: T, policy: RetryPolicy) -> Self {
    Self { transport, policy }
  }

  pub fn policy(&self) -> &RetryPolicy {
    &self.policy
  }

  /// Send a request, retrying network errors and 5xx responses.
  ///
  /// The last attempt's response is returned whatever its status; only a
  /// network error on the last attempt is propagated.
  pub async fn fetch_with_retry(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
    let attempts = self.policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
      let is_last = attempt + 1 >= attempts;

      match self.transport.send(request).await {
        Ok(response) if response.is_server_error() && !is_last => {
          let delay = self.policy.delay_for(attempt);
          warn!(
            "Attempt {}/{} for {} returned {}. Retrying in {:?}",
            attempt + 1,
            attempts,
            request.url,
            response.status,
            delay
          );
          tokio::time::sleep(delay).await;
        }
        Ok(response) => {
          if attempt > 0 {
            debug!("{} answered {} after {} attempts", request.url, response.status, attempt + 1);
          }
          return Ok(response);
        }
        Err(e) if is_last => {
          warn!("All {} attempts for {} failed. Last error: {}", attempts, request.url, e);
          return Err(e);
        }
        Err(e) => {
          let delay = self.policy.delay_for(attempt);
          warn!(
            "Attempt {}/{} failed: {}. Retrying in {:?}",
            attempt + 1,
            attempts,
            e,
            delay
          );
          tokio::time::sleep(delay).await;
        }
      }

      attempt += 1;
    }
  }
}
