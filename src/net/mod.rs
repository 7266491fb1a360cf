//! Network boundary shared by the API client and the offline proxy.
//!
//! This module provides:
//! - Owned request/response values that can be cached and replayed
//! - The `Transport` trait every network hop implements
//! - A reqwest-backed transport for real HTTP
//! - Retry with linear backoff for transient failures

mod retry;
mod transport;
mod types;

#[cfg(test)]
pub mod mock;

pub use retry::{ResilientClient, RetryPolicy};
pub use transport::{HttpTransport, NetworkError, Transport};
pub use types::{CacheMode, HttpRequest, HttpResponse};
