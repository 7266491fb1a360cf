//! Transport trait and the reqwest implementation.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::types::{CacheMode, HttpRequest, HttpResponse};

/// Failures that produced no HTTP response at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
  #[error("connection to {url} failed: {message}")]
  Connect { url: String, message: String },

  #[error("request to {url} timed out")]
  Timeout { url: String },

  #[error("request to {url} failed: {message}")]
  Request { url: String, message: String },

  #[error("no response available for {url}")]
  NoResponse { url: String },

  #[error("cache lookup for {url} failed: {message}")]
  Cache { url: String, message: String },
}

/// Anything that turns a request into a response.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, NetworkError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
  async fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, NetworkError> {
    (**self).send(request).await
  }
}

/// Real network access through reqwest.
#[derive(Clone)]
pub struct HttpTransport {
  client: Client,
}

impl HttpTransport {
  pub fn new(timeout: Option<Duration>) -> Result<Self> {
    let mut builder = Client::builder().user_agent(concat!("festa/", env!("CARGO_PKG_VERSION")));
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }

    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, NetworkError> {
    let url = request.url.to_string();

    let mut builder = self.client.request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if request.cache_mode == CacheMode::Reload {
      builder = builder.header(CACHE_CONTROL, "no-cache").header(PRAGMA, "no-cache");
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await.map_err(|e| classify(&url, e))?;

    let status = response.status();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
      .collect();
    let body = response.bytes().await.map_err(|e| classify(&url, e))?;

    Ok(HttpResponse {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body: body.to_vec(),
    })
  }
}

fn classify(url: &str, error: reqwest::Error) -> NetworkError {
  let url = url.to_string();
  if error.is_timeout() {
    NetworkError::Timeout { url }
  } else if error.is_connect() {
    NetworkError::Connect {
      url,
      message: error.to_string(),
    }
  } else {
    NetworkError::Request {
      url,
      message: error.to_string(),
    }
  }
}
