//! Owned HTTP request and response values.

use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

/// How a request should treat intermediate HTTP caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
  /// Normal HTTP caching semantics
  #[default]
  Default,
  /// Always go to the origin server, ignoring any HTTP cache
  Reload,
}

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
  pub cache_mode: CacheMode,
}

impl HttpRequest {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      headers: Vec::new(),
      body: None,
      cache_mode: CacheMode::Default,
    }
  }

  /// Build a POST request carrying a JSON body.
  pub fn post_json<T: Serialize + ?Sized>(url: Url, body: &T) -> serde_json::Result<Self> {
    Ok(Self {
      method: Method::POST,
      url,
      headers: vec![("Content-Type".to_string(), "application/json".to_string())],
      body: Some(serde_json::to_vec(body)?),
      cache_mode: CacheMode::Default,
    })
  }

  pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
    self.cache_mode = cache_mode;
    self
  }

  /// Key under which a response to this request is cached.
  pub fn cache_key(&self) -> &str {
    self.url.as_str()
  }
}

/// A fully buffered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    let status_text = StatusCode::from_u16(status)
      .ok()
      .and_then(|s| s.canonical_reason())
      .unwrap_or_default()
      .to_string();

    Self {
      status,
      status_text,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  /// Build a response with a JSON body and matching content type.
  pub fn json<T: Serialize + ?Sized>(status: u16, value: &T) -> serde_json::Result<Self> {
    Ok(Self::new(status, serde_json::to_vec(value)?).with_header("Content-Type", "application/json"))
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// Status in the 200-299 range.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn is_server_error(&self) -> bool {
    (500..600).contains(&self.status)
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn json_body<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
    serde_json::from_slice(&self.body)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_ranges() {
    assert!(HttpResponse::new(204, "").is_ok());
    assert!(!HttpResponse::new(304, "").is_ok());
    assert!(!HttpResponse::new(404, "").is_server_error());
    assert!(HttpResponse::new(503, "").is_server_error());
    assert_eq!(HttpResponse::new(503, "").status_text, "Service Unavailable");
  }

  #[test]
  fn test_header_lookup_ignores_case() {
    let response = HttpResponse::json(200, &serde_json::json!({"ok": true})).unwrap();
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert_eq!(response.header("etag"), None);
  }

  #[test]
  fn test_post_json_sets_body_and_content_type() {
    let url = Url::parse("http://localhost:3001/api/reminder").unwrap();
    let request = HttpRequest::post_json(url, &serde_json::json!({"contact": "a@b.it"})).unwrap();

    assert_eq!(request.method, Method::POST);
    assert_eq!(request.body.as_deref(), Some(br#"{"contact":"a@b.it"}"#.as_slice()));
    assert_eq!(request.cache_key(), "http://localhost:3001/api/reminder");
  }
}
