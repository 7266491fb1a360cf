//! Versioned cache namespaces and cached entries.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::net::HttpResponse;

/// What a namespace holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
  /// HTML, CSS, JS and cacheable cross-origin assets
  Static,
  /// Raster and vector images
  Images,
}

impl NamespaceKind {
  pub fn purpose(&self) -> &'static str {
    match self {
      NamespaceKind::Static => "static",
      NamespaceKind::Images => "images",
    }
  }
}

/// A cache namespace identified by prefix, purpose and version tag.
///
/// Rendered as `<prefix><purpose>-<version>`, e.g. `festa-sport-static-v2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
  pub prefix: String,
  pub kind: NamespaceKind,
  pub version: String,
}

impl Namespace {
  pub fn new(prefix: &str, kind: NamespaceKind, version: &str) -> Self {
    Self {
      prefix: prefix.to_string(),
      kind,
      version: version.to_string(),
    }
  }

  pub fn name(&self) -> String {
    format!("{}{}-{}", self.prefix, self.kind.purpose(), self.version)
  }
}

impl fmt::Display for Namespace {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.name())
  }
}

/// A stored response and when it was written.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: HttpResponse,
  pub cached_at: DateTime<Utc>,
}
