//! Backend response payloads.
//!
//! Field names follow the backend's Italian JSON keys.

use serde::Deserialize;
use serde_json::Value;

/// Envelope every endpoint answers with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiEnvelope {
  #[serde(default)]
  pub success: bool,
  #[serde(default)]
  pub data: Option<Value>,
  #[serde(default)]
  pub error: Option<String>,
  /// Set by the offline proxy's synthetic responses
  #[serde(default)]
  pub offline: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedbackEntry {
  #[serde(default)]
  pub nome: Option<String>,
  pub rating: u8,
  pub message: String,
  pub timestamp: String,
}

impl FeedbackEntry {
  pub fn author(&self) -> &str {
    match self.nome.as_deref() {
      Some(n) if !n.trim().is_empty() => n,
      _ => "Anonimo",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MenuItem {
  pub nome: String,
  #[serde(default)]
  pub descrizione: Option<String>,
  #[serde(default)]
  pub allergeni: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Event {
  pub titolo: String,
  pub data: String,
  #[serde(default)]
  pub ora: Option<String>,
  #[serde(default)]
  pub luogo: Option<String>,
  #[serde(default)]
  pub descrizione: Option<String>,
}
