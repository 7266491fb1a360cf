// Error types for backend calls.
// Keeps validation, transport, rejection and offline failures apart so the
// front end can pick the right message.

use thiserror::Error;

use crate::net::NetworkError;
use crate::proxy::OFFLINE_MESSAGE;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum FestaError {
  #[error("{0}")]
  Invalid(#[from] ValidationError),

  #[error(transparent)]
  Network(#[from] NetworkError),

  #[error("backend rejected the request ({status}): {message}")]
  Rejected { status: u16, message: String },

  #[error("backend unreachable, offline response served")]
  Offline,

  #[error("unexpected response from {endpoint}: {source}")]
  Decode {
    endpoint: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid endpoint URL: {0}")]
  Url(#[from] url::ParseError),

  #[error("failed to encode request body: {0}")]
  Encode(#[source] serde_json::Error),
}

impl FestaError {
  /// Text shown to the user; never a raw protocol error.
  pub fn user_message(&self) -> String {
    match self {
      FestaError::Invalid(e) => e.message.clone(),
      FestaError::Network(_) => {
        "Impossibile connettersi al server. Verifica che il backend sia attivo.".to_string()
      }
      FestaError::Rejected { message, .. } => message.clone(),
      FestaError::Offline => OFFLINE_MESSAGE.to_string(),
      FestaError::Decode { .. } => "Risposta del server non valida. Riprova più tardi.".to_string(),
      FestaError::Url(_) | FestaError::Encode(_) => "Errore di configurazione del client.".to_string(),
    }
  }
}

pub type Result<T> = std::result::Result<T, FestaError>;
