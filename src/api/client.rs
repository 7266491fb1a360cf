use chrono::{NaiveDate, NaiveTime};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use url::Url;

use super::error::{FestaError, Result};
use super::types::{ApiEnvelope, Event, FeedbackEntry, MenuItem};
use crate::net::{HttpRequest, HttpResponse, ResilientClient, RetryPolicy, Transport};
use crate::validation::{validate_contact, Field, FeedbackForm, ReservationForm, ValidationError};

/// Client for the event backend.
pub struct FestaApi<T> {
  http: ResilientClient<T>,
  base: Url,
}

impl<T: Transport> FestaApi<T> {
  pub fn new(http: ResilientClient<T>, base: Url) -> Self {
    Self { http, base }
  }

  pub fn base_url(&self) -> &Url {
    &self.base
  }

  pub fn retry_policy(&self) -> &RetryPolicy {
    self.http.policy()
  }

  /// Ask to be reminded of the event by email or SMS.
  pub async fn request_reminder(&self, contact: &str) -> Result<()> {
    let body = validate_contact(contact)?;
    let response = self.post("/api/reminder", &body).await?;
    read_envelope::<IgnoredAny>("/api/reminder", &response, "Errore nell'invio del promemoria.")?;
    Ok(())
  }

  /// Free seats per table for a date (`YYYY-MM-DD`) and time (`HH:MM`).
  pub async fn table_availability(&self, date: &str, time: &str) -> Result<HashMap<String, u32>> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| ValidationError {
      field: Field::Date,
      message: "La data non è valida (formato AAAA-MM-GG)".to_string(),
    })?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M").map_err(|_| ValidationError {
      field: Field::Time,
      message: "L'ora non è valida (formato HH:MM)".to_string(),
    })?;

    let mut url = self.base.join("/api/tavoli")?;
    url.set_query(Some(&format!(
      "data={}&ora={}",
      date.format("%Y-%m-%d"),
      time.format("%H:%M")
    )));

    let response = self.get(url).await?;
    let seats: Option<HashMap<String, u32>> =
      read_envelope("/api/tavoli", &response, "Errore nel caricamento, riprova")?;
    Ok(seats.unwrap_or_default())
  }

  /// Validate and submit a reservation. Invalid forms never reach the network.
  pub async fn reserve(&self, form: &ReservationForm, today: NaiveDate) -> Result<()> {
    let body = form.validate(today)?;
    let response = self.post("/api/prenota", &body).await?;
    read_envelope::<IgnoredAny>("/api/prenota", &response, "Errore nella prenotazione.")?;
    Ok(())
  }

  /// Latest feedback, newest first as returned by the backend.
  pub async fn feedback(&self, limit: u32) -> Result<Vec<FeedbackEntry>> {
    let mut url = self.base.join("/api/feedback")?;
    url.set_query(Some(&format!("limit={}", limit)));

    let response = self.get(url).await?;
    let entries: Option<Vec<FeedbackEntry>> =
      read_envelope("/api/feedback", &response, "Errore nel caricamento dei feedback.")?;
    Ok(entries.unwrap_or_default())
  }

  pub async fn submit_feedback(&self, form: &FeedbackForm) -> Result<()> {
    let body = form.validate()?;
    let response = self.post("/api/feedback", &body).await?;
    read_envelope::<IgnoredAny>("/api/feedback", &response, "Errore nell'invio del feedback.")?;
    Ok(())
  }

  /// Menu items grouped by category.
  pub async fn menu(&self) -> Result<BTreeMap<String, Vec<MenuItem>>> {
    let url = self.base.join("/api/public/menu")?;
    let response = self.get(url).await?;
    let menu: Option<BTreeMap<String, Vec<MenuItem>>> =
      read_envelope("/api/public/menu", &response, "Menu non disponibile.")?;
    Ok(menu.unwrap_or_default())
  }

  pub async fn events(&self) -> Result<Vec<Event>> {
    let url = self.base.join("/api/public/events")?;
    let response = self.get(url).await?;
    let events: Option<Vec<Event>> =
      read_envelope("/api/public/events", &response, "Eventi non disponibili.")?;
    Ok(events.unwrap_or_default())
  }

  async fn get(&self, url: Url) -> Result<HttpResponse> {
    debug!("GET {}", url);
    Ok(self.http.fetch_with_retry(&HttpRequest::get(url)).await?)
  }

  async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<HttpResponse> {
    let url = self.base.join(path)?;
    debug!("POST {}", url);
    let request = HttpRequest::post_json(url, body).map_err(FestaError::Encode)?;
    Ok(self.http.fetch_with_retry(&request).await?)
  }
}

/// Unwrap `{success, data, error}`.
///
/// Non-2xx statuses carry the backend's `error` text when there is one, else
/// `Errore <status>: <reason>`. `fallback` is used when `success` is false
/// without an explanation.
fn read_envelope<D: DeserializeOwned>(endpoint: &str, response: &HttpResponse, fallback: &str) -> Result<D> {
  let envelope = response.json_body::<ApiEnvelope>();

  if matches!(&envelope, Ok(e) if e.offline) {
    return Err(FestaError::Offline);
  }

  if !response.is_ok() {
    let message = envelope
      .ok()
      .and_then(|e| e.error)
      .unwrap_or_else(|| format!("Errore {}: {}", response.status, response.status_text));
    return Err(FestaError::Rejected {
      status: response.status,
      message,
    });
  }

  let envelope = envelope.map_err(|source| FestaError::Decode {
    endpoint: endpoint.to_string(),
    source,
  })?;

  if !envelope.success {
    return Err(FestaError::Rejected {
      status: response.status,
      message: envelope.error.unwrap_or_else(|| fallback.to_string()),
    });
  }

  serde_json::from_value(envelope.data.unwrap_or(Value::Null)).map_err(|source| FestaError::Decode {
    endpoint: endpoint.to_string(),
    source,
  })
}
