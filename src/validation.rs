//! Form validation run before anything is sent to the backend.
//!
//! Messages are the Italian texts shown next to the forms.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Italian mobile number, optionally prefixed by +39 or 0039.
static PHONE_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^(\+39|0039)?3\d{9}$").expect("Invalid PHONE_RE regex"));

static PHONE_CHARS_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^[\d\+\s\-\(\)]+$").expect("Invalid PHONE_CHARS_RE regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
  Table,
  Name,
  Phone,
  Date,
  Time,
  Guests,
  Privacy,
  Contact,
  Rating,
  Message,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
  pub field: Field,
  pub message: String,
}

impl ValidationError {
  fn new(field: Field, message: impl Into<String>) -> Self {
    Self {
      field,
      message: message.into(),
    }
  }
}

pub fn is_valid_phone(phone: &str) -> bool {
  let clean: String = phone
    .chars()
    .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '/' | '(' | ')'))
    .collect();
  PHONE_RE.is_match(&clean)
}

/// Explain why a phone number was rejected.
pub fn phone_error(phone: &str) -> &'static str {
  if phone.trim().is_empty() {
    return "Il telefono è obbligatorio";
  }
  let clean: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
  if clean.chars().count() < 10 {
    return "Il numero di telefono è troppo corto";
  }
  if !PHONE_CHARS_RE.is_match(&clean) {
    return "Il telefono contiene caratteri non validi";
  }
  "Il formato del telefono non è valido. Inserisci un numero italiano (es: 3331234567)"
}

/// Raw reservation form input.
#[derive(Debug, Clone, Default)]
pub struct ReservationForm {
  pub table: Option<String>,
  pub name: String,
  pub phone: String,
  pub date: String,
  pub time: String,
  pub guests: String,
  pub notes: String,
  pub privacy_consent: bool,
}

/// Body of `POST /api/prenota`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationRequest {
  pub nome: String,
  pub telefono: String,
  pub data: String,
  pub ora: String,
  pub ospiti: String,
  pub tavolo: String,
  pub note: String,
}

impl ReservationForm {
  /// Check the form in display order; the first problem wins.
  ///
  /// `today` is the first bookable date.
  pub fn validate(&self, today: NaiveDate) -> Result<ReservationRequest, ValidationError> {
    let table = match self.table.as_deref().map(str::trim) {
      Some(t) if !t.is_empty() => t.to_string(),
      _ => {
        return Err(ValidationError::new(
          Field::Table,
          "Seleziona un tavolo prima di prenotare!",
        ))
      }
    };

    let name = self.name.trim();
    if name.is_empty() {
      return Err(ValidationError::new(Field::Name, "Il nome è obbligatorio"));
    }
    if name.chars().count() < 2 {
      return Err(ValidationError::new(
        Field::Name,
        "Il nome deve contenere almeno 2 caratteri",
      ));
    }

    let phone = self.phone.trim();
    if phone.is_empty() {
      return Err(ValidationError::new(Field::Phone, "Il telefono è obbligatorio"));
    }
    if !is_valid_phone(phone) {
      return Err(ValidationError::new(Field::Phone, phone_error(phone)));
    }

    let date = self.date.trim();
    if date.is_empty() {
      return Err(ValidationError::new(Field::Date, "La data è obbligatoria"));
    }
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
      Ok(d) if d >= today => {}
      _ => {
        return Err(ValidationError::new(
          Field::Date,
          "La data deve essere oggi o una data futura",
        ))
      }
    }

    let time = self.time.trim();
    if time.is_empty() {
      return Err(ValidationError::new(Field::Time, "L'ora è obbligatoria"));
    }

    let guests = self.guests.trim();
    if guests.is_empty() {
      return Err(ValidationError::new(Field::Guests, "Seleziona il numero di persone"));
    }

    if !self.privacy_consent {
      return Err(ValidationError::new(
        Field::Privacy,
        "Devi accettare la Privacy Policy per completare la prenotazione",
      ));
    }

    Ok(ReservationRequest {
      nome: name.to_string(),
      telefono: phone.to_string(),
      data: date.to_string(),
      ora: time.to_string(),
      ospiti: guests.to_string(),
      tavolo: table,
      note: self.notes.trim().to_string(),
    })
  }
}

/// Body of `POST /api/reminder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderRequest {
  pub contact: String,
}

/// An email (anything with `@`) or a valid Italian mobile number.
pub fn validate_contact(contact: &str) -> Result<ReminderRequest, ValidationError> {
  let contact = contact.trim();
  if contact.is_empty() {
    return Err(ValidationError::new(
      Field::Contact,
      "Inserisci un'email o un numero di telefono.",
    ));
  }

  if !contact.contains('@') && !is_valid_phone(contact) {
    return Err(ValidationError::new(
      Field::Contact,
      "Numero di telefono non valido. Usa formato 3331234567, +393331234567 o 00393331234567.",
    ));
  }

  Ok(ReminderRequest {
    contact: contact.to_string(),
  })
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackForm {
  pub name: String,
  /// 0 when no star was picked
  pub rating: u8,
  pub message: String,
}

/// Body of `POST /api/feedback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackRequest {
  pub nome: String,
  pub rating: u8,
  pub message: String,
}

impl FeedbackForm {
  pub fn validate(&self) -> Result<FeedbackRequest, ValidationError> {
    if self.rating == 0 {
      return Err(ValidationError::new(
        Field::Rating,
        "Per favore, seleziona una valutazione prima di inviare.",
      ));
    }
    if self.rating > 5 {
      return Err(ValidationError::new(
        Field::Rating,
        "La valutazione deve essere compresa tra 1 e 5.",
      ));
    }

    let message = self.message.trim();
    if message.is_empty() {
      return Err(ValidationError::new(Field::Message, "Il messaggio è obbligatorio."));
    }

    let name = self.name.trim();
    Ok(FeedbackRequest {
      nome: if name.is_empty() { "Anonimo".to_string() } else { name.to_string() },
      rating: self.rating,
      message: message.to_string(),
    })
  }
}
