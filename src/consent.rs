//! Cookie-consent choice persisted on the client.

use color_eyre::{eyre::eyre, Result};
use std::fmt;
use std::str::FromStr;

/// Storage key of the consent choice.
pub const CONSENT_KEY: &str = "cookie-consent";

/// Key-value store for small client-side preferences.
pub trait PreferenceStore {
  fn preference(&self, key: &str) -> Result<Option<String>>;
  fn set_preference(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consent {
  Accepted,
  Declined,
}

impl Consent {
  pub fn as_str(&self) -> &'static str {
    match self {
      Consent::Accepted => "accepted",
      Consent::Declined => "declined",
    }
  }
}

impl fmt::Display for Consent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Consent {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "accepted" => Ok(Consent::Accepted),
      "declined" => Ok(Consent::Declined),
      other => Err(eyre!("Unknown consent value '{}'", other)),
    }
  }
}

/// The stored choice, or `None` while the banner has not been answered.
pub fn load<S: PreferenceStore + ?Sized>(store: &S) -> Result<Option<Consent>> {
  store
    .preference(CONSENT_KEY)?
    .map(|v| v.parse())
    .transpose()
}

pub fn save<S: PreferenceStore + ?Sized>(store: &S, consent: Consent) -> Result<()> {
  store.set_preference(CONSENT_KEY, consent.as_str())
}
