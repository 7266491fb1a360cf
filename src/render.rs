//! Plain-text output for the CLI.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::api::{Event, FeedbackEntry, MenuItem};
use crate::tables::{TableState, TableView};

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_chars: usize) -> String {
  if s.chars().count() <= max_chars {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Allergen names as written on the menu, matched by substring.
const ALLERGEN_ICONS: &[(&str, &str)] = &[
  ("glutine", "🌾"),
  ("latte", "🥛"),
  ("uova", "🥚"),
  ("frutta a guscio", "🌰"),
  ("arachidi", "🥜"),
  ("soia", "🫘"),
  ("pesce", "🐟"),
  ("crostacei", "🦐"),
  ("molluschi", "🐙"),
  ("sedano", "🥬"),
  ("senape", "🌭"),
  ("sesamo", "🥯"),
  ("solfiti", "🍷"),
  ("lupini", "🌼"),
];

const UNKNOWN_ALLERGEN_ICON: &str = "⚠️";

/// Icon and name for each entry of a comma-separated allergen list.
pub fn allergens(list: &str) -> String {
  list
    .split(',')
    .map(|a| a.trim().to_lowercase())
    .filter(|a| !a.is_empty())
    .map(|a| {
      let icon = ALLERGEN_ICONS
        .iter()
        .find(|(name, _)| a.contains(name))
        .map(|(_, icon)| *icon)
        .unwrap_or(UNKNOWN_ALLERGEN_ICON);
      format!("{} {}", icon, a)
    })
    .collect::<Vec<_>>()
    .join("  ")
}

/// Five stars, filled up to `rating`.
pub fn stars(rating: u8) -> String {
  (1..=5).map(|i| if i <= rating { '★' } else { '☆' }).collect()
}

/// `dd/mm/yyyy` for ISO dates and timestamps; anything else is shown as is.
pub fn format_date(raw: &str) -> String {
  let raw = raw.trim();
  let date = DateTime::parse_from_rfc3339(raw)
    .map(|d| d.date_naive())
    .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|d| d.date()))
    .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|d| d.date()))
    .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"));

  match date {
    Ok(d) => d.format("%d/%m/%Y").to_string(),
    Err(_) => raw.to_string(),
  }
}

pub fn feedback(entries: &[FeedbackEntry]) -> String {
  if entries.is_empty() {
    return "Nessun feedback ancora. Sii il primo!\n".to_string();
  }

  let mut out = String::new();
  for entry in entries {
    let _ = writeln!(
      out,
      "{}  {}  {}",
      stars(entry.rating),
      entry.author(),
      format_date(&entry.timestamp)
    );
    let _ = writeln!(out, "  {}", truncate(&entry.message, 280));
  }
  out
}

pub fn menu(categories: &BTreeMap<String, Vec<MenuItem>>) -> String {
  if categories.values().all(Vec::is_empty) {
    return "Nessun menu disponibile.\n".to_string();
  }

  let mut out = String::new();
  for (category, items) in categories.iter().filter(|(_, items)| !items.is_empty()) {
    let _ = writeln!(out, "{}", category.to_uppercase());
    for item in items {
      let _ = writeln!(out, "  - {}", item.nome);
      if let Some(description) = item.descrizione.as_deref().filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(out, "    {}", description);
      }
      if let Some(list) = item.allergeni.as_deref().filter(|a| !a.trim().is_empty()) {
        let _ = writeln!(out, "    Allergeni: {}", allergens(list));
      }
    }
  }
  out
}

/// Events grouped by day, earliest first.
pub fn events(events: &[Event]) -> String {
  if events.is_empty() {
    return "Nessun evento in programma.\n".to_string();
  }

  let mut by_date: BTreeMap<&str, Vec<&Event>> = BTreeMap::new();
  for event in events {
    by_date.entry(event.data.as_str()).or_default().push(event);
  }

  let mut out = String::new();
  for (date, day) in by_date {
    let _ = writeln!(out, "{}", format_date(date));
    for event in day {
      let time = event.ora.as_deref().unwrap_or("");
      let _ = writeln!(out, "  {:>5}  {}", time, event.titolo);
      if let Some(place) = event.luogo.as_deref().filter(|p| !p.trim().is_empty()) {
        let _ = writeln!(out, "         {}", place);
      }
      if let Some(description) = event.descrizione.as_deref().filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(out, "         {}", description);
      }
    }
  }
  out
}

pub fn tables(views: &[TableView]) -> String {
  let mut out = String::new();
  for view in views {
    let marker = match view.state {
      TableState::Available { .. } => "libero",
      TableState::Booked => "occupato",
    };
    let _ = writeln!(out, "Tavolo {:>3}  {:<8}  {}", view.id, marker, view.tooltip);
  }
  out
}
