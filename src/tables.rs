//! State of the table-reservation widget.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
  Available { seats: Option<u32> },
  Booked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableView {
  pub id: String,
  pub state: TableState,
  pub tooltip: String,
}

impl TableView {
  pub fn selectable(&self) -> bool {
    matches!(self.state, TableState::Available { .. })
  }
}

/// Every table open, waiting for a date and a time.
pub fn awaiting_selection(ids: &[String]) -> Vec<TableView> {
  all_open(ids, "Seleziona data e ora per vedere la disponibilità")
}

/// Every table open after availability could not be loaded.
pub fn load_failed(ids: &[String]) -> Vec<TableView> {
  all_open(ids, "Errore nel caricamento, riprova")
}

fn all_open(ids: &[String], tooltip: &str) -> Vec<TableView> {
  ids
    .iter()
    .map(|id| TableView {
      id: id.clone(),
      state: TableState::Available { seats: None },
      tooltip: tooltip.to_string(),
    })
    .collect()
}

/// Apply the backend's `{tableId: seatsAvailable}` map.
///
/// Tables missing from the map count as having no free seats.
pub fn from_availability(ids: &[String], seats: &HashMap<String, u32>) -> Vec<TableView> {
  ids
    .iter()
    .map(|id| match seats.get(id).copied().unwrap_or(0) {
      0 => TableView {
        id: id.clone(),
        state: TableState::Booked,
        tooltip: "Tavolo non disponibile".to_string(),
      },
      n => TableView {
        id: id.clone(),
        state: TableState::Available { seats: Some(n) },
        tooltip: format!("{} posti disponibili", n),
      },
    })
    .collect()
}
