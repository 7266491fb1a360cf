//! Response storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::namespace::CachedResponse;
use crate::consent::PreferenceStore;
use crate::net::HttpResponse;

/// Trait for durable, namespaced response stores.
///
/// Entries are only ever replaced whole or dropped with their namespace.
pub trait ResponseStore: Send + Sync {
  /// Create the namespace if it does not exist yet.
  fn open_namespace(&self, namespace: &str) -> Result<()>;

  /// All namespace names, oldest first.
  fn namespaces(&self) -> Result<Vec<String>>;

  /// Delete a namespace and every entry in it. Returns false if it did not exist.
  fn delete_namespace(&self, namespace: &str) -> Result<bool>;

  /// Store a response under `key`, replacing any previous one.
  fn put(&self, namespace: &str, key: &str, response: &HttpResponse) -> Result<()>;

  /// Store several responses in one transaction; either all land or none.
  fn put_all(&self, namespace: &str, entries: &[(String, HttpResponse)]) -> Result<()>;

  /// Look up `key` in one namespace.
  fn get(&self, namespace: &str, key: &str) -> Result<Option<CachedResponse>>;

  /// Look up `key` across all namespaces, oldest namespace first.
  fn find(&self, key: &str) -> Result<Option<CachedResponse>>;

  /// Keys stored in a namespace.
  fn keys(&self, namespace: &str) -> Result<Vec<String>>;
}

/// SQLite-based response storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open or create the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Throwaway database, used by tests.
  #[allow(dead_code)]
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  /// Number of entries in a namespace.
  pub fn entry_count(&self, namespace: &str) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM cache_entries ce
         INNER JOIN cache_namespaces cn ON cn.id = ce.namespace_id
         WHERE cn.name = ?",
        params![namespace],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries in {}: {}", namespace, e))?;

    Ok(count as usize)
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per versioned namespace, id order is creation order
CREATE TABLE IF NOT EXISTS cache_namespaces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Captured responses keyed by request URL
CREATE TABLE IF NOT EXISTS cache_entries (
    namespace_id INTEGER NOT NULL,
    request_url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (namespace_id, request_url),
    FOREIGN KEY (namespace_id) REFERENCES cache_namespaces(id)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_url ON cache_entries(request_url);

-- Small client-side preferences (cookie consent)
CREATE TABLE IF NOT EXISTS preferences (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const SELECT_ENTRY: &str = "SELECT ce.status, ce.status_text, ce.headers, ce.body, ce.cached_at
   FROM cache_entries ce
   INNER JOIN cache_namespaces cn ON cn.id = ce.namespace_id";

type EntryRow = (u16, String, String, Vec<u8>, String);

fn read_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
  Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_cached((status, status_text, headers, body, cached_at): EntryRow) -> Result<CachedResponse> {
  let headers: Vec<(String, String)> =
    serde_json::from_str(&headers).map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;

  Ok(CachedResponse {
    response: HttpResponse {
      status,
      status_text,
      headers,
      body,
    },
    cached_at: parse_datetime(&cached_at)?,
  })
}

fn ensure_namespace(conn: &Connection, namespace: &str) -> Result<i64> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_namespaces (name) VALUES (?)",
      params![namespace],
    )
    .map_err(|e| eyre!("Failed to create namespace {}: {}", namespace, e))?;

  conn
    .query_row(
      "SELECT id FROM cache_namespaces WHERE name = ?",
      params![namespace],
      |row| row.get(0),
    )
    .map_err(|e| eyre!("Failed to look up namespace {}: {}", namespace, e))
}

fn write_entry(conn: &Connection, namespace_id: i64, key: &str, response: &HttpResponse) -> Result<()> {
  let headers =
    serde_json::to_string(&response.headers).map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (namespace_id, request_url, status, status_text, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        namespace_id,
        key,
        response.status,
        response.status_text,
        headers,
        response.body
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", key, e))?;

  Ok(())
}

impl ResponseStore for SqliteStorage {
  fn open_namespace(&self, namespace: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    ensure_namespace(&conn, namespace)?;
    Ok(())
  }

  fn namespaces(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM cache_namespaces ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list namespaces: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read namespace: {}", e))?;

    Ok(names)
  }

  fn delete_namespace(&self, namespace: &str) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE namespace_id IN
         (SELECT id FROM cache_namespaces WHERE name = ?)",
      params![namespace],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", namespace, e))?;

    let deleted = tx
      .execute("DELETE FROM cache_namespaces WHERE name = ?", params![namespace])
      .map_err(|e| eyre!("Failed to delete namespace {}: {}", namespace, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(deleted > 0)
  }

  fn put(&self, namespace: &str, key: &str, response: &HttpResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let namespace_id = ensure_namespace(&conn, namespace)?;
    write_entry(&conn, namespace_id, key, response)
  }

  fn put_all(&self, namespace: &str, entries: &[(String, HttpResponse)]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let namespace_id = ensure_namespace(&tx, namespace)?;
    for (key, response) in entries {
      write_entry(&tx, namespace_id, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn get(&self, namespace: &str, key: &str) -> Result<Option<CachedResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row = conn
      .query_row(
        &format!("{} WHERE cn.name = ? AND ce.request_url = ?", SELECT_ENTRY),
        params![namespace, key],
        read_entry_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {} from {}: {}", key, namespace, e))?;

    row.map(into_cached).transpose()
  }

  fn find(&self, key: &str) -> Result<Option<CachedResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row = conn
      .query_row(
        &format!("{} WHERE ce.request_url = ? ORDER BY cn.id LIMIT 1", SELECT_ENTRY),
        params![key],
        read_entry_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key, e))?;

    row.map(into_cached).transpose()
  }

  fn keys(&self, namespace: &str) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT ce.request_url FROM cache_entries ce
         INNER JOIN cache_namespaces cn ON cn.id = ce.namespace_id
         WHERE cn.name = ?
         ORDER BY ce.request_url",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![namespace], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list keys of {}: {}", namespace, e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read key: {}", e))?;

    Ok(keys)
  }
}

impl PreferenceStore for SqliteStorage {
  fn preference(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM preferences WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read preference {}: {}", key, e))
  }

  fn set_preference(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO preferences (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to store preference {}: {}", key, e))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn response(body: &str) -> HttpResponse {
    HttpResponse::new(200, body)
      .with_header("Content-Type", "text/css")
      .with_header("ETag", "\"abc\"")
  }

  #[test]
  fn test_put_then_get_is_byte_identical() {
    let storage = SqliteStorage::in_memory().unwrap();
    let stored = HttpResponse {
      status: 200,
      status_text: "OK".to_string(),
      headers: vec![("Content-Type".to_string(), "image/png".to_string())],
      body: vec![0x89, b'P', b'N', b'G', 0x00, 0xff],
    };

    storage
      .put("festa-sport-images-v2", "https://festa.example/logo.png", &stored)
      .unwrap();
    let cached = storage
      .get("festa-sport-images-v2", "https://festa.example/logo.png")
      .unwrap()
      .unwrap();

    assert_eq!(cached.response, stored);
  }

  #[test]
  fn test_put_replaces_whole_entry() {
    let storage = SqliteStorage::in_memory().unwrap();
    storage.put("ns", "/css/style.css", &response("old")).unwrap();
    storage
      .put("ns", "/css/style.css", &HttpResponse::new(200, "new"))
      .unwrap();

    let cached = storage.get("ns", "/css/style.css").unwrap().unwrap();
    assert_eq!(cached.response.body, b"new");
    assert!(cached.response.headers.is_empty());
    assert_eq!(storage.entry_count("ns").unwrap(), 1);
  }

  #[test]
  fn test_missing_entry() {
    let storage = SqliteStorage::in_memory().unwrap();
    storage.open_namespace("ns").unwrap();

    assert!(storage.get("ns", "/nope").unwrap().is_none());
    assert!(storage.get("other", "/nope").unwrap().is_none());
  }

  #[test]
  fn test_namespaces_listed_in_creation_order() {
    let storage = SqliteStorage::in_memory().unwrap();
    storage.open_namespace("b").unwrap();
    storage.open_namespace("a").unwrap();
    storage.open_namespace("b").unwrap();

    assert_eq!(storage.namespaces().unwrap(), vec!["b", "a"]);
  }

  #[test]
  fn test_delete_namespace_drops_entries() {
    let storage = SqliteStorage::in_memory().unwrap();
    storage.put("old", "/index.html", &response("v1")).unwrap();
    storage.put("new", "/index.html", &response("v2")).unwrap();

    assert!(storage.delete_namespace("old").unwrap());
    assert!(!storage.delete_namespace("old").unwrap());

    assert_eq!(storage.namespaces().unwrap(), vec!["new"]);
    assert!(storage.get("old", "/index.html").unwrap().is_none());
    assert_eq!(storage.find("/index.html").unwrap().unwrap().response.body, b"v2");
  }

  #[test]
  fn test_find_prefers_oldest_namespace() {
    let storage = SqliteStorage::in_memory().unwrap();
    storage.put("first", "/a.js", &response("first")).unwrap();
    storage.put("second", "/a.js", &response("second")).unwrap();

    assert_eq!(storage.find("/a.js").unwrap().unwrap().response.body, b"first");
    assert!(storage.find("/b.js").unwrap().is_none());
  }

  #[test]
  fn test_put_all_stores_every_entry() {
    let storage = SqliteStorage::in_memory().unwrap();
    let entries = vec![
      ("/".to_string(), response("home")),
      ("/css/style.css".to_string(), response("css")),
    ];

    storage.put_all("static", &entries).unwrap();

    assert_eq!(storage.keys("static").unwrap(), vec!["/", "/css/style.css"]);
  }

  #[test]
  fn test_preferences_round_trip() {
    let storage = SqliteStorage::in_memory().unwrap();
    assert!(storage.preference("cookie-consent").unwrap().is_none());

    storage.set_preference("cookie-consent", "declined").unwrap();
    storage.set_preference("cookie-consent", "accepted").unwrap();

    assert_eq!(
      storage.preference("cookie-consent").unwrap().as_deref(),
      Some("accepted")
    );
  }
}
