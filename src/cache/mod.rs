//! Durable response cache organised in versioned namespaces.
//!
//! This module provides:
//! - Namespace naming (`<prefix><purpose>-<version>`)
//! - A storage trait for URL -> response entries
//! - The SQLite implementation, which also keeps small client preferences

mod namespace;
mod storage;

pub use namespace::{CachedResponse, Namespace, NamespaceKind};
pub use storage::{ResponseStore, SqliteStorage};
