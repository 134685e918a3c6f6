//! Credential storage backends.
//!
//! Provides an in-memory store for testing and a SQLite-backed store for production.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryCredentialStore;
pub use sqlite::SqliteCredentialStore;

/// Generate a fresh credential id.
#[must_use]
pub fn new_credential_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
