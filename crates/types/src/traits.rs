//! Async traits shared across all ghgate crates.
//!
//! Every cross-crate abstraction is defined here so that higher layers depend
//! only on `ghgate-types`, not on each other.

use crate::Credential;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub use crate::error::Result;

/// Persistent storage for credentials, keyed by credential id.
///
/// Implementations must apply [`CredentialStore::merge_attributes`]
/// atomically with respect to other calls on the same credential; concurrent
/// merges are last-write-wins per key.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load a credential by id.
    async fn get(&self, id: &str) -> Result<Option<Credential>>;

    /// Insert or replace a credential.
    async fn put(&self, credential: &Credential) -> Result<()>;

    /// Merge `patch` into the credential's attribute bag and return the
    /// updated record. `null` values remove keys.
    ///
    /// Returns [`crate::GateError::NotFound`] if the credential does not exist.
    async fn merge_attributes(&self, id: &str, patch: Map<String, Value>) -> Result<Credential>;

    /// Delete a credential. Returns `true` if it existed.
    async fn remove(&self, id: &str) -> Result<bool>;

    /// List all credentials ordered by creation time.
    async fn list(&self) -> Result<Vec<Credential>>;
}
