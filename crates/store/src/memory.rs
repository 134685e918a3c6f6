//! In-memory credential store backed by a `HashMap` behind a `Mutex`.

use async_trait::async_trait;
use ghgate_types::{Credential, CredentialStore, GateError, traits::Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;

/// An in-memory [`CredentialStore`] implementation for testing and ephemeral use.
pub struct InMemoryCredentialStore {
    /// Id-keyed credential map.
    data: Mutex<HashMap<String, Credential>>,
}

impl InMemoryCredentialStore {
    /// Creates a new empty in-memory credential store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a store pre-populated with `credentials`.
    #[must_use]
    pub fn with_credentials(credentials: impl IntoIterator<Item = Credential>) -> Self {
        let data = credentials
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        Self {
            data: Mutex::new(data),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Credential>>> {
        self.data
            .lock()
            .map_err(|_| GateError::Storage("credential map lock poisoned".into()))
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, id: &str) -> Result<Option<Credential>> {
        Ok(self.lock()?.get(id).cloned())
    }

    async fn put(&self, credential: &Credential) -> Result<()> {
        self.lock()?.insert(credential.id.clone(), credential.clone());
        Ok(())
    }

    /// Read-modify-write under the map lock.
    async fn merge_attributes(&self, id: &str, patch: Map<String, Value>) -> Result<Credential> {
        let mut data = self.lock()?;
        let credential = data
            .get_mut(id)
            .ok_or_else(|| GateError::NotFound(id.to_string()))?;
        credential.merge(patch);
        Ok(credential.clone())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.lock()?.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<Credential>> {
        let mut all: Vec<Credential> = self.lock()?.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }
}
