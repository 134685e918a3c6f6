//! Expiry-aware in-memory bearer token cache.

use ghgate_types::{CachedToken, unix_now};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// Tokens are considered stale this many seconds before they actually expire.
pub const DEFAULT_REFRESH_BUFFER_SECS: u64 = 300;

/// Cache key for a stored credential.
#[must_use]
pub fn credential_key(credential_id: &str) -> String {
    format!("cred:{credential_id}")
}

/// Cache key for a caller-supplied GitHub access token.
#[must_use]
pub fn access_token_key(github_token: &str) -> String {
    format!("gh:{github_token}")
}

/// Maps a cache key (credential id or raw access token) to a short-lived
/// token.
///
/// Entries are evicted lazily: [`TokenCache::get`] drops an entry once
/// `expires_at <= now + refresh_buffer`. There is no capacity bound and no
/// persistence.
pub struct TokenCache {
    entries: Mutex<HashMap<String, CachedToken>>,
    refresh_buffer_secs: u64,
}

impl TokenCache {
    #[must_use]
    pub fn new(refresh_buffer_secs: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            refresh_buffer_secs,
        }
    }

    #[must_use]
    pub fn refresh_buffer_secs(&self) -> u64 {
        self.refresh_buffer_secs
    }

    /// Return the token for `key` if it is still fresh.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<CachedToken> {
        self.get_at(key, unix_now())
    }

    /// [`TokenCache::get`] evaluated at an explicit unix time.
    #[must_use]
    pub fn get_at(&self, key: &str, now: u64) -> Option<CachedToken> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_fresh_at(now, self.refresh_buffer_secs) => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: impl Into<String>, token: CachedToken) {
        self.lock().insert(key.into(), token);
    }

    /// Drop the entry for `key`. Returns `true` if one existed.
    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of entries, including stale ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedToken>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_BUFFER_SECS)
    }
}
