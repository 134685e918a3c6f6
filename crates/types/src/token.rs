//! Device-flow values, Copilot token representations, and expiry helpers.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Expiry values above this magnitude are milliseconds, not seconds.
pub const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Current unix time in seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Normalize an upstream `expires_at` into unix seconds.
///
/// Values greater than [`MILLIS_THRESHOLD`] are treated as milliseconds.
/// Negative values clamp to zero.
#[must_use]
pub fn normalize_expiry(raw: i64) -> u64 {
    let secs = if raw > MILLIS_THRESHOLD {
        raw / 1000
    } else {
        raw
    };
    u64::try_from(secs).unwrap_or(0)
}

/// Response of the device authorization request (RFC 8628 §3.2).
///
/// Lives only for the duration of one polling sequence; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuthorization {
    /// Unique device verification code.
    pub device_code: String,
    /// Short code the user enters at the verification URI.
    pub user_code: String,
    /// URL where the user authorizes the device.
    pub verification_uri: String,
    /// Seconds until the device code expires.
    pub expires_in: u64,
    /// Minimum polling interval in seconds.
    pub interval: u64,
}

/// An access token issued at the end of a successful device flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Why a device-flow poll did not yield a token yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingReason {
    /// The user has not completed authorization.
    AuthorizationPending,
    /// The client is polling too fast and must widen its interval.
    SlowDown,
}

impl PendingReason {
    /// Parse the OAuth `error` code, returning `None` for non-pending codes.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "authorization_pending" => Some(Self::AuthorizationPending),
            "slow_down" => Some(Self::SlowDown),
            _ => None,
        }
    }

    /// The OAuth `error` code for this reason.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationPending => "authorization_pending",
            Self::SlowDown => "slow_down",
        }
    }
}

impl std::fmt::Display for PendingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A short-lived bearer token held in the in-memory token cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub token: String,
    /// Unix seconds.
    pub expires_at: u64,
    /// API base URL advertised alongside the token, if any.
    pub api_endpoint: Option<String>,
}

impl CachedToken {
    /// `true` if the token is still usable `buffer_secs` from `now`.
    #[must_use]
    pub fn is_fresh_at(&self, now: u64, buffer_secs: u64) -> bool {
        self.expires_at > now.saturating_add(buffer_secs)
    }
}

/// Where a [`CopilotToken`] was obtained from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    Cache,
    Credential,
    Exchange,
}

/// A Copilot API token ready to be used as a bearer credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopilotToken {
    pub token: String,
    /// Unix seconds.
    pub expires_at: u64,
    pub api_endpoint: Option<String>,
    pub source: TokenSource,
}

impl CopilotToken {
    #[must_use]
    pub fn from_cached(cached: CachedToken, source: TokenSource) -> Self {
        Self {
            token: cached.token,
            expires_at: cached.expires_at,
            api_endpoint: cached.api_endpoint,
            source,
        }
    }

    #[must_use]
    pub fn to_cached(&self) -> CachedToken {
        CachedToken {
            token: self.token.clone(),
            expires_at: self.expires_at,
            api_endpoint: self.api_endpoint.clone(),
        }
    }
}
