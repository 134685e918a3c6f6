//! GitHub OAuth 2.0 Device Authorization Grant (RFC 8628) client.
//!
//! Performs exactly two HTTP calls: request a device code, and poll the token
//! endpoint once. The flow state machine (when to poll again, when to give
//! up) belongs to the caller; this client holds no state between calls.

use ghgate_config::OAuthSettings;
use ghgate_types::{AccessToken, DeviceAuthorization, GateError, PendingReason, traits::Result};
use serde::Deserialize;
use serde_json::Value;

use crate::http::USER_AGENT;

/// Grant type for device-code token requests.
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

const DEFAULT_VERIFICATION_URI: &str = "https://github.com/login/device";
const DEFAULT_EXPIRES_IN: u64 = 900;
const DEFAULT_INTERVAL: u64 = 5;

/// Result of a single token poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The user approved the device; the flow is complete.
    Authorized(AccessToken),
    /// Not yet approved. Poll again after `interval` (or the current interval).
    Pending {
        reason: PendingReason,
        description: Option<String>,
        /// Interval in seconds the server asked for, if it sent one.
        interval: Option<u64>,
    },
    /// Terminal error from the authorization server (`access_denied`,
    /// `expired_token`, ...). The flow has to be restarted.
    Denied {
        error: String,
        description: Option<String>,
    },
}

/// Raw token endpoint response; every field is optional on the wire.
#[derive(Debug, Default, Deserialize)]
struct TokenPollResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    interval: Option<u64>,
}

/// HTTP client for the authorization server's device and token endpoints.
#[derive(Clone)]
pub struct DeviceFlowClient {
    http: rquest::Client,
}

impl DeviceFlowClient {
    #[must_use]
    pub fn new(http: rquest::Client) -> Self {
        Self { http }
    }

    /// Request a device and user code.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Http`] on transport failure and
    /// [`GateError::Upstream`] (with the upstream status and body) on a
    /// non-2xx or malformed response.
    pub async fn request_device_code(
        &self,
        settings: &OAuthSettings,
    ) -> Result<DeviceAuthorization> {
        let params = [
            ("client_id", settings.client_id.as_str()),
            ("scope", settings.scope.as_str()),
        ];

        let resp = self
            .http
            .post(&settings.device_code_url)
            .header("accept", "application/json")
            .header("user-agent", USER_AGENT)
            .form(&params)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;
        if !(200..300).contains(&status) {
            return Err(GateError::upstream(status, body));
        }

        let json: Value =
            serde_json::from_str(&body).map_err(|_| GateError::upstream(status, body.clone()))?;
        parse_device_code_response(&json).map_err(|_| GateError::upstream(status, body))
    }

    /// Poll the token endpoint once.
    ///
    /// Pending and denied states are returned as [`PollOutcome`] values, not
    /// errors.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Http`] on transport failure and
    /// [`GateError::Upstream`] when the response carries neither a token nor
    /// an OAuth `error` code.
    pub async fn poll_access_token(
        &self,
        settings: &OAuthSettings,
        device_code: &str,
    ) -> Result<PollOutcome> {
        let params = [
            ("client_id", settings.client_id.as_str()),
            ("device_code", device_code),
            ("grant_type", DEVICE_CODE_GRANT_TYPE),
        ];

        let resp = self
            .http
            .post(&settings.token_url)
            .header("accept", "application/json")
            .header("user-agent", USER_AGENT)
            .form(&params)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;
        parse_poll_response(status, &body)
    }
}

/// Parse the device code endpoint JSON response.
///
/// # Errors
///
/// Returns an error if `device_code` or `user_code` is missing.
pub fn parse_device_code_response(json: &Value) -> Result<DeviceAuthorization> {
    Ok(DeviceAuthorization {
        device_code: json
            .get("device_code")
            .and_then(Value::as_str)
            .ok_or_else(|| GateError::Auth("missing device_code".into()))?
            .to_string(),
        user_code: json
            .get("user_code")
            .and_then(Value::as_str)
            .ok_or_else(|| GateError::Auth("missing user_code".into()))?
            .to_string(),
        verification_uri: json
            .get("verification_uri")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_VERIFICATION_URI)
            .to_string(),
        expires_in: json
            .get("expires_in")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_EXPIRES_IN),
        interval: json
            .get("interval")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_INTERVAL),
    })
}

/// Interpret a token endpoint response.
///
/// The body is inspected regardless of status: RFC 8628 servers answer
/// pending polls with 400, GitHub answers them with 200.
///
/// # Errors
///
/// Returns [`GateError::Upstream`] if the body is not JSON or has neither
/// `access_token` nor `error`.
pub fn parse_poll_response(status: u16, body: &str) -> Result<PollOutcome> {
    let parsed: TokenPollResponse =
        serde_json::from_str(body).map_err(|_| GateError::upstream(status, body))?;

    if let Some(access_token) = parsed.access_token.filter(|t| !t.is_empty()) {
        return Ok(PollOutcome::Authorized(AccessToken {
            access_token,
            token_type: parsed.token_type,
            scope: parsed.scope,
        }));
    }

    match parsed.error {
        Some(code) => Ok(match PendingReason::from_code(&code) {
            Some(reason) => PollOutcome::Pending {
                reason,
                description: parsed.error_description,
                interval: parsed.interval,
            },
            None => PollOutcome::Denied {
                error: code,
                description: parsed.error_description,
            },
        }),
        None => Err(GateError::upstream(status, body)),
    }
}
