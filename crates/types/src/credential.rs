//! Credential records and their typed attribute view.
//!
//! A [`Credential`] owns an opaque attribute bag (a JSON object). The gateway
//! only understands the keys listed in [`attr`]; everything else is carried
//! through untouched on merge.

use crate::{GateError, error::Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attribute keys recognised in a credential's bag.
pub mod attr {
    /// OAuth client id override.
    pub const CLIENT_ID: &str = "clientId";
    /// OAuth scope override.
    pub const SCOPE: &str = "scope";
    /// Device code endpoint override.
    pub const DEVICE_CODE_URL: &str = "deviceCodeUrl";
    /// Token endpoint override.
    pub const TOKEN_URL: &str = "tokenUrl";

    pub const GITHUB_ACCESS_TOKEN: &str = "githubAccessToken";
    pub const TOKEN_TYPE: &str = "tokenType";
    pub const TOKEN_SCOPE: &str = "tokenScope";
    pub const RECEIVED_AT: &str = "receivedAt";

    pub const COPILOT_TOKEN: &str = "copilotToken";
    pub const COPILOT_TOKEN_EXPIRES_AT: &str = "copilotTokenExpiresAt";
    pub const COPILOT_API_ENDPOINT: &str = "copilotApiEndpoint";
}

/// A stored credential: an id, a display name, and an attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Unix seconds.
    #[serde(default)]
    pub created_at: u64,
    /// Unix seconds.
    #[serde(default)]
    pub updated_at: u64,
}

impl Credential {
    /// Create a credential with an empty attribute bag.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = crate::unix_now();
        Self {
            id: id.into(),
            name: name.into(),
            attributes: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set a single attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Merge `patch` into the attribute bag.
    ///
    /// Keys mapped to `null` are removed; all other keys overwrite.
    pub fn merge(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            if value.is_null() {
                self.attributes.remove(&key);
            } else {
                self.attributes.insert(key, value);
            }
        }
        self.updated_at = crate::unix_now();
    }

    /// Parse the typed attribute view.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::BadRequest`] naming the first malformed key.
    pub fn typed(&self) -> Result<CredentialAttributes> {
        CredentialAttributes::parse(&self.attributes)
    }
}

/// Typed view over the attributes the gateway reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialAttributes {
    pub client_id: Option<String>,
    pub scope: Option<String>,
    pub device_code_url: Option<String>,
    pub token_url: Option<String>,
    pub github_access_token: Option<String>,
    pub token_type: Option<String>,
    pub token_scope: Option<String>,
    pub received_at: Option<u64>,
    pub copilot_token: Option<String>,
    pub copilot_token_expires_at: Option<u64>,
    pub copilot_api_endpoint: Option<String>,
}

impl CredentialAttributes {
    /// Parse the recognised keys out of an attribute bag.
    ///
    /// `null` is treated as absent. A value of the wrong JSON type is
    /// rejected rather than coerced.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::BadRequest`] naming the offending key.
    pub fn parse(bag: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            client_id: string_attr(bag, attr::CLIENT_ID)?,
            scope: string_attr(bag, attr::SCOPE)?,
            device_code_url: string_attr(bag, attr::DEVICE_CODE_URL)?,
            token_url: string_attr(bag, attr::TOKEN_URL)?,
            github_access_token: string_attr(bag, attr::GITHUB_ACCESS_TOKEN)?,
            token_type: string_attr(bag, attr::TOKEN_TYPE)?,
            token_scope: string_attr(bag, attr::TOKEN_SCOPE)?,
            received_at: u64_attr(bag, attr::RECEIVED_AT)?,
            copilot_token: string_attr(bag, attr::COPILOT_TOKEN)?,
            copilot_token_expires_at: u64_attr(bag, attr::COPILOT_TOKEN_EXPIRES_AT)?,
            copilot_api_endpoint: string_attr(bag, attr::COPILOT_API_ENDPOINT)?,
        })
    }

    /// `true` once a device flow has completed for this credential.
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.github_access_token
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }
}

fn string_attr(bag: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match bag.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(GateError::BadRequest(format!(
            "credential attribute `{key}` must be a string, got {}",
            type_name(other)
        ))),
    }
}

fn u64_attr(bag: &Map<String, Value>, key: &str) -> Result<Option<u64>> {
    match bag.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
            GateError::BadRequest(format!(
                "credential attribute `{key}` must be a non-negative integer, got {n}"
            ))
        }),
        Some(other) => Err(GateError::BadRequest(format!(
            "credential attribute `{key}` must be a non-negative integer, got {}",
            type_name(other)
        ))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_parse_empty_bag() {
        let a = CredentialAttributes::parse(&Map::new()).unwrap();
        assert_eq!(a, CredentialAttributes::default());
        assert!(!a.is_authorized());
    }

    #[test]
    fn test_parse_authorized() {
        let a = CredentialAttributes::parse(&bag(json!({
            "githubAccessToken": "gho_abc",
            "tokenType": "bearer",
            "tokenScope": "read:user",
            "receivedAt": 1_700_000_000u64,
            "unrelated": [1, 2, 3],
        })))
        .unwrap();
        assert!(a.is_authorized());
        assert_eq!(a.github_access_token.as_deref(), Some("gho_abc"));
        assert_eq!(a.received_at, Some(1_700_000_000));
    }

    #[test]
    fn test_parse_null_is_absent() {
        let a = CredentialAttributes::parse(&bag(json!({"clientId": null}))).unwrap();
        assert!(a.client_id.is_none());
    }

    #[test]
    fn test_parse_rejects_string_timestamp() {
        let err = CredentialAttributes::parse(&bag(json!({"copilotTokenExpiresAt": "1700000000"})))
            .unwrap_err();
        assert!(matches!(err, GateError::BadRequest(_)));
        assert!(err.to_string().contains("copilotTokenExpiresAt"));
    }

    #[test]
    fn test_parse_rejects_numeric_client_id() {
        let err = CredentialAttributes::parse(&bag(json!({"clientId": 42}))).unwrap_err();
        assert!(err.to_string().contains("clientId"));
    }

    #[test]
    fn test_parse_rejects_negative_timestamp() {
        let err = CredentialAttributes::parse(&bag(json!({"receivedAt": -1}))).unwrap_err();
        assert!(err.to_string().contains("receivedAt"));
    }

    #[test]
    fn test_merge_overwrites_and_removes() {
        let mut c = Credential::new("cred-1", "work")
            .with_attribute(attr::CLIENT_ID, "Iv1.custom")
            .with_attribute(attr::COPILOT_TOKEN, "stale");
        c.merge(bag(json!({
            "githubAccessToken": "gho_new",
            "copilotToken": null,
        })));
        assert_eq!(c.attributes["clientId"], "Iv1.custom");
        assert_eq!(c.attributes["githubAccessToken"], "gho_new");
        assert!(!c.attributes.contains_key("copilotToken"));
    }
}
