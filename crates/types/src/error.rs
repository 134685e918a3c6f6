//! Unified error type for the ghgate workspace.

use thiserror::Error;

/// Enumerates all error kinds that can occur across ghgate crates.
#[derive(Debug, Error)]
pub enum GateError {
    /// The referenced credential does not exist.
    #[error("credential not found: {0}")]
    NotFound(String),

    /// Missing required input or unresolvable configuration.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The upstream OAuth or token endpoint returned a non-success status or
    /// a body that could not be interpreted.
    #[error("upstream error: status={status}, body={body}")]
    Upstream { status: u16, body: String },

    /// The authorization server ended the device flow with a terminal error
    /// (`access_denied`, `expired_token`, ...). The flow must be restarted.
    #[error("device flow denied: {code}")]
    Denied {
        code: String,
        description: Option<String>,
    },

    /// The credential exists but cannot be used to authenticate.
    #[error("authentication error: {0}")]
    Auth(String),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(String),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persistent storage (`SQLite`) error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Anything else; the message is kept for operators.
    #[error("internal error: {0}")]
    Internal(String),
}

// ── Feature-gated From impls ──────────────────────────────────────────────────

#[cfg(feature = "rquest")]
impl From<rquest::Error> for GateError {
    fn from(e: rquest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for GateError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl GateError {
    /// Build an [`GateError::Upstream`] from a status code and body text.
    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            body: body.into(),
        }
    }

    /// Returns `true` if the error is caused by the caller rather than by
    /// this service or an upstream.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::BadRequest(_) | Self::Denied { .. }
        )
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = GateError::NotFound("cred-1".into());
        assert_eq!(err.to_string(), "credential not found: cred-1");
    }

    #[test]
    fn test_error_display_upstream() {
        let err = GateError::upstream(502, "bad gateway");
        let s = err.to_string();
        assert!(s.contains("502"));
        assert!(s.contains("bad gateway"));
    }

    #[test]
    fn test_error_display_denied() {
        let err = GateError::Denied {
            code: "access_denied".into(),
            description: Some("The user denied access".into()),
        };
        assert_eq!(err.to_string(), "device flow denied: access_denied");
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid {{{").unwrap_err();
        let err: GateError = json_err.into();
        assert!(matches!(err, GateError::Serialization(_)));
    }

    #[test]
    fn test_is_client_error() {
        assert!(GateError::NotFound("x".into()).is_client_error());
        assert!(GateError::BadRequest("x".into()).is_client_error());
        assert!(
            GateError::Denied {
                code: "expired_token".into(),
                description: None
            }
            .is_client_error()
        );
        assert!(!GateError::upstream(500, "").is_client_error());
        assert!(!GateError::Http("connection refused".into()).is_client_error());
        assert!(!GateError::Internal("boom".into()).is_client_error());
    }
}
