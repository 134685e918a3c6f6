//! Per-credential OAuth settings resolution.
//!
//! Precedence for every field: credential attribute → configuration
//! (`GHGATE_*` environment > YAML file) → built-in default. Blank credential
//! values count as unset.

use crate::schema::{DEFAULT_SCOPE, GithubConfig};
use ghgate_types::{CredentialAttributes, GateError, error::Result};

/// Fully resolved settings for one device flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSettings {
    pub client_id: String,
    pub scope: String,
    pub device_code_url: String,
    pub token_url: String,
}

impl OAuthSettings {
    /// Resolve settings for a credential against the process configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::BadRequest`] if no client id resolves, the client
    /// id contains whitespace, or an endpoint is not an `http(s)` URL.
    pub fn resolve(attrs: &CredentialAttributes, github: &GithubConfig) -> Result<Self> {
        let client_id = pick(attrs.client_id.as_deref(), &github.client_id);
        if client_id.is_empty() {
            return Err(GateError::BadRequest(
                "no GitHub OAuth client id configured for this credential".into(),
            ));
        }
        if client_id.chars().any(char::is_whitespace) {
            return Err(GateError::BadRequest(format!(
                "malformed GitHub OAuth client id: {client_id:?}"
            )));
        }

        let mut scope = pick(attrs.scope.as_deref(), &github.scope);
        if scope.is_empty() {
            scope = DEFAULT_SCOPE.to_string();
        }

        let device_code_url = pick(attrs.device_code_url.as_deref(), &github.device_code_url);
        let token_url = pick(attrs.token_url.as_deref(), &github.token_url);
        check_url("device code endpoint", &device_code_url)?;
        check_url("token endpoint", &token_url)?;

        Ok(Self {
            client_id,
            scope,
            device_code_url,
            token_url,
        })
    }
}

fn pick(credential: Option<&str>, configured: &str) -> String {
    credential
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| configured.trim())
        .to_string()
}

fn check_url(what: &str, url: &str) -> Result<()> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(GateError::BadRequest(format!(
            "{what} must be an http(s) URL, got {url:?}"
        )))
    }
}
