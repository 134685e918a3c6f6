//! GitHub token → Copilot API token exchange.
//!
//! A GitHub OAuth token is long-lived; the Copilot API only accepts the
//! short-lived token returned by `copilot_internal/v2/token`. Tokens are
//! looked up in three places, cheapest first: the in-memory [`TokenCache`],
//! the credential's persisted copy, and finally the exchange endpoint.

use ghgate_types::{
    CachedToken, CopilotToken, CredentialAttributes, CredentialStore, GateError, TokenSource,
    attr, normalize_expiry, traits::Result, unix_now,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::{
    TokenCache,
    cache::{access_token_key, credential_key},
};

// Header values matching the VS Code Copilot Chat extension.
pub const USER_AGENT: &str = "GitHubCopilotChat/0.35.0";
pub const EDITOR_VERSION: &str = "vscode/1.107.0";
pub const PLUGIN_VERSION: &str = "copilot-chat/0.35.0";

/// Lifetime assumed when the exchange response carries no `expires_at`.
const DEFAULT_TTL_SECS: u64 = 1500;

/// Exchanges GitHub access tokens for Copilot API tokens.
pub struct CopilotTokenExchanger {
    http: rquest::Client,
    cache: Arc<TokenCache>,
    token_url: String,
}

impl CopilotTokenExchanger {
    pub fn new(http: rquest::Client, cache: Arc<TokenCache>, token_url: impl Into<String>) -> Self {
        Self {
            http,
            cache,
            token_url: token_url.into(),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// Obtain a Copilot token for `github_token`, reusing cached or persisted
    /// tokens while they are fresh.
    ///
    /// `snapshot` is the credential's current attributes, used to recover a
    /// token persisted by an earlier process. A recovered token seeds the
    /// cache.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Upstream`] if the exchange endpoint answers
    /// non-2xx or without a `token`, and [`GateError::Http`] on transport
    /// failure. Nothing is retried.
    pub async fn downstream_token(
        &self,
        cache_key: &str,
        github_token: &str,
        snapshot: Option<&CredentialAttributes>,
    ) -> Result<CopilotToken> {
        if let Some(cached) = self.cache.get(cache_key) {
            tracing::debug!(cache_key = %redact(cache_key), "copilot token cache hit");
            return Ok(CopilotToken::from_cached(cached, TokenSource::Cache));
        }

        if let Some(persisted) = snapshot.and_then(persisted_token)
            && persisted.is_fresh_at(unix_now(), self.cache.refresh_buffer_secs())
        {
            tracing::debug!(cache_key = %redact(cache_key), "copilot token restored from credential");
            self.cache.put(cache_key, persisted.clone());
            return Ok(CopilotToken::from_cached(persisted, TokenSource::Credential));
        }

        let fresh = self.exchange(github_token).await?;
        tracing::debug!(
            cache_key = %redact(cache_key),
            expires_at = fresh.expires_at,
            "copilot token exchanged"
        );
        self.cache.put(cache_key, fresh.clone());
        Ok(CopilotToken::from_cached(fresh, TokenSource::Exchange))
    }

    async fn exchange(&self, github_token: &str) -> Result<CachedToken> {
        let resp = self
            .http
            .get(&self.token_url)
            .header("authorization", format!("token {github_token}"))
            .header("accept", "application/json")
            .header("user-agent", USER_AGENT)
            .header("editor-version", EDITOR_VERSION)
            .header("editor-plugin-version", PLUGIN_VERSION)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;
        if !(200..300).contains(&status) {
            return Err(GateError::upstream(status, body));
        }
        parse_exchange_response(status, &body, unix_now())
    }
}

/// Parse a token exchange response evaluated at `now`.
///
/// # Errors
///
/// Returns [`GateError::Upstream`] if the body is not JSON or lacks `token`.
pub fn parse_exchange_response(status: u16, body: &str, now: u64) -> Result<CachedToken> {
    let json: Value = serde_json::from_str(body).map_err(|_| GateError::upstream(status, body))?;

    let token = json
        .get("token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GateError::upstream(status, body))?
        .to_string();

    let expires_at = match json.get("expires_at").and_then(Value::as_i64) {
        Some(raw) if raw > 0 => normalize_expiry(raw),
        _ => now + DEFAULT_TTL_SECS,
    };

    let api_endpoint = json
        .pointer("/endpoints/api")
        .and_then(Value::as_str)
        .map(|s| s.trim_end_matches('/').to_string());

    Ok(CachedToken {
        token,
        expires_at,
        api_endpoint,
    })
}

fn persisted_token(attrs: &CredentialAttributes) -> Option<CachedToken> {
    Some(CachedToken {
        token: attrs.copilot_token.clone().filter(|t| !t.is_empty())?,
        expires_at: attrs.copilot_token_expires_at?,
        api_endpoint: attrs.copilot_api_endpoint.clone(),
    })
}

/// Cache keys may be raw access tokens; only log a prefix.
fn redact(key: &str) -> String {
    let prefix: String = key.chars().take(8).collect();
    if prefix.len() < key.len() {
        format!("{prefix}…")
    } else {
        prefix
    }
}

/// Credential-aware Copilot token acquisition.
pub struct CopilotAuth {
    store: Arc<dyn CredentialStore>,
    exchanger: CopilotTokenExchanger,
}

impl CopilotAuth {
    pub fn new(store: Arc<dyn CredentialStore>, exchanger: CopilotTokenExchanger) -> Self {
        Self { store, exchanger }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<TokenCache> {
        self.exchanger.cache()
    }

    /// Copilot token for a stored, authorized credential.
    ///
    /// A token obtained from the exchange endpoint is written back to the
    /// credential so a restarted process can reuse it.
    ///
    /// # Errors
    ///
    /// [`GateError::NotFound`] for an unknown credential, [`GateError::Auth`]
    /// if the device flow has not completed for it, [`GateError::BadRequest`]
    /// for malformed stored attributes, plus any exchange error.
    pub async fn copilot_token(&self, credential_id: &str) -> Result<CopilotToken> {
        let credential = self
            .store
            .get(credential_id)
            .await?
            .ok_or_else(|| GateError::NotFound(credential_id.to_string()))?;
        let attrs = credential.typed()?;
        let github_token = attrs
            .github_access_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                GateError::Auth(format!(
                    "credential {credential_id} has not completed device authorization"
                ))
            })?;

        let token = self
            .exchanger
            .downstream_token(&credential_key(credential_id), &github_token, Some(&attrs))
            .await?;

        if token.source == TokenSource::Exchange
            && let Err(e) = self
                .store
                .merge_attributes(credential_id, persist_patch(&token))
                .await
        {
            tracing::warn!(credential_id, error = %e, "failed to persist copilot token");
        }
        Ok(token)
    }

    /// Copilot token for a raw GitHub access token; nothing is persisted.
    ///
    /// # Errors
    ///
    /// Any exchange error.
    pub async fn copilot_token_for_access_token(&self, github_token: &str) -> Result<CopilotToken> {
        self.exchanger
            .downstream_token(&access_token_key(github_token), github_token, None)
            .await
    }
}

fn persist_patch(token: &CopilotToken) -> Map<String, Value> {
    let mut patch = Map::new();
    patch.insert(attr::COPILOT_TOKEN.into(), json!(token.token));
    patch.insert(attr::COPILOT_TOKEN_EXPIRES_AT.into(), json!(token.expires_at));
    patch.insert(
        attr::COPILOT_API_ENDPOINT.into(),
        token.api_endpoint.clone().map_or(Value::Null, Value::String),
    );
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghgate_store::InMemoryCredentialStore;
    use ghgate_types::Credential;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    const EXCHANGE_PATH: &str = "/copilot_internal/v2/token";

    fn exchanger(server: &MockServer) -> CopilotTokenExchanger {
        CopilotTokenExchanger::new(
            rquest::Client::new(),
            Arc::new(TokenCache::default()),
            format!("{}{EXCHANGE_PATH}", server.uri()),
        )
    }

    async fn mount_exchange(server: &MockServer, github_token: &str, copilot_token: &str, n: u64) {
        Mock::given(method("GET"))
            .and(path(EXCHANGE_PATH))
            .and(header("authorization", format!("token {github_token}").as_str()))
            .and(header("editor-version", EDITOR_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": copilot_token,
                "expires_at": unix_now() + 1800,
                "endpoints": {"api": "https://api.individual.githubcopilot.com/"}
            })))
            .expect(n)
            .mount(server)
            .await;
    }

    #[test]
    fn test_parse_exchange_seconds() {
        let t = parse_exchange_response(200, r#"{"token":"tid=1","expires_at":1893456000}"#, 0)
            .unwrap();
        assert_eq!(t.token, "tid=1");
        assert_eq!(t.expires_at, 1_893_456_000);
        assert!(t.api_endpoint.is_none());
    }

    #[test]
    fn test_parse_exchange_millis() {
        let t = parse_exchange_response(200, r#"{"token":"tid=1","expires_at":1893456000000}"#, 0)
            .unwrap();
        assert_eq!(t.expires_at, 1_893_456_000);
    }

    #[test]
    fn test_parse_exchange_default_ttl() {
        let t = parse_exchange_response(200, r#"{"token":"tid=1"}"#, 1_000).unwrap();
        assert_eq!(t.expires_at, 1_000 + DEFAULT_TTL_SECS);
    }

    #[test]
    fn test_parse_exchange_endpoint_trimmed() {
        let t = parse_exchange_response(
            200,
            r#"{"token":"t","expires_at":5,"endpoints":{"api":"https://api.example.com/"}}"#,
            0,
        )
        .unwrap();
        assert_eq!(t.api_endpoint.as_deref(), Some("https://api.example.com"));
    }

    #[test]
    fn test_parse_exchange_missing_token() {
        let err = parse_exchange_response(200, r#"{"expires_at":5}"#, 0).unwrap_err();
        assert!(matches!(err, GateError::Upstream { status: 200, .. }));
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("cred-1"), "cred-1");
        assert_eq!(redact("gho_0123456789"), "gho_0123…");
    }

    #[tokio::test]
    async fn test_exchange_then_cache_hit() {
        let server = MockServer::start().await;
        mount_exchange(&server, "gho_a", "tid=a", 1).await;
        let ex = exchanger(&server);

        let first = ex.downstream_token("cred-1", "gho_a", None).await.unwrap();
        assert_eq!(first.token, "tid=a");
        assert_eq!(first.source, TokenSource::Exchange);
        assert_eq!(
            first.api_endpoint.as_deref(),
            Some("https://api.individual.githubcopilot.com")
        );

        let second = ex.downstream_token("cred-1", "gho_a", None).await.unwrap();
        assert_eq!(second.token, "tid=a");
        assert_eq!(second.source, TokenSource::Cache);
    }

    #[tokio::test]
    async fn test_fresh_snapshot_skips_exchange_and_seeds_cache() {
        let server = MockServer::start().await;
        mount_exchange(&server, "gho_a", "tid=unused", 0).await;
        let ex = exchanger(&server);

        let snapshot = CredentialAttributes {
            copilot_token: Some("tid=persisted".into()),
            copilot_token_expires_at: Some(unix_now() + 3600),
            ..Default::default()
        };
        let t = ex
            .downstream_token("cred-1", "gho_a", Some(&snapshot))
            .await
            .unwrap();
        assert_eq!(t.token, "tid=persisted");
        assert_eq!(t.source, TokenSource::Credential);
        assert_eq!(ex.cache().get("cred-1").unwrap().token, "tid=persisted");
    }

    #[tokio::test]
    async fn test_stale_snapshot_exchanges() {
        let server = MockServer::start().await;
        mount_exchange(&server, "gho_a", "tid=new", 1).await;
        let ex = exchanger(&server);

        let snapshot = CredentialAttributes {
            copilot_token: Some("tid=old".into()),
            copilot_token_expires_at: Some(unix_now() + 60),
            ..Default::default()
        };
        let t = ex
            .downstream_token("cred-1", "gho_a", Some(&snapshot))
            .await
            .unwrap();
        assert_eq!(t.token, "tid=new");
        assert_eq!(t.source, TokenSource::Exchange);
    }

    #[tokio::test]
    async fn test_exchange_upstream_error_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(EXCHANGE_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
            .mount(&server)
            .await;
        let ex = exchanger(&server);

        let err = ex.downstream_token("k", "gho_bad", None).await.unwrap_err();
        let GateError::Upstream { status, body } = err else {
            panic!("expected Upstream, got {err:?}");
        };
        assert_eq!(status, 401);
        assert_eq!(body, "Bad credentials");
        assert!(ex.cache().is_empty());
    }

    #[tokio::test]
    async fn test_copilot_auth_persists_exchanged_token() {
        let server = MockServer::start().await;
        mount_exchange(&server, "gho_a", "tid=a", 1).await;
        let cred = Credential::new("cred-1", "").with_attribute(attr::GITHUB_ACCESS_TOKEN, "gho_a");
        let store = Arc::new(InMemoryCredentialStore::with_credentials([cred]));
        let auth = CopilotAuth::new(store.clone(), exchanger(&server));

        let t = auth.copilot_token("cred-1").await.unwrap();
        assert_eq!(t.token, "tid=a");

        let stored = store.get("cred-1").await.unwrap().unwrap().typed().unwrap();
        assert_eq!(stored.copilot_token.as_deref(), Some("tid=a"));
        assert_eq!(stored.copilot_token_expires_at, Some(t.expires_at));
        assert_eq!(
            stored.copilot_api_endpoint.as_deref(),
            Some("https://api.individual.githubcopilot.com")
        );
    }

    #[tokio::test]
    async fn test_copilot_auth_cold_cache_uses_persisted_token() {
        let server = MockServer::start().await;
        mount_exchange(&server, "gho_a", "tid=unused", 0).await;
        let cred = Credential::new("cred-1", "")
            .with_attribute(attr::GITHUB_ACCESS_TOKEN, "gho_a")
            .with_attribute(attr::COPILOT_TOKEN, "tid=from-disk")
            .with_attribute(attr::COPILOT_TOKEN_EXPIRES_AT, unix_now() + 3600);
        let store = Arc::new(InMemoryCredentialStore::with_credentials([cred]));
        let auth = CopilotAuth::new(store, exchanger(&server));

        let t = auth.copilot_token("cred-1").await.unwrap();
        assert_eq!(t.token, "tid=from-disk");
        assert_eq!(t.source, TokenSource::Credential);
    }

    #[tokio::test]
    async fn test_copilot_auth_unknown_credential() {
        let server = MockServer::start().await;
        let auth = CopilotAuth::new(Arc::new(InMemoryCredentialStore::new()), exchanger(&server));
        let err = auth.copilot_token("ghost").await.unwrap_err();
        assert!(matches!(err, GateError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_copilot_auth_unauthorized_credential() {
        let server = MockServer::start().await;
        let cred = Credential::new("cred-1", "");
        let store = Arc::new(InMemoryCredentialStore::with_credentials([cred]));
        let auth = CopilotAuth::new(store, exchanger(&server));
        let err = auth.copilot_token("cred-1").await.unwrap_err();
        assert!(matches!(err, GateError::Auth(_)));
    }

    #[tokio::test]
    async fn test_raw_access_token_keyed_by_token() {
        let server = MockServer::start().await;
        mount_exchange(&server, "gho_raw", "tid=raw", 1).await;
        let auth = CopilotAuth::new(Arc::new(InMemoryCredentialStore::new()), exchanger(&server));

        auth.copilot_token_for_access_token("gho_raw").await.unwrap();
        let again = auth.copilot_token_for_access_token("gho_raw").await.unwrap();
        assert_eq!(again.source, TokenSource::Cache);
        assert!(auth.cache().get(&access_token_key("gho_raw")).is_some());
        assert!(auth.cache().get("gho_raw").is_none());
    }

    #[tokio::test]
    async fn test_bearer_credential_id_does_not_reuse_credential_token() {
        let server = MockServer::start().await;
        mount_exchange(&server, "gho_a", "tid=cred", 1).await;
        mount_exchange(&server, "cred-1", "tid=bearer", 1).await;
        let cred = Credential::new("cred-1", "").with_attribute(attr::GITHUB_ACCESS_TOKEN, "gho_a");
        let store = Arc::new(InMemoryCredentialStore::with_credentials([cred]));
        let auth = CopilotAuth::new(store, exchanger(&server));

        let by_id = auth.copilot_token("cred-1").await.unwrap();
        assert_eq!(by_id.token, "tid=cred");
        assert!(auth.cache().get(&credential_key("cred-1")).is_some());

        let by_bearer = auth.copilot_token_for_access_token("cred-1").await.unwrap();
        assert_eq!(by_bearer.source, TokenSource::Exchange);
        assert_eq!(by_bearer.token, "tid=bearer");
    }
}
