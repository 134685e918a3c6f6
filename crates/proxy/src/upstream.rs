//! Copilot API plumbing shared by the chat and model handlers.

use axum::http::HeaderMap;
use ghgate_auth::copilot::{EDITOR_VERSION, PLUGIN_VERSION, USER_AGENT};
use ghgate_types::{CopilotToken, GateError, traits::Result};
use rquest::RequestBuilder;

use crate::AppState;

/// Request header naming a stored credential.
pub const CREDENTIAL_HEADER: &str = "x-credential-id";

const INTEGRATION_ID: &str = "vscode-chat";
const OPENAI_INTENT: &str = "conversation-panel";
const GITHUB_API_VERSION: &str = "2025-04-01";

/// Resolve the Copilot token for an incoming request.
///
/// Order: `x-credential-id`, then `Authorization: Bearer <github token>`,
/// then `copilot.default_credential` from config.
pub async fn resolve_token(state: &AppState, headers: &HeaderMap) -> Result<CopilotToken> {
    if let Some(id) = header_str(headers, CREDENTIAL_HEADER) {
        return state.copilot.copilot_token(id).await;
    }
    if let Some(token) = header_str(headers, "authorization")
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return state.copilot.copilot_token_for_access_token(token).await;
    }
    let default = state.config.load().copilot.default_credential.clone();
    match default {
        Some(id) if !id.is_empty() => state.copilot.copilot_token(&id).await,
        _ => Err(GateError::Auth(format!(
            "no credential: send {CREDENTIAL_HEADER} or a GitHub token as Bearer"
        ))),
    }
}

/// Base URL for Copilot API calls made with `token`.
pub fn api_base(state: &AppState, token: &CopilotToken) -> String {
    token.api_endpoint.clone().unwrap_or_else(|| {
        state
            .config
            .load()
            .copilot
            .api_base_url
            .trim_end_matches('/')
            .to_string()
    })
}

/// Attach the headers the Copilot API expects from an editor client.
pub fn copilot_headers(builder: RequestBuilder, token: &CopilotToken) -> RequestBuilder {
    builder
        .header("authorization", format!("Bearer {}", token.token))
        .header("user-agent", USER_AGENT)
        .header("editor-version", EDITOR_VERSION)
        .header("editor-plugin-version", PLUGIN_VERSION)
        .header("openai-intent", OPENAI_INTENT)
        .header("copilot-integration-id", INTEGRATION_ID)
        .header("x-github-api-version", GITHUB_API_VERSION)
}

/// Send `builder`, turning non-2xx responses into [`GateError::Upstream`].
pub async fn send(builder: RequestBuilder) -> Result<rquest::Response> {
    let resp = builder.send().await?;
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        let text = resp.text().await.unwrap_or_default();
        Err(GateError::upstream(status.as_u16(), text))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
