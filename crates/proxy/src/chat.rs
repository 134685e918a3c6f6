//! Chat completions handler, forwarded to the Copilot API unchanged.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, header},
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt as _;
use serde_json::Value;
use std::sync::Arc;

use crate::{AppState, error::ApiError, upstream};

/// Handles `POST /v1/chat/completions`.
///
/// Returns the upstream JSON body, or the upstream SSE stream when the request
/// sets `"stream": true`.
///
/// # Errors
///
/// Returns [`ApiError`] if no Copilot token can be obtained or the upstream
/// call fails.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let token = upstream::resolve_token(&state, &headers).await?;
    let url = format!("{}/chat/completions", upstream::api_base(&state, &token));
    let stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);
    let initiator = initiator(&body);

    tracing::info!(
        model = body.get("model").and_then(Value::as_str).unwrap_or("unknown"),
        stream,
        initiator,
        "chat completion request"
    );

    let request = upstream::copilot_headers(state.http.post(&url), &token)
        .header("x-initiator", initiator)
        .json(&body);
    let resp = upstream::send(request).await?;

    if stream {
        let mapped = resp.bytes_stream().map_err(std::io::Error::other);
        Ok((
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (HeaderName::from_static("x-accel-buffering"), "no"),
            ],
            Body::from_stream(mapped),
        )
            .into_response())
    } else {
        let json: Value = resp.json().await.map_err(ghgate_types::GateError::from)?;
        Ok(Json(json).into_response())
    }
}

/// `agent` if the conversation already contains assistant or tool turns,
/// otherwise `user`.
fn initiator(body: &Value) -> &'static str {
    let is_agent = body
        .get("messages")
        .and_then(Value::as_array)
        .is_some_and(|msgs| {
            msgs.iter().any(|m| {
                matches!(
                    m.get("role").and_then(Value::as_str),
                    Some("assistant" | "tool")
                )
            })
        });
    if is_agent { "agent" } else { "user" }
}
