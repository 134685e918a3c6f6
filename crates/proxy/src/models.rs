//! Models listing handler, returns Copilot models in `OpenAI` format.

use axum::{Json, extract::State, http::HeaderMap};
use ghgate_types::{GateError, traits::Result};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::{AppState, error::ApiError, upstream};

type Strategy = fn(&Value) -> Option<&Vec<Value>>;

/// Payload shapes seen from the models endpoint, tried in order.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("array", Value::as_array),
    ("data", data_field),
    ("models", models_field),
];

fn data_field(v: &Value) -> Option<&Vec<Value>> {
    v.get("data").and_then(Value::as_array)
}

fn models_field(v: &Value) -> Option<&Vec<Value>> {
    v.get("models").and_then(Value::as_array)
}

/// Handles `GET /v1/models`.
///
/// # Errors
///
/// Returns [`ApiError`] when the upstream list cannot be obtained and
/// `models.fallback_on_error` is off.
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> std::result::Result<Json<Value>, ApiError> {
    let ids = match fetch_model_ids(&state, &headers).await {
        Ok(ids) => ids,
        Err(e) => {
            let config = state.config.load();
            if !config.models.fallback_on_error {
                return Err(e.into());
            }
            tracing::warn!(error = %e, "model listing failed, serving fallback list");
            config.models.fallback.clone()
        }
    };

    let data: Vec<Value> = ids
        .into_iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": 0,
                "owned_by": "github-copilot",
            })
        })
        .collect();

    Ok(Json(json!({
        "object": "list",
        "data": data,
    })))
}

async fn fetch_model_ids(state: &AppState, headers: &HeaderMap) -> Result<Vec<String>> {
    let token = upstream::resolve_token(state, headers).await?;
    let url = format!("{}/models", upstream::api_base(state, &token));
    let resp = upstream::send(upstream::copilot_headers(state.http.get(&url), &token)).await?;
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    let payload: Value =
        serde_json::from_str(&text).map_err(|_| GateError::upstream(status, text.clone()))?;
    extract_model_ids(&payload).ok_or_else(|| GateError::upstream(status, text))
}

/// Pull model ids out of a models payload.
///
/// The first strategy that finds an array wins. Items may be plain strings or
/// objects with `id` (or `name`); anything else is skipped.
#[must_use]
pub fn extract_model_ids(payload: &Value) -> Option<Vec<String>> {
    let (name, items) = STRATEGIES
        .iter()
        .find_map(|(name, strategy)| strategy(payload).map(|items| (*name, items)))?;
    tracing::debug!(strategy = name, count = items.len(), "parsed models payload");

    Some(
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => obj
                    .get("id")
                    .or_else(|| obj.get("name"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .filter(|id| !id.is_empty())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_array_of_strings() {
        let ids = extract_model_ids(&json!(["gpt-4o", "claude-sonnet-4"])).unwrap();
        assert_eq!(ids, vec!["gpt-4o", "claude-sonnet-4"]);
    }

    #[test]
    fn test_data_objects() {
        let payload = json!({"object": "list", "data": [{"id": "gpt-4o"}, {"id": "o3-mini"}]});
        assert_eq!(extract_model_ids(&payload).unwrap(), vec!["gpt-4o", "o3-mini"]);
    }

    #[test]
    fn test_models_with_name_fallback() {
        let payload = json!({"models": [{"name": "gemini-2.5-pro"}, {"id": "gpt-4.1", "name": "GPT 4.1"}]});
        assert_eq!(
            extract_model_ids(&payload).unwrap(),
            vec!["gemini-2.5-pro", "gpt-4.1"]
        );
    }

    #[test]
    fn test_data_wins_over_models() {
        let payload = json!({"data": ["a"], "models": ["b"]});
        assert_eq!(extract_model_ids(&payload).unwrap(), vec!["a"]);
    }

    #[test]
    fn test_unusable_items_skipped() {
        let payload = json!([1, null, {"object": "model"}, "ok", ""]);
        assert_eq!(extract_model_ids(&payload).unwrap(), vec!["ok"]);
    }

    #[test]
    fn test_unrecognized_shape() {
        assert!(extract_model_ids(&json!({"items": ["x"]})).is_none());
        assert!(extract_model_ids(&json!("gpt-4o")).is_none());
    }
}
