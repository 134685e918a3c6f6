//! Device flow HTTP endpoints.

use axum::{
    Json,
    extract::{Path, State},
};
use bytes::Bytes;
use ghgate_auth::DeviceFlowStatus;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::{AppState, error::DeviceError};

/// Handles `POST /device/{credential_id}`.
///
/// # Errors
///
/// 404 for an unknown credential, 400 for unresolvable OAuth settings, 500
/// for upstream or transport failures.
pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(credential_id): Path<String>,
) -> Result<Json<Value>, DeviceError> {
    let started = state.device.start(&credential_id).await?;
    let auth = started.authorization;
    Ok(Json(json!({
        "success": true,
        "credentialId": started.credential_id,
        "device_code": auth.device_code,
        "user_code": auth.user_code,
        "verification_uri": auth.verification_uri,
        "expires_in": auth.expires_in,
        "interval": auth.interval,
    })))
}

/// Handles `POST /device/poll/{credential_id}` with body `{"deviceCode": ...}`.
///
/// The body is read leniently: an empty or non-JSON body is treated as a
/// missing device code.
///
/// # Errors
///
/// 400 for a missing device code or a terminal authorization error, 404 for
/// an unknown credential, 500 otherwise.
pub async fn poll(
    State(state): State<Arc<AppState>>,
    Path(credential_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, DeviceError> {
    let device_code = device_code_from_body(&body).unwrap_or_default();
    let status = state.device.poll(&credential_id, &device_code).await?;
    Ok(Json(match status {
        DeviceFlowStatus::Authorized { credential_id } => json!({
            "success": true,
            "status": "authorized",
            "credentialId": credential_id,
        }),
        DeviceFlowStatus::Pending {
            reason,
            description,
            interval,
        } => {
            let mut body = json!({
                "success": false,
                "status": reason.as_str(),
                "error_description": description,
            });
            if let Some(secs) = interval {
                body["interval"] = json!(secs);
            }
            body
        }
    }))
}

fn device_code_from_body(body: &[u8]) -> Option<String> {
    let json: Value = serde_json::from_slice(body).ok()?;
    json.get("deviceCode")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_code_from_body() {
        assert_eq!(
            device_code_from_body(br#"{"deviceCode":"dc-1"}"#).as_deref(),
            Some("dc-1")
        );
        assert_eq!(device_code_from_body(b""), None);
        assert_eq!(device_code_from_body(b"deviceCode=dc-1"), None);
        assert_eq!(device_code_from_body(br#"{"device_code":"dc-1"}"#), None);
        assert_eq!(device_code_from_body(br#"{"deviceCode":42}"#), None);
    }
}
