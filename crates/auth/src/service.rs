//! Device flow orchestration against stored credentials.
//!
//! The service is stateless between calls: the device code lives with the
//! caller, which decides when to poll and when to give up.

use arc_swap::ArcSwap;
use ghgate_config::{Config, OAuthSettings};
use ghgate_types::{
    CredentialStore, DeviceAuthorization, GateError, PendingReason, attr, traits::Result, unix_now,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::{DeviceFlowClient, PollOutcome, TokenCache, cache::credential_key};

/// A started device flow.
#[derive(Debug, Clone)]
pub struct DeviceFlowStart {
    pub credential_id: String,
    pub authorization: DeviceAuthorization,
}

/// Non-terminal or successful poll results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFlowStatus {
    /// The GitHub token has been stored on the credential.
    Authorized { credential_id: String },
    /// Keep polling.
    Pending {
        reason: PendingReason,
        description: Option<String>,
        interval: Option<u64>,
    },
}

/// Runs the device flow for a credential and persists the resulting token.
pub struct DeviceFlowService {
    store: Arc<dyn CredentialStore>,
    client: DeviceFlowClient,
    cache: Arc<TokenCache>,
    config: Arc<ArcSwap<Config>>,
}

impl DeviceFlowService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        client: DeviceFlowClient,
        cache: Arc<TokenCache>,
        config: Arc<ArcSwap<Config>>,
    ) -> Self {
        Self {
            store,
            client,
            cache,
            config,
        }
    }

    /// Begin a device flow for `credential_id`.
    ///
    /// # Errors
    ///
    /// [`GateError::NotFound`] for an unknown credential,
    /// [`GateError::BadRequest`] if no client id resolves, and upstream or
    /// transport errors from the device code request.
    pub async fn start(&self, credential_id: &str) -> Result<DeviceFlowStart> {
        let settings = self.settings_for(credential_id).await?;
        let authorization = self.client.request_device_code(&settings).await?;
        tracing::info!(
            credential_id,
            client_id = %settings.client_id,
            scope = %settings.scope,
            expires_in = authorization.expires_in,
            "device flow started"
        );
        Ok(DeviceFlowStart {
            credential_id: credential_id.to_string(),
            authorization,
        })
    }

    /// Poll once for `device_code`.
    ///
    /// On success the GitHub token is merged into the credential and any
    /// Copilot token derived from a previous GitHub token is discarded.
    ///
    /// # Errors
    ///
    /// [`GateError::BadRequest`] for a blank `device_code` (no upstream call
    /// is made), [`GateError::NotFound`] for an unknown credential,
    /// [`GateError::Denied`] when the authorization server ends the flow,
    /// plus upstream, transport, and storage errors.
    pub async fn poll(&self, credential_id: &str, device_code: &str) -> Result<DeviceFlowStatus> {
        let device_code = device_code.trim();
        if device_code.is_empty() {
            return Err(GateError::BadRequest("deviceCode is required".into()));
        }
        let settings = self.settings_for(credential_id).await?;

        match self.client.poll_access_token(&settings, device_code).await? {
            PollOutcome::Authorized(token) => {
                let patch = authorized_patch(
                    token.access_token,
                    token.token_type,
                    token.scope,
                    unix_now(),
                );
                self.store.merge_attributes(credential_id, patch).await?;
                self.cache.remove(&credential_key(credential_id));
                tracing::info!(credential_id, "device flow authorized");
                Ok(DeviceFlowStatus::Authorized {
                    credential_id: credential_id.to_string(),
                })
            }
            PollOutcome::Pending {
                reason,
                description,
                interval,
            } => {
                tracing::debug!(credential_id, %reason, "device flow pending");
                Ok(DeviceFlowStatus::Pending {
                    reason,
                    description,
                    interval,
                })
            }
            PollOutcome::Denied { error, description } => {
                tracing::warn!(credential_id, error = %error, "device flow denied");
                Err(GateError::Denied {
                    code: error,
                    description,
                })
            }
        }
    }

    async fn settings_for(&self, credential_id: &str) -> Result<OAuthSettings> {
        let credential = self
            .store
            .get(credential_id)
            .await?
            .ok_or_else(|| GateError::NotFound(credential_id.to_string()))?;
        let attrs = credential.typed()?;
        let config = self.config.load();
        OAuthSettings::resolve(&attrs, &config.github)
    }
}

fn authorized_patch(
    access_token: String,
    token_type: Option<String>,
    scope: Option<String>,
    received_at: u64,
) -> Map<String, Value> {
    let mut patch = Map::new();
    patch.insert(attr::GITHUB_ACCESS_TOKEN.into(), Value::String(access_token));
    patch.insert(attr::TOKEN_TYPE.into(), token_type.map_or(Value::Null, Value::String));
    patch.insert(attr::TOKEN_SCOPE.into(), scope.map_or(Value::Null, Value::String));
    patch.insert(attr::RECEIVED_AT.into(), json!(received_at));
    patch.insert(attr::COPILOT_TOKEN.into(), Value::Null);
    patch.insert(attr::COPILOT_TOKEN_EXPIRES_AT.into(), Value::Null);
    patch.insert(attr::COPILOT_API_ENDPOINT.into(), Value::Null);
    patch
}
