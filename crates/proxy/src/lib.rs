//! HTTP layer: axum router, route handlers, and error mapping.
//!
//! Exposes the device flow endpoints used to authorize stored credentials,
//! plus an OpenAI-compatible `/v1/chat/completions` and `/v1/models` backed
//! by the Copilot API.

mod chat;
mod device;
mod error;
mod models;
mod upstream;

pub use error::{ApiError, DeviceError};
pub use models::extract_model_ids;
pub use upstream::CREDENTIAL_HEADER;

use arc_swap::ArcSwap;
use axum::{
    Json, Router,
    routing::{get, post},
};
use ghgate_auth::{
    CopilotAuth, CopilotTokenExchanger, DeviceFlowClient, DeviceFlowService, TokenCache,
    http::build_http_client,
};
use ghgate_config::Config;
use ghgate_types::CredentialStore;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state passed to all route handlers.
pub struct AppState {
    /// Server configuration. Atomically swappable for hot-reloading.
    pub config: Arc<ArcSwap<Config>>,
    /// HTTP client for upstream requests.
    pub http: rquest::Client,
    pub device: DeviceFlowService,
    pub copilot: CopilotAuth,
}

impl AppState {
    /// Creates a new shared application state wrapped in an `Arc`.
    ///
    /// The HTTP client, token cache buffer, and exchange URL are taken from
    /// the configuration at construction time; OAuth settings are re-read on
    /// every device flow call.
    pub fn new(config: Arc<ArcSwap<Config>>, store: Arc<dyn CredentialStore>) -> Arc<Self> {
        let snapshot = config.load();
        let http = build_http_client(&snapshot.http);
        let cache = Arc::new(TokenCache::new(snapshot.copilot.refresh_buffer_secs));

        let device = DeviceFlowService::new(
            store.clone(),
            DeviceFlowClient::new(http.clone()),
            cache.clone(),
            config.clone(),
        );
        let copilot = CopilotAuth::new(
            store,
            CopilotTokenExchanger::new(http.clone(), cache, snapshot.copilot.token_url.clone()),
        );
        drop(snapshot);

        Arc::new(Self {
            config,
            http,
            device,
            copilot,
        })
    }
}

/// Build the full axum router.
///
/// Routes:
/// - POST /device/{credential_id}        start a device flow
/// - POST /device/poll/{credential_id}   poll a device flow
/// - POST /v1/chat/completions           OpenAI-compatible, via Copilot
/// - GET  /v1/models
/// - GET  /health
pub fn make_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/device/{credential_id}", post(device::start))
        .route("/device/poll/{credential_id}", post(device::poll))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/models", get(models::list_models))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
