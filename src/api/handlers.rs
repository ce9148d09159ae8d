//! HTTP request handlers for the chat gateway.

use crate::api::disconnect::DisconnectStream;
use crate::api::models::{ChatRequest, HealthResponse, ModelsResponse};
use crate::api::streaming::{encode_stream, ndjson_response};
use crate::core::logging::REQUEST_ID;
use crate::core::{
    generate_request_id, ContextStream, GatewayConfig, GatewayError, Result, StreamCancelHandle,
};
use crate::provider::{build_http_client, ProviderKind};
use crate::services::ChatPipeline;
use arc_swap::ArcSwap;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const SERVICE_NAME: &str = "chat-gateway";

/// Shared application state.
///
/// Holds the current pipeline behind an [`ArcSwap`]: requests take a snapshot
/// when they start, a reload swaps in a pipeline built from new configuration.
pub struct AppState {
    pipeline: ArcSwap<ChatPipeline>,
}

impl AppState {
    pub fn new(config: GatewayConfig, http_client: reqwest::Client) -> Self {
        let pipeline = ChatPipeline::new(Arc::new(config), http_client);
        Self {
            pipeline: ArcSwap::from_pointee(pipeline),
        }
    }

    /// Build state from configuration, creating the provider HTTP client.
    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        let http_client = build_http_client(&config)?;
        Ok(Self::new(config, http_client))
    }

    /// Current pipeline snapshot.
    pub fn pipeline(&self) -> Arc<ChatPipeline> {
        self.pipeline.load_full()
    }

    /// Replace the configuration. In-flight streams keep the pipeline they started with.
    pub fn reload(&self, config: GatewayConfig) -> Result<()> {
        let http_client = build_http_client(&config)?;
        let pipeline = ChatPipeline::new(Arc::new(config), http_client);
        tracing::info!(
            default_model = %pipeline.config().default_model,
            models = pipeline.config().catalog.models.len(),
            "Configuration reloaded"
        );
        self.pipeline.store(Arc::new(pipeline));
        Ok(())
    }
}

/// Build the HTTP router with all endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/chat/models", get(list_models))
        .route("/api/chat/health", get(health))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Stream a chat response as NDJSON.
///
/// Only an unparsable body is rejected with an HTTP error; every other
/// failure is reported inside the stream.
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request_id = generate_request_id();

    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            tracing::warn!(
                request_id = %request_id,
                error = %rejection.body_text(),
                "Rejected chat request body"
            );
            return GatewayError::BadRequest(rejection.body_text()).into_response();
        }
    };

    let pipeline = state.pipeline();
    let cancel = StreamCancelHandle::new();

    let started = REQUEST_ID
        .scope(request_id.clone(), async {
            pipeline.start(request, cancel.clone())
        })
        .await;

    let body = encode_stream(
        started.chunks,
        pipeline.config().wire_format,
        started.thinking_active,
    );
    let body = ContextStream::new(Box::pin(body), request_id.clone());

    let mut response = ndjson_response(DisconnectStream::new(body, cancel));
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// List enabled catalog models and whether each has a usable credential.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let pipeline = state.pipeline();
    let config = pipeline.config();

    let models = config
        .catalog
        .enabled_models()
        .cloned()
        .map(|mut model| {
            let provider_ready = ProviderKind::from_tag(&model.model_type)
                .map(|kind| kind.settings(config).has_credentials())
                .unwrap_or(false);
            model.has_api_key = model.has_api_key || provider_ready;
            model
        })
        .collect();

    tracing::debug!("Listing configured models");

    Json(ModelsResponse {
        models,
        default_model: config.default_model.clone(),
    })
}

/// Health check with per-provider credential status.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let pipeline = state.pipeline();
    let config = pipeline.config();

    let available_models: BTreeMap<String, bool> = ProviderKind::ALL
        .iter()
        .map(|kind| {
            (
                kind.as_str().to_string(),
                kind.settings(config).has_credentials(),
            )
        })
        .collect();

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        default_model: config.default_model.clone(),
        available_models,
    })
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
