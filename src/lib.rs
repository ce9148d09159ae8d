//! Chat Gateway - streaming chat front end for multiple LLM providers
//!
//! Accepts a chat conversation, routes it to the provider that serves the
//! requested model (Zhipu GLM or Moonshot Kimi) and relays the provider's
//! output as newline-delimited JSON chunks.
//!
//! - **Message normalization**: every inbound message shape becomes one canonical type
//! - **Model routing**: total, case-insensitive resolution with a default provider
//! - **Reasoning channel**: separate `thinking` chunks for models that support it
//! - **Fallback stream**: a paced simulated reply when the provider is unreachable
//! - **Metrics & Monitoring**: Prometheus metrics for observability
//!
//! # Architecture
//!
//! - [`core`]: configuration, errors, logging context, metrics, cancellation
//! - [`provider`]: provider adapters and event-stream decoding
//! - [`services`]: normalizer, router, pipeline and fallback emitter
//! - [`api`]: HTTP handlers, models and NDJSON streaming
//!
//! # Configuration
//!
//! Provider credentials come from the environment:
//! - `GLM_API_KEY`: Zhipu GLM API key
//! - `MOONSHOT_API_KEY`: Moonshot Kimi API key
//!
//! Optional environment variables:
//! - `MODELS_CONFIG`: model catalog path (default: config/models.json)
//! - `DEFAULT_MODEL`: model used when a request names none
//! - `HOST` / `PORT`: server bind address (default: 0.0.0.0:8000)
//! - `GLM_BASE_URL` / `KIMI_BASE_URL`: provider endpoints
//! - `VERIFY_SSL`: verify provider certificates (default: true)
//! - `FALLBACK_TOKEN_DELAY_MS`: fallback pacing (default: 500)
//! - `WIRE_FORMAT`: `legacy` or `typed` (default: legacy)

pub mod api;
pub mod core;
pub mod provider;
pub mod services;

// Re-export commonly used types for convenience
pub use api::{build_router, AppState, ChatRequest, StreamChunk};
pub use core::{GatewayConfig, GatewayError, Result};
pub use provider::{ChatProvider, ProviderKind};
pub use services::{ChatPipeline, FallbackEmitter, ModelRouter};
