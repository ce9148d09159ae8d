//! Provider adapters.
//!
//! Each supported LLM vendor implements [`ChatProvider`]: it owns the
//! credentials and endpoint for one model, builds the vendor request body,
//! opens exactly one streaming HTTP call and translates the vendor's event
//! stream into [`StreamChunk`]s.
//!
//! ```text
//! ChatMessage[] + RequestParams
//!     ↓
//! [ChatProvider::stream_chat]  ← request body, one POST
//!     ↓
//! data: {...} lines
//!     ↓
//! [stream::DeltaDecoder]       ← per-line JSON delta → chunks
//!     ↓
//! StreamChunk stream
//! ```
//!
//! Providers are selected through [`ProviderKind`], resolved once per request
//! by the model router.

pub mod glm;
pub mod kimi;
pub mod stream;

use crate::api::models::{ChatMessage, Sender, StreamChunk};
use crate::core::{GatewayConfig, GatewayError, ProviderSettings, Result};
use futures::stream::Stream;
use serde_json::{json, Map, Value};
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

pub use glm::GlmProvider;
pub use kimi::KimiProvider;
pub use stream::{DeltaDecoder, LineBuffer};

use stream::{open_event_stream, EventStreamRequest};

const CHAT_PATH: &str = "chat/completions";

/// Lazy, single-pass chunk sequence returned by a provider.
///
/// An `Err` item can only appear first, when the call could not be opened
/// (connection failure, non-success status). Failures after that point are
/// delivered in-band as an error chunk.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

// ============================================================================
// Provider Kind
// ============================================================================

/// Every provider the gateway can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Glm,
    Kimi,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Glm, ProviderKind::Kimi];

    /// Tag used in the model catalog `type` field and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Glm => "glm",
            ProviderKind::Kimi => "kimi",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "glm" | "zhipu" | "chatglm" => Some(ProviderKind::Glm),
            "kimi" | "moonshot" => Some(ProviderKind::Kimi),
            _ => None,
        }
    }

    pub fn settings<'a>(&self, config: &'a GatewayConfig) -> &'a ProviderSettings {
        match self {
            ProviderKind::Glm => &config.providers.glm,
            ProviderKind::Kimi => &config.providers.kimi,
        }
    }

    /// Construct the adapter for `model_id`.
    ///
    /// Fails with [`GatewayError::Configuration`](crate::core::GatewayError::Configuration)
    /// when the provider has no credential.
    pub fn build(
        &self,
        config: &GatewayConfig,
        model_id: &str,
        http_client: reqwest::Client,
    ) -> Result<Box<dyn ChatProvider>> {
        let settings = self.settings(config);
        let supports_thinking = config.catalog.supports_thinking(model_id);
        match self {
            ProviderKind::Glm => Ok(Box::new(GlmProvider::new(
                settings,
                model_id,
                supports_thinking,
                http_client,
            )?)),
            ProviderKind::Kimi => Ok(Box::new(KimiProvider::new(
                settings,
                model_id,
                supports_thinking,
                http_client,
            )?)),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Sampling parameters forwarded to a provider. `None` means "provider default".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub stop: Option<Vec<String>>,
    pub thinking_mode: bool,
}

/// Per-provider fallbacks for unset [`RequestParams`] fields.
#[derive(Debug, Clone, Copy)]
pub struct SamplingDefaults {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

/// Capability set every provider adapter implements.
pub trait ChatProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Model id sent to the provider API.
    fn model_id(&self) -> &str;

    /// Whether this model can produce a separate reasoning channel.
    fn supports_thinking(&self) -> bool;

    /// Reasoning is used only when the model supports it *and* the request asks for it.
    fn effective_thinking(&self, params: &RequestParams) -> bool {
        self.supports_thinking() && params.thinking_mode
    }

    /// Open the provider stream. Nothing is sent until the stream is first polled.
    fn stream_chat(&self, messages: Vec<ChatMessage>, params: RequestParams) -> ChunkStream;
}

// ============================================================================
// Shared request building
// ============================================================================

/// HTTP client shared by all adapters. Timeouts are set per request.
pub fn build_http_client(config: &GatewayConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(!config.verify_ssl)
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()?;
    Ok(client)
}

/// Credentials and transport for one OpenAI-compatible provider endpoint.
///
/// Adapters own one of these and only decide the request body.
#[derive(Clone)]
pub struct ProviderClient {
    kind: ProviderKind,
    settings: ProviderSettings,
    api_key: String,
    http_client: reqwest::Client,
}

impl ProviderClient {
    /// Fails with [`GatewayError::Configuration`] when the key is missing or blank.
    pub fn new(
        kind: ProviderKind,
        settings: &ProviderSettings,
        http_client: reqwest::Client,
    ) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                GatewayError::Configuration(format!("{} is not set", settings.api_key_env))
            })?;

        Ok(Self {
            kind,
            settings: settings.clone(),
            api_key,
            http_client,
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// POST `body` to the chat completions endpoint and stream decoded chunks.
    pub fn stream_completion(
        &self,
        model_id: &str,
        body: &Value,
        effective_thinking: bool,
    ) -> ChunkStream {
        let timeout_secs = self.settings.timeout_for(effective_thinking);

        tracing::debug!(
            provider = %self.kind,
            model = %model_id,
            thinking = effective_thinking,
            timeout_secs = timeout_secs,
            "Opening provider stream"
        );

        let request = self
            .http_client
            .post(self.settings.endpoint(CHAT_PATH))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(body);

        open_event_stream(EventStreamRequest {
            provider: self.kind,
            request,
            timeout_secs,
            effective_thinking,
        })
    }
}

/// Map canonical messages to OpenAI-style role/content pairs.
///
/// `preamble` is prepended as a system message, or appended to the first
/// system message when the conversation already has one. Other messages map
/// `user` to `user` and everything else to `assistant`.
pub fn build_chat_messages(messages: &[ChatMessage], preamble: &str) -> Vec<Value> {
    let system_index = messages.iter().position(|m| m.sender == Sender::System);

    let system_content = match system_index {
        Some(index) => format!("{}\n\n{}", messages[index].content, preamble),
        None => preamble.to_string(),
    };

    let mut api_messages = Vec::with_capacity(messages.len() + 1);
    api_messages.push(json!({"role": "system", "content": system_content}));

    for (index, message) in messages.iter().enumerate() {
        if Some(index) == system_index {
            continue;
        }
        let role = match message.sender {
            Sender::User => "user",
            Sender::Assistant | Sender::System => "assistant",
        };
        api_messages.push(json!({"role": role, "content": message.content}));
    }

    api_messages
}

/// Common OpenAI-compatible streaming body; providers add their own reasoning switch.
pub fn chat_completion_body(
    model_id: &str,
    messages: Vec<Value>,
    params: &RequestParams,
    defaults: SamplingDefaults,
) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("model".to_string(), json!(model_id));
    body.insert("messages".to_string(), Value::Array(messages));
    body.insert(
        "temperature".to_string(),
        json!(params.temperature.unwrap_or(defaults.temperature)),
    );
    body.insert(
        "top_p".to_string(),
        json!(params.top_p.unwrap_or(defaults.top_p)),
    );
    body.insert(
        "max_tokens".to_string(),
        json!(params.max_tokens.unwrap_or(defaults.max_tokens)),
    );
    body.insert(
        "frequency_penalty".to_string(),
        json!(params.frequency_penalty.unwrap_or(0.0)),
    );
    body.insert(
        "presence_penalty".to_string(),
        json!(params.presence_penalty.unwrap_or(0.0)),
    );
    if let Some(stop) = params.stop.as_ref().filter(|s| !s.is_empty()) {
        body.insert("stop".to_string(), json!(stop));
    }
    body.insert("stream".to_string(), Value::Bool(true));
    body
}
