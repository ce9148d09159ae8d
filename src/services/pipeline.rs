//! Streaming chat pipeline.
//!
//! normalize → route → build adapter → relay chunks, with the fallback
//! emitter taking over when the provider call cannot be opened.
//!
//! Every stream produced here ends with exactly one terminal indicator: the
//! finished content chunk, or an error chunk when the provider failed after
//! streaming had begun.

use crate::api::models::{ChatRequest, ContentType, StreamChunk};
use crate::core::error_types::{
    OUTCOME_CANCELLED, OUTCOME_COMPLETED, OUTCOME_ERROR_CHUNK, OUTCOME_FALLBACK,
};
use crate::core::{get_metrics, get_request_id, GatewayConfig, StreamCancelHandle};
use crate::provider::RequestParams;
use crate::services::fallback::FallbackEmitter;
use crate::services::normalizer::normalize_messages;
use crate::services::router::{ModelRouter, Route};
use async_stream::stream;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Chunk stream handed to the transport layer. Never fails.
pub type RelayStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// A started chat request.
pub struct ChatStream {
    pub route: Route,
    /// Whether reasoning output is enabled for this request
    pub thinking_active: bool,
    pub chunks: RelayStream,
}

/// Immutable per-configuration pipeline. A reload builds a new one.
pub struct ChatPipeline {
    config: Arc<GatewayConfig>,
    router: ModelRouter,
    http_client: reqwest::Client,
    fallback: FallbackEmitter,
}

impl ChatPipeline {
    pub fn new(config: Arc<GatewayConfig>, http_client: reqwest::Client) -> Self {
        let router = ModelRouter::new(&config);
        let fallback = FallbackEmitter::from_millis(config.fallback_token_delay_ms);
        Self {
            config,
            router,
            http_client,
            fallback,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    /// Request values first, then the catalog default temperature. Anything
    /// still unset is filled by the adapter.
    pub fn request_params(&self, request: &ChatRequest, model_id: &str) -> RequestParams {
        let catalog_temperature = self
            .config
            .catalog
            .find(model_id)
            .and_then(|m| m.temperature)
            .map(|t| t.default);

        RequestParams {
            temperature: request.temperature.or(catalog_temperature),
            top_p: request.top_p,
            max_tokens: request.max_tokens,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
            stop: request.stop.clone(),
            thinking_mode: request.thinking_mode,
        }
    }

    /// Start a chat request. The provider is contacted when `chunks` is first polled.
    pub fn start(&self, request: ChatRequest, cancel: StreamCancelHandle) -> ChatStream {
        let messages = normalize_messages(&request.messages);

        let requested = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.config.default_model);
        let route = self.router.resolve(requested);

        let params = self.request_params(&request, &route.model_id);
        let thinking_active =
            self.config.catalog.supports_thinking(&route.model_id) && params.thinking_mode;

        tracing::info!(
            request_id = %get_request_id(),
            provider = %route.provider,
            model = %route.model_id,
            messages = messages.len(),
            thinking_requested = request.thinking_mode,
            thinking_active = thinking_active,
            "Chat stream started"
        );

        let provider = route
            .provider
            .build(&self.config, &route.model_id, self.http_client.clone());
        let fallback = self.fallback;
        let provider_label = route.provider.as_str();
        let mut record = StreamRecord::new(provider_label, route.model_id.clone());

        let chunks = stream! {
            let mut guard = ChunkGuard::new(thinking_active);
            let mut cancelled = false;

            let failure = match provider {
                Err(err) => Some(err),
                Ok(provider) => {
                    let mut upstream = provider.stream_chat(messages, params);
                    let mut failure = None;
                    loop {
                        let next = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            item = upstream.next() => Some(item),
                        };
                        let Some(item) = next else {
                            cancelled = true;
                            break;
                        };
                        match item {
                            Some(Ok(chunk)) => {
                                if let Some(chunk) = guard.admit(chunk) {
                                    record.chunk(&chunk);
                                    yield chunk;
                                }
                            }
                            Some(Err(err)) => {
                                failure = Some(err);
                                break;
                            }
                            None => break,
                        }
                    }
                    failure
                }
            };

            if let Some(err) = failure.filter(|_| !cancelled) {
                tracing::warn!(
                    request_id = %get_request_id(),
                    provider = %provider_label,
                    model = %record.model,
                    reason = err.reason(),
                    error = %err,
                    "Provider unavailable, streaming fallback reply"
                );
                get_metrics().fallback_count.with_label_values(&[err.reason()]).inc();
                guard.fallback_started();

                let mut simulated = Box::pin(fallback.emit(&err));
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        chunk = simulated.next() => Some(chunk),
                    };
                    match next {
                        None => {
                            cancelled = true;
                            break;
                        }
                        Some(None) => break,
                        Some(Some(chunk)) => {
                            if let Some(chunk) = guard.admit(chunk) {
                                record.chunk(&chunk);
                                yield chunk;
                            }
                        }
                    }
                }
            }

            if !cancelled {
                for chunk in guard.close() {
                    record.chunk(&chunk);
                    yield chunk;
                }
                cancel.mark_completed();
            }

            record.finish(guard.outcome(cancelled));
        };

        ChatStream {
            route,
            thinking_active,
            chunks: Box::pin(chunks),
        }
    }
}

/// Per-stream metrics and the final log line.
///
/// The outcome is recorded once: by the stream when it ends, or on drop as
/// cancelled when the client went away mid-stream.
struct StreamRecord {
    request_id: String,
    provider: &'static str,
    model: String,
    started: Instant,
    relayed: usize,
    finished: bool,
}

impl StreamRecord {
    fn new(provider: &'static str, model: String) -> Self {
        Self {
            request_id: get_request_id(),
            provider,
            model,
            started: Instant::now(),
            relayed: 0,
            finished: false,
        }
    }

    fn chunk(&mut self, chunk: &StreamChunk) {
        let metrics = get_metrics();
        if self.relayed == 0 {
            metrics
                .ttft
                .with_label_values(&[self.provider])
                .observe(self.started.elapsed().as_secs_f64());
        }
        self.relayed += 1;
        metrics
            .chunk_count
            .with_label_values(&[self.provider, chunk.content_type.as_str()])
            .inc();
    }

    fn finish(&mut self, outcome: &'static str) {
        if self.finished {
            return;
        }
        self.finished = true;

        get_metrics()
            .request_count
            .with_label_values(&[self.provider, self.model.as_str(), outcome])
            .inc();
        tracing::info!(
            request_id = %self.request_id,
            provider = %self.provider,
            model = %self.model,
            outcome = outcome,
            chunks = self.relayed,
            duration_ms = self.started.elapsed().as_millis() as u64,
            "Chat stream finished"
        );
    }
}

impl Drop for StreamRecord {
    fn drop(&mut self) {
        self.finish(OUTCOME_CANCELLED);
    }
}

/// Enforces channel ordering on whatever the adapter or fallback produces.
///
/// - thinking chunks only while reasoning is active
/// - one terminal content chunk, nothing on the content channel after it
/// - the thinking channel may only close after the content channel
/// - an error chunk ends everything
#[derive(Debug)]
struct ChunkGuard {
    thinking_active: bool,
    thinking_seen: bool,
    thinking_closed: bool,
    content_finished: bool,
    errored: bool,
    fell_back: bool,
}

impl ChunkGuard {
    fn new(thinking_active: bool) -> Self {
        Self {
            thinking_active,
            thinking_seen: false,
            thinking_closed: false,
            content_finished: false,
            errored: false,
            fell_back: false,
        }
    }

    fn admit(&mut self, chunk: StreamChunk) -> Option<StreamChunk> {
        if self.errored {
            return None;
        }

        match chunk.content_type {
            ContentType::Thinking => {
                if !self.thinking_active || self.thinking_closed {
                    return None;
                }
                if chunk.finished {
                    if !self.content_finished {
                        return None;
                    }
                    self.thinking_closed = true;
                } else {
                    if self.content_finished {
                        return None;
                    }
                    self.thinking_seen = true;
                }
                Some(chunk)
            }
            ContentType::Content => {
                if self.content_finished {
                    return None;
                }
                self.content_finished = chunk.finished;
                Some(chunk)
            }
            ContentType::Error => {
                if self.content_finished {
                    return None;
                }
                self.errored = true;
                Some(chunk)
            }
        }
    }

    fn fallback_started(&mut self) {
        self.fell_back = true;
    }

    /// Terminators still owed once the source is exhausted.
    fn close(&mut self) -> Vec<StreamChunk> {
        if self.errored {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        if !self.content_finished {
            self.content_finished = true;
            chunks.push(StreamChunk::content("", true));
        }
        if self.thinking_active && self.thinking_seen && !self.thinking_closed {
            self.thinking_closed = true;
            chunks.push(StreamChunk::thinking("", true));
        }
        chunks
    }

    fn outcome(&self, cancelled: bool) -> &'static str {
        if cancelled {
            OUTCOME_CANCELLED
        } else if self.fell_back {
            OUTCOME_FALLBACK
        } else if self.errored {
            OUTCOME_ERROR_CHUNK
        } else {
            OUTCOME_COMPLETED
        }
    }
}
