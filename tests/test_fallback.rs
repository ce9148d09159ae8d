//! Fallback behavior when the provider cannot be reached.

use chat_gateway::{
    api::{ContentType, Message, Sender, StreamChunk},
    core::{
        init_metrics, GatewayConfig, GatewayError, ModelCatalog, ProviderSettings,
        StreamCancelHandle,
    },
    services::{ChatPipeline, FallbackEmitter},
    ChatRequest,
};
use futures::StreamExt;
use std::sync::Arc;

/// Providers configured with credentials but pointing at a closed port
fn unreachable_pipeline() -> ChatPipeline {
    init_metrics();
    let mut config = GatewayConfig::with_catalog(ModelCatalog::builtin());
    config.fallback_token_delay_ms = 0;
    config.providers.glm =
        ProviderSettings::new("GLM_API_KEY", "http://127.0.0.1:1").with_api_key("glm-test-key");
    config.providers.kimi = ProviderSettings::new("MOONSHOT_API_KEY", "http://127.0.0.1:1")
        .with_api_key("kimi-test-key");
    ChatPipeline::new(Arc::new(config), reqwest::Client::new())
}

async fn run(pipeline: &ChatPipeline, request: ChatRequest) -> Vec<StreamChunk> {
    pipeline
        .start(request, StreamCancelHandle::new())
        .chunks
        .collect()
        .await
}

fn hello(model: &str) -> ChatRequest {
    ChatRequest::new(vec![Message::new(Sender::User, "Hello")]).with_model(model)
}

#[tokio::test]
async fn test_connection_refused_streams_fallback() {
    let pipeline = unreachable_pipeline();
    let chunks = run(&pipeline, hello("glm-4")).await;

    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.content_type == ContentType::Content));
    assert_eq!(chunks.iter().filter(|c| c.finished).count(), 1);
    assert!(chunks.last().unwrap().finished);

    // The stream is exactly the token split of its own message
    let text: String = chunks.iter().map(|c| c.content.as_str()).collect();
    assert!(text.starts_with("Model call failed"));
    let tokens = FallbackEmitter::tokens(&text);
    let contents: Vec<String> = chunks.into_iter().map(|c| c.content).collect();
    assert_eq!(contents, tokens);
}

#[tokio::test]
async fn test_fallback_has_no_thinking_chunks_even_in_thinking_mode() {
    let pipeline = unreachable_pipeline();
    let started = pipeline.start(
        hello("kimi-k2-thinking").with_thinking(true),
        StreamCancelHandle::new(),
    );
    assert!(started.thinking_active);

    let chunks: Vec<StreamChunk> = started.chunks.collect().await;
    assert!(chunks.iter().all(|c| c.content_type == ContentType::Content));
    assert!(chunks.last().unwrap().is_terminal_content());
}

#[tokio::test]
async fn test_missing_credentials_fallback_is_deterministic() {
    init_metrics();
    let mut config = GatewayConfig::with_catalog(ModelCatalog::builtin());
    config.fallback_token_delay_ms = 0;
    let pipeline = ChatPipeline::new(Arc::new(config), reqwest::Client::new());

    let first = run(&pipeline, hello("kimi-k2-turbo-preview")).await;
    let second = run(&pipeline, hello("kimi-k2-turbo-preview")).await;

    assert_eq!(first, second);
    assert_eq!(
        first,
        FallbackEmitter::chunks(&GatewayError::Configuration(
            "MOONSHOT_API_KEY is not set".to_string()
        ))
    );
}
