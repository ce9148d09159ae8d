//! HTTP layer for the chat gateway.
//!
//! Handlers, request/response models, NDJSON streaming and client
//! disconnect detection.

pub mod disconnect;
pub mod handlers;
pub mod models;
pub mod streaming;

// Re-export commonly used types
pub use handlers::{build_router, chat_stream, health, list_models, metrics_handler, AppState};
pub use models::{
    ChatMessage, ChatRequest, ContentType, HealthResponse, IncomingMessage, Message,
    ModelsResponse, Sender, StreamChunk,
};
pub use streaming::{encode_chunk, ndjson_response};
