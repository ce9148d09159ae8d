//! API request and response models.
//!
//! Defines the inbound chat request, the incremental [`StreamChunk`] produced
//! by providers and the fallback emitter, and the introspection responses.

use crate::core::config::ModelConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    #[serde(alias = "ai")]
    Assistant,
    System,
}

impl Sender {
    /// Lenient parse used for untyped records; `None` for unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "user" => Some(Sender::User),
            "assistant" | "ai" => Some(Sender::Assistant),
            "system" => Some(Sender::System),
            _ => None,
        }
    }
}

/// A single chat message as sent by the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,

    pub content: String,

    pub sender: Sender,

    #[serde(default, alias = "time")]
    pub timestamp: String,
}

impl Message {
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            content: content.into(),
            sender,
            timestamp: String::new(),
        }
    }
}

/// An inbound message in whichever shape the client used.
///
/// Well-formed messages deserialize as [`Message`]; anything else (unknown
/// sender, `role` instead of `sender`, missing fields) is kept as a raw
/// record for the normalizer to salvage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IncomingMessage {
    Structured(Message),
    Record(serde_json::Value),
}

impl From<Message> for IncomingMessage {
    fn from(message: Message) -> Self {
        IncomingMessage::Structured(message)
    }
}

/// Canonical `{sender, content}` pair produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: Sender,
    pub content: String,
}

impl ChatMessage {
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
        }
    }
}

/// Streaming chat request.
///
/// Numeric fields are optional; absent values take provider defaults. Ranges
/// are not validated here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    #[serde(default)]
    pub thinking_mode: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages: messages.into_iter().map(IncomingMessage::from).collect(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_thinking(mut self, thinking_mode: bool) -> Self {
        self.thinking_mode = thinking_mode;
        self
    }
}

/// Channel a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Content,
    Thinking,
    Error,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Content => "content",
            ContentType::Thinking => "thinking",
            ContentType::Error => "error",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One increment of a chat response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub content: String,

    #[serde(rename = "type")]
    pub content_type: ContentType,

    pub finished: bool,
}

impl StreamChunk {
    pub fn content(content: impl Into<String>, finished: bool) -> Self {
        Self {
            content: content.into(),
            content_type: ContentType::Content,
            finished,
        }
    }

    pub fn thinking(content: impl Into<String>, finished: bool) -> Self {
        Self {
            content: content.into(),
            content_type: ContentType::Thinking,
            finished,
        }
    }

    /// Error chunks always terminate the stream.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: ContentType::Error,
            finished: true,
        }
    }

    pub fn is_terminal_content(&self) -> bool {
        self.content_type == ContentType::Content && self.finished
    }
}

/// Response for the model listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsResponse {
    pub models: Vec<ModelConfig>,
    pub default_model: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub default_model: String,
    /// Provider tag -> whether a usable credential is configured
    pub available_models: BTreeMap<String, bool>,
}
