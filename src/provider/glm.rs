//! Zhipu GLM adapter.

use super::{
    build_chat_messages, chat_completion_body, ChatProvider, ChunkStream, ProviderClient,
    ProviderKind, RequestParams, SamplingDefaults,
};
use crate::api::models::ChatMessage;
use crate::core::{ProviderSettings, Result};
use serde_json::{json, Value};

const SYSTEM_PREAMBLE: &str = "You are ChatGLM, an AI assistant developed by Zhipu AI. \
Answer accurately and helpfully, in the language the user writes in.";

const DEFAULTS: SamplingDefaults = SamplingDefaults {
    temperature: 0.7,
    top_p: 0.9,
    max_tokens: 2000,
};

pub struct GlmProvider {
    client: ProviderClient,
    model_id: String,
    supports_thinking: bool,
}

impl GlmProvider {
    pub fn new(
        settings: &ProviderSettings,
        model_id: &str,
        supports_thinking: bool,
        http_client: reqwest::Client,
    ) -> Result<Self> {
        Ok(Self {
            client: ProviderClient::new(ProviderKind::Glm, settings, http_client)?,
            model_id: model_id.to_string(),
            supports_thinking,
        })
    }

    /// Request body; reasoning is switched on with GLM's `thinking` object.
    pub fn request_body(&self, messages: &[ChatMessage], params: &RequestParams) -> Value {
        let mut body = chat_completion_body(
            &self.model_id,
            build_chat_messages(messages, SYSTEM_PREAMBLE),
            params,
            DEFAULTS,
        );
        if self.effective_thinking(params) {
            body.insert("thinking".to_string(), json!({"type": "enabled"}));
        }
        Value::Object(body)
    }
}

impl ChatProvider for GlmProvider {
    fn kind(&self) -> ProviderKind {
        self.client.kind()
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn supports_thinking(&self) -> bool {
        self.supports_thinking
    }

    fn stream_chat(&self, messages: Vec<ChatMessage>, params: RequestParams) -> ChunkStream {
        let body = self.request_body(&messages, &params);
        self.client
            .stream_completion(&self.model_id, &body, self.effective_thinking(&params))
    }
}
