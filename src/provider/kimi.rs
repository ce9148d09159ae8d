//! Moonshot Kimi adapter.
//!
//! Reasoning models stream their chain of thought in `reasoning_content`
//! ahead of the answer; it is requested with `enable_reasoning`.

use super::{
    build_chat_messages, chat_completion_body, ChatProvider, ChunkStream, ProviderClient,
    ProviderKind, RequestParams, SamplingDefaults,
};
use crate::api::models::ChatMessage;
use crate::core::{ProviderSettings, Result};
use serde_json::Value;

const SYSTEM_PREAMBLE: &str = "You are Kimi, an AI assistant provided by Moonshot AI. \
You give safe, helpful and accurate answers, and refuse to answer questions involving \
terrorism, racism, pornography or violence. Moonshot AI is a proper noun and must not be \
translated.";

const REASONING_PREAMBLE: &str = "You are Kimi, an AI assistant provided by Moonshot AI. \
Think the problem through step by step before giving a safe, helpful and accurate answer. \
Moonshot AI is a proper noun and must not be translated.";

const DEFAULTS: SamplingDefaults = SamplingDefaults {
    temperature: 0.6,
    top_p: 0.9,
    max_tokens: 2000,
};

pub struct KimiProvider {
    client: ProviderClient,
    model_id: String,
    supports_thinking: bool,
}

impl KimiProvider {
    pub fn new(
        settings: &ProviderSettings,
        model_id: &str,
        supports_thinking: bool,
        http_client: reqwest::Client,
    ) -> Result<Self> {
        Ok(Self {
            client: ProviderClient::new(ProviderKind::Kimi, settings, http_client)?,
            model_id: model_id.to_string(),
            supports_thinking,
        })
    }

    pub fn request_body(&self, messages: &[ChatMessage], params: &RequestParams) -> Value {
        let effective_thinking = self.effective_thinking(params);
        let preamble = if effective_thinking {
            REASONING_PREAMBLE
        } else {
            SYSTEM_PREAMBLE
        };

        let mut body = chat_completion_body(
            &self.model_id,
            build_chat_messages(messages, preamble),
            params,
            DEFAULTS,
        );
        if effective_thinking {
            body.insert("enable_reasoning".to_string(), Value::Bool(true));
        }
        Value::Object(body)
    }
}

impl ChatProvider for KimiProvider {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::Sender;

    fn provider(model_id: &str, supports_thinking: bool) -> KimiProvider {
        let settings =
            ProviderSettings::new("MOONSHOT_API_KEY", "http://localhost").with_api_key("sk-kimi");
        KimiProvider::new(&settings, model_id, supports_thinking, reqwest::Client::new()).unwrap()
    }

    #[test]
    fn test_blank_key_is_rejected() {
        let settings =
            ProviderSettings::new("MOONSHOT_API_KEY", "http://localhost").with_api_key("  ");
        assert!(KimiProvider::new(&settings, "kimi-k2-thinking", true, reqwest::Client::new())
            .is_err());
    }

    #[test]
    fn test_reasoning_request() {
        let body = provider("kimi-k2-thinking", true).request_body(
            &[ChatMessage::new(Sender::User, "Why?")],
            &RequestParams {
                thinking_mode: true,
                ..Default::default()
            },
        );

        assert_eq!(body["enable_reasoning"], true);
        assert_eq!(body["messages"][0]["content"], REASONING_PREAMBLE);
        assert_eq!(body["temperature"].as_f64().unwrap() as f32, 0.6);
    }

    #[test]
    fn test_thinking_flag_ignored_for_plain_model() {
        let body = provider("kimi-k2-turbo-preview", false).request_body(
            &[],
            &RequestParams {
                thinking_mode: true,
                ..Default::default()
            },
        );

        assert!(body.get("enable_reasoning").is_none());
        assert_eq!(body["messages"][0]["content"], SYSTEM_PREAMBLE);
    }

    #[test]
    fn test_system_message_keeps_user_text_first() {
        let body = provider("kimi-k2-turbo-preview", false).request_body(
            &[
                ChatMessage::new(Sender::System, "Answer in French."),
                ChatMessage::new(Sender::Assistant, "Bonjour"),
            ],
            &RequestParams::default(),
        );

        let system = body["messages"][0]["content"].as_str().unwrap();
        assert!(system.starts_with("Answer in French."));
        assert!(system.ends_with(SYSTEM_PREAMBLE));
        assert_eq!(body["messages"][1]["role"], "assistant");
    }
}
