//! Message normalization.
//!
//! Collapses every inbound message shape into [`ChatMessage`] at the system
//! boundary. Nothing downstream branches on representation.

use crate::api::models::{ChatMessage, IncomingMessage, Sender};
use serde_json::Value;

/// Normalize inbound messages, preserving order.
///
/// Entries whose content is empty after trimming are dropped. A missing or
/// unrecognised sender becomes [`Sender::User`]. Never fails.
pub fn normalize_messages(messages: &[IncomingMessage]) -> Vec<ChatMessage> {
    messages.iter().filter_map(normalize_one).collect()
}

fn normalize_one(message: &IncomingMessage) -> Option<ChatMessage> {
    let (sender, content) = match message {
        IncomingMessage::Structured(msg) => (msg.sender, msg.content.clone()),
        IncomingMessage::Record(value) => (record_sender(value), record_content(value)?),
    };

    if content.trim().is_empty() {
        return None;
    }

    Some(ChatMessage { sender, content })
}

fn record_sender(value: &Value) -> Sender {
    let raw = value
        .get("sender")
        .or_else(|| value.get("role"))
        .and_then(Value::as_str);

    match raw.and_then(Sender::parse) {
        Some(sender) => sender,
        None => {
            tracing::warn!(sender = ?raw, "Message sender missing or invalid, defaulting to user");
            Sender::User
        }
    }
}

fn record_content(value: &Value) -> Option<String> {
    value
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::Message;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: Value) -> IncomingMessage {
        IncomingMessage::Record(value)
    }

    #[test]
    fn test_structured_messages_keep_order() {
        let messages = vec![
            Message::new(Sender::User, "first").into(),
            Message::new(Sender::Assistant, "second").into(),
            Message::new(Sender::User, "third").into(),
        ];

        let normalized = normalize_messages(&messages);

        assert_eq!(
            normalized,
            vec![
                ChatMessage::new(Sender::User, "first"),
                ChatMessage::new(Sender::Assistant, "second"),
                ChatMessage::new(Sender::User, "third"),
            ]
        );
    }

    #[test]
    fn test_blank_content_is_dropped() {
        let messages = vec![
            Message::new(Sender::User, "   ").into(),
            record(json!({"sender": "user", "content": "\n\t"})),
            Message::new(Sender::User, "kept").into(),
        ];

        let normalized = normalize_messages(&messages);
        assert_eq!(normalized, vec![ChatMessage::new(Sender::User, "kept")]);
    }

    #[test]
    fn test_record_with_invalid_sender_defaults_to_user() {
        let normalized = normalize_messages(&[record(json!({"sender": "robot", "content": "hi"}))]);
        assert_eq!(normalized, vec![ChatMessage::new(Sender::User, "hi")]);
    }

    #[test]
    fn test_record_without_sender_defaults_to_user() {
        let normalized = normalize_messages(&[record(json!({"content": "hi"}))]);
        assert_eq!(normalized[0].sender, Sender::User);
    }

    #[test]
    fn test_record_role_field_is_accepted() {
        let normalized = normalize_messages(&[
            record(json!({"role": "system", "content": "be brief"})),
            record(json!({"role": "assistant", "content": "ok"})),
        ]);
        assert_eq!(normalized[0].sender, Sender::System);
        assert_eq!(normalized[1].sender, Sender::Assistant);
    }

    #[test]
    fn test_record_without_text_content_is_dropped() {
        let normalized = normalize_messages(&[
            record(json!({"sender": "user", "content": 42})),
            record(json!("just a string")),
            record(json!(null)),
        ]);
        assert!(normalized.is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(normalize_messages(&[]).is_empty());
    }

    #[test]
    fn test_content_is_not_trimmed() {
        let normalized = normalize_messages(&[Message::new(Sender::User, "  spaced  ").into()]);
        assert_eq!(normalized[0].content, "  spaced  ");
    }
}
