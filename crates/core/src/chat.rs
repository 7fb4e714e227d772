//! Chat message types exchanged with the browser and the completion provider.
//!
//! The browser sends loosely-typed JSON. Everything it sends is accepted and
//! then narrowed: messages without string content or flagged as ephemeral are
//! dropped, and any role other than `assistant` is treated as `user`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    /// Map a client-supplied role onto `user` or `assistant`.
    pub fn from_client(raw: Option<&str>) -> Self {
        match raw {
            Some("assistant") => Self::Assistant,
            _ => Self::User,
        }
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A message exactly as the browser sent it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub role: Value,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub ephemeral: Value,
}

impl IncomingMessage {
    /// Build a message from a role and text, as a well-behaved client would.
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: Value::from(role),
            content: Value::from(content),
            ephemeral: Value::Null,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        is_truthy(&self.ephemeral)
    }

    /// Narrow to a [`ChatMessage`], or `None` if it must not be forwarded.
    pub fn to_chat_message(&self) -> Option<ChatMessage> {
        if self.is_ephemeral() {
            return None;
        }
        let Value::String(content) = &self.content else {
            return None;
        };
        Some(ChatMessage {
            role: ChatRole::from_client(self.role.as_str()),
            content: content.clone(),
        })
    }
}

/// Drop unusable or ephemeral messages and normalise roles, preserving order.
pub fn sanitize_history(messages: &[IncomingMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .filter_map(IncomingMessage::to_chat_message)
        .collect()
}

/// Assemble the provider prompt: an optional system message, then the history.
pub fn build_prompt(system_prompt: Option<&str>, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut prompt = Vec::with_capacity(history.len() + 1);
    if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
        prompt.push(ChatMessage::system(system));
    }
    prompt.extend(history.iter().cloned());
    prompt
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default, deserialize_with = "lenient_messages")]
    pub messages: Vec<IncomingMessage>,
    #[serde(default)]
    pub system_prompt: Value,
    #[serde(default)]
    pub model: Value,
    #[serde(default)]
    pub temperature: Value,
}

impl ChatRequest {
    /// Caller-supplied system prompt, if it is a non-blank string.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt
            .as_str()
            .filter(|s| !s.trim().is_empty())
    }

    /// Caller-supplied model override, trimmed, if non-blank.
    pub fn model(&self) -> Option<&str> {
        self.model
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Caller-supplied sampling temperature, if numeric.
    pub fn temperature(&self) -> Option<f64> {
        self.temperature.as_f64()
    }
}

/// Accept any JSON for `messages`; non-arrays become empty, non-objects are skipped.
fn lenient_messages<'de, D>(deserializer: D) -> Result<Vec<IncomingMessage>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            // Derived struct deserializers also accept sequences; only objects are messages.
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Extra information attached to a disguised rate-limited reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyMeta {
    pub simulated_sleep_ms: u64,
}

/// Response body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ReplyMeta>,
}

impl ChatReply {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: ReplyMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: Value) -> ChatRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn ephemeral_messages_are_dropped() {
        let req = request(json!({
            "messages": [
                {"role": "assistant", "content": "welcome!", "ephemeral": true},
                {"role": "user", "content": "test"}
            ]
        }));
        assert_eq!(sanitize_history(&req.messages), vec![ChatMessage::user("test")]);
    }

    #[test]
    fn ephemeral_flag_uses_truthiness() {
        let req = request(json!({
            "messages": [
                {"role": "user", "content": "a", "ephemeral": false},
                {"role": "user", "content": "b", "ephemeral": 0},
                {"role": "user", "content": "c", "ephemeral": ""},
                {"role": "user", "content": "d", "ephemeral": 1},
                {"role": "user", "content": "e", "ephemeral": "yes"}
            ]
        }));
        let kept: Vec<_> = sanitize_history(&req.messages)
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(kept, ["a", "b", "c"]);
    }

    #[test]
    fn messages_without_string_content_are_dropped() {
        let req = request(json!({
            "messages": [
                {"role": "user"},
                {"role": "user", "content": 42},
                {"role": "user", "content": null},
                null,
                "bare string",
                {"role": "user", "content": ""}
            ]
        }));
        assert_eq!(sanitize_history(&req.messages), vec![ChatMessage::user("")]);
    }

    #[test]
    fn roles_are_normalised_and_order_preserved() {
        let req = request(json!({
            "messages": [
                {"role": "system", "content": "1"},
                {"role": "assistant", "content": "2"},
                {"content": "3"},
                {"role": "tool", "content": "4"}
            ]
        }));
        assert_eq!(
            sanitize_history(&req.messages),
            vec![
                ChatMessage::user("1"),
                ChatMessage::assistant("2"),
                ChatMessage::user("3"),
                ChatMessage::user("4"),
            ]
        );
    }

    #[test]
    fn non_object_message_items_are_skipped() {
        let req = request(json!({
            "messages": [
                ["user", "hi"],
                ["assistant", "hello", true],
                42,
                "plain text",
                null,
                {"role": "user", "content": "kept"}
            ]
        }));
        assert_eq!(req.messages.len(), 1);
        assert_eq!(sanitize_history(&req.messages), vec![ChatMessage::user("kept")]);
    }

    #[test]
    fn non_array_messages_become_empty() {
        let req = request(json!({"messages": "nope"}));
        assert!(req.messages.is_empty());
        let req = request(json!({}));
        assert!(req.messages.is_empty());
    }

    #[test]
    fn optional_fields_are_narrowed() {
        let req = request(json!({
            "systemPrompt": "  ",
            "model": "  gpt-test  ",
            "temperature": 0.2
        }));
        assert_eq!(req.system_prompt(), None);
        assert_eq!(req.model(), Some("gpt-test"));
        assert_eq!(req.temperature(), Some(0.2));

        let req = request(json!({"systemPrompt": 5, "model": "", "temperature": "hot"}));
        assert_eq!(req.system_prompt(), None);
        assert_eq!(req.model(), None);
        assert_eq!(req.temperature(), None);
    }

    #[test]
    fn prompt_leads_with_non_blank_system_message() {
        let history = vec![ChatMessage::user("hi")];
        assert_eq!(
            build_prompt(Some("be brief"), &history),
            vec![ChatMessage::system("be brief"), ChatMessage::user("hi")]
        );
        assert_eq!(build_prompt(Some(" "), &history), history);
        assert_eq!(build_prompt(None, &history), history);
    }

    #[test]
    fn reply_serialization_omits_missing_meta() {
        let reply = ChatReply::assistant("ok");
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"role": "assistant", "content": "ok"})
        );

        let reply = reply.with_meta(ReplyMeta {
            simulated_sleep_ms: 1500,
        });
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"role": "assistant", "content": "ok", "meta": {"simulatedSleepMs": 1500}})
        );
    }
}
