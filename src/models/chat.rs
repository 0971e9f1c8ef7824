use chrono::Utc;
use serde::{ Deserialize, Serialize };
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A stored transcript. Field names on the wire are the ones the web client
/// reads from `/api/history`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "chat_id")]
    pub id: String,
    /// UNIX seconds with sub-second precision.
    #[serde(rename = "timestamp")]
    pub created_at: f64,
    pub title: String,
    #[serde(rename = "content")]
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            created_at: (Utc::now().timestamp_micros() as f64) / 1_000_000.0,
            title: title.to_string(),
            messages: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    pub chat_id: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conversation_uses_client_field_names() {
        let mut conversation = Conversation::new("abc", "Hello");
        conversation.messages.push(ChatMessage::user("Hello"));
        conversation.messages.push(ChatMessage::assistant("Hi"));

        let value = serde_json::to_value(&conversation).unwrap();
        assert_eq!(value["chat_id"], "abc");
        assert_eq!(value["title"], "Hello");
        assert!(value["timestamp"].is_f64());
        assert_eq!(
            value["content"],
            json!([
                { "role": "user", "content": "Hello" },
                { "role": "assistant", "content": "Hi" }
            ])
        );
    }

    #[test]
    fn chat_request_requires_both_fields() {
        let ok: Result<ChatRequest, _> = serde_json::from_str(r#"{"prompt":"hi","chat_id":"1"}"#);
        assert!(ok.is_ok());

        let missing: Result<ChatRequest, _> = serde_json::from_str(r#"{"prompt":"hi"}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn role_rejects_unknown_values() {
        let role: Result<Role, _> = serde_json::from_str("\"tool\"");
        assert!(role.is_err());
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }
}
