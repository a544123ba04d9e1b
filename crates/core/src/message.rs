//! Message and Conversation domain types.
//!
//! These are the core value objects that flow through the entire system:
//! User sends a message → front end hands it over → Agent processes it → Provider generates response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
///
/// Tool results are fed back as `System` messages, so there is no separate
/// tool role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions and tool results
    System,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// A conversation is an ordered sequence of messages with shared context.
///
/// Messages are only ever appended. The one exception is the leading system
/// prompt, which is replaced in place on every agent turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Put `content` in the leading system message, inserting one if the
    /// conversation does not start with a system message.
    pub fn set_system_prompt(&mut self, content: impl Into<String>) {
        let content = content.into();
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => first.content = content,
            _ => self.messages.insert(0, Message::system(content)),
        }
    }

    /// Drop the oldest non-system messages until at most `max` messages
    /// besides the leading system prompt remain.
    pub fn trim_to(&mut self, max: usize) {
        let offset = usize::from(
            self.messages
                .first()
                .is_some_and(|m| m.role == Role::System),
        );
        let excess = (self.messages.len() - offset).saturating_sub(max);
        if excess > 0 {
            self.messages.drain(offset..offset + excess);
        }
    }

    /// The most recent message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
    }

    #[test]
    fn conversation_tracks_updates() {
        let mut conv = Conversation::new();
        let created = conv.created_at;

        conv.push(Message::user("First message"));
        assert_eq!(conv.len(), 1);
        assert!(conv.updated_at >= created);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn system_prompt_inserted_when_missing() {
        let mut conv = Conversation::new();
        conv.push(Message::user("hello"));
        conv.set_system_prompt("rules v1");

        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages[0], Message::system("rules v1"));
        assert_eq!(conv.messages[1].role, Role::User);
    }

    #[test]
    fn system_prompt_overwritten_in_place() {
        let mut conv = Conversation::new();
        conv.set_system_prompt("rules v1");
        conv.push(Message::user("hello"));
        conv.set_system_prompt("rules v2");

        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages[0].content, "rules v2");
    }

    #[test]
    fn trim_keeps_system_prompt() {
        let mut conv = Conversation::new();
        conv.set_system_prompt("rules");
        for i in 0..5 {
            conv.push(Message::user(format!("m{i}")));
        }

        conv.trim_to(2);

        assert_eq!(conv.len(), 3);
        assert_eq!(conv.messages[0].role, Role::System);
        assert_eq!(conv.messages[1].content, "m3");
        assert_eq!(conv.messages[2].content, "m4");
    }

    #[test]
    fn trim_without_system_prompt() {
        let mut conv = Conversation::new();
        for i in 0..3 {
            conv.push(Message::user(format!("m{i}")));
        }
        conv.trim_to(5);
        assert_eq!(conv.len(), 3);

        conv.trim_to(1);
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.messages[0].content, "m2");
    }
}
