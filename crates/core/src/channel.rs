//! Replier trait: the abstraction over the chat front end.
//!
//! The assistant never owns a chat platform connection. Whoever receives a
//! user's message hands over an [`InboundMessage`] together with a
//! [`Replier`] that routes text back to that same user.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ChannelError;
use crate::note::UserId;

/// A message received from a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Stable per-user identifier; notes and history are scoped to it
    pub user_id: UserId,

    /// Human-readable sender name (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// The text content
    pub text: String,
}

impl InboundMessage {
    pub fn new(user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            user_id,
            username: None,
            text: text.into(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Sends text back to one user.
#[async_trait]
pub trait Replier: Send + Sync {
    /// Deliver a message to the user.
    async fn reply(&self, text: &str) -> std::result::Result<(), ChannelError>;

    /// Show a "typing…" indicator, where the front end supports one.
    async fn send_typing(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }
}
