//! # Filvyn Core
//!
//! The note assistant's vocabulary: messages and conversations, notes and
//! their CIDs, the tool contract, and the traits every backend implements.
//!
//! Model backends, the chat front end and tools are traits here; the other
//! crates in the workspace provide implementations and depend only inward.

pub mod channel;
pub mod error;
pub mod event;
pub mod message;
pub mod note;
pub mod provider;
pub mod tool;

pub use channel::{InboundMessage, Replier};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, Role};
pub use note::{Cid, Note, NoteMeta, NoteMetaWithCid, ScoredNote, UserId};
pub use provider::{EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage};
pub use tool::{
    ParamValue, Tool, ToolCall, ToolDefinition, ToolOutput, ToolParams, ToolRegistry,
    COMPLETE_TOOL_NAME,
};
