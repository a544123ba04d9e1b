//! Errors, one enum per area (provider, chat front end, store, tools) and a
//! top-level [`Error`] that wraps them.

use thiserror::Error;

/// The top-level error type for all Filvyn operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Channel errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Agent loop ---
    #[error("Agent did not complete within {max_turns} turns")]
    TurnLimitExceeded { max_turns: u32 },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Message delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),
}

/// Failures of the content-addressed note store and its collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network or backend failure; the operation may succeed if re-invoked.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote answered with a status or body shape we don't understand.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("CID for piece {hash} not assigned after {attempts} lookups")]
    CidUnresolved { hash: String, attempts: u32 },

    #[error("Index storage error: {0}")]
    Index(String),

    #[error("Vector index error: {0}")]
    Vector(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Corrupt note payload for {cid}: {reason}")]
    CorruptNote { cid: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool {tool_name} failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
