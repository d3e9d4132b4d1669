//! Error types for the Switchboard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator seam (model, channel, tool, transcription) has its own
//! error enum. `Error` covers what can abort message processing: channel
//! failures stay with the runner and tool failures become model turns.

use thiserror::Error;

/// The top-level error type for all Switchboard operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Transcription errors ---
    #[error("Transcription error: {0}")]
    Transcription(#[from] TranscriptionError),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// A failed or malformed call to a language model backend.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by model backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Model backend not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

/// Transport-level failures. Retrying and reporting these is the channel's job.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Channel not connected: {0}")]
    NotConnected(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Tool lookup and invocation failures.
///
/// `Validation` and `NotFound` are recoverable: the orchestrator feeds them
/// back to the model as a synthetic turn instead of aborting.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("Unknown tool: {name}. Available tools: {}", .available.join(", "))]
    NotFound { name: String, available: Vec<String> },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },
}

/// Speech-to-text failures.
#[derive(Debug, Clone, Error)]
pub enum TranscriptionError {
    #[error("Transcription backend unavailable: {0}")]
    Unavailable(String),

    #[error("Transcription failed: {0}")]
    Failed(String),
}
