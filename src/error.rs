//! Error types for chanrelay.

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),
}

/// Rule registry errors — surfaced synchronously by mutating `RuleStore`
/// operations; state is unchanged when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Rule '{label}' not found")]
    NotFound { label: String },

    #[error("Rule '{label}' already exists")]
    DuplicateLabel { label: String },

    #[error("Rule '{label}' needs at least one source and one destination")]
    EmptySourceOrDestination { label: String },

    #[error("Invalid argument for '{label}': {message}")]
    InvalidArgument { label: String, message: String },

    #[error("Invalid pattern for '{label}': {message}")]
    InvalidPattern { label: String, message: String },

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Durable-store read/write failures. A failed save rolls back the
/// in-memory mutation so the store and memory never diverge.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Snapshot store failed: {0}")]
    Store(String),
}

/// Per-call transport failure (send/forward/copy/edit). Always isolated:
/// logged by the dispatcher and never aborts sibling destinations or rules.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Send to {chat_id} failed: {reason}")]
    SendFailed { chat_id: i64, reason: String },

    #[error("Forward to {chat_id} failed: {reason}")]
    ForwardFailed { chat_id: i64, reason: String },

    #[error("Edit of message {message_id} in {chat_id} failed: {reason}")]
    EditFailed {
        chat_id: i64,
        message_id: i64,
        reason: String,
    },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// A single replacement rule failed during application. The pipeline logs
/// the failure and continues with the remaining rules.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Rule '{label}' output exceeded {limit} bytes")]
    OutputTooLarge { label: String, limit: usize },
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
