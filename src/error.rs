//! Error types for the funnel engine.

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Funnel error: {0}")]
    Funnel(#[from] FunnelError),

    #[error("Vacancy source error: {0}")]
    Vacancy(#[from] VacancyError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence-layer errors.
///
/// `Unavailable` is fatal for the triggering request: no mutation is applied
/// and the caller falls back to a generic retry acknowledgment.
/// `VersionConflict` is transient: re-read and retry the whole
/// read-decide-write cycle.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Durable store unavailable: {0}")]
    Unavailable(String),

    #[error("Version conflict for {sender_id}: expected {expected}")]
    VersionConflict { sender_id: String, expected: u64 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Funnel state machine errors.
#[derive(Debug, thiserror::Error)]
pub enum FunnelError {
    /// An event arrived for a stage/edge combination the graph does not
    /// define. The machine logs this and downgrades it to a re-prompt;
    /// the variant only surfaces from direct misuse of the transition table.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Retries exhausted after {attempts} version conflicts for {sender_id}")]
    RetriesExhausted { sender_id: String, attempts: u32 },
}

/// Vacancy source errors.
#[derive(Debug, thiserror::Error)]
pub enum VacancyError {
    #[error("Vacancy source fetch failed: {0}")]
    Fetch(String),
}

/// Outbound channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to deliver intent to {recipient}: {reason}")]
    DeliveryFailed { recipient: String, reason: String },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
