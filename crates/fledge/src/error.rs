//! Error types for the embedding bridge.
//!
//! Transport-level failures are returned as values (`send` returns
//! `bool`); protocol violations such as shutting down twice or
//! notifying a dead engine are programming errors and panic at the
//! point of misuse; startup failures abort application launch.

use fledge_engine::EngineError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Messenger(#[from] MessengerError),
}

/// Errors raised by the binary messenger.
#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    /// An inbound message targeted a channel with no registered
    /// handler. Recoverable; distinct from transport-level send
    /// failure.
    #[error("no handler registered for channel '{0}'")]
    MissingHandler(String),

    /// A reply token was used a second time, or after it was already
    /// consumed. The duplicate is never forwarded to the engine.
    #[error("response already sent for channel '{0}'")]
    ResponseAlreadySent(String),

    /// The messenger has been torn down.
    #[error("messenger has been torn down")]
    EngineShutDown,
}
