//! Error types for the engine.

/// Errors that can occur over the life of an engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The creation descriptor was rejected. Fatal to startup.
    #[error("engine creation failed: {0}")]
    CreationFailed(String),

    /// The entrypoint could not be launched. Fatal to startup.
    #[error("engine launch failed: {0}")]
    LaunchFailed(String),

    /// The engine handle is no longer valid.
    #[error("engine has terminated")]
    Terminated,

    /// The worker command channel closed unexpectedly.
    #[error("engine channel closed")]
    ChannelClosed,

    /// The worker thread panicked.
    #[error("engine thread panicked")]
    ThreadPanic,

    /// The worker thread could not be spawned.
    #[error("failed to spawn engine thread: {0}")]
    SpawnFailed(#[from] std::io::Error),
}
