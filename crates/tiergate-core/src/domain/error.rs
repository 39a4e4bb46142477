//! Domain-level error taxonomy for tiergate.

/// Errors produced while parsing or loading plugin specs.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("plugin spec must not be empty")]
    EmptySpec,

    #[error("git plugins are not supported: {spec}")]
    GitUnsupported { spec: String },

    #[error("plugin path does not exist or is not a file: {path}")]
    MissingPath { path: String },

    #[error("plugin executable '{name}' not found on PATH")]
    NotOnPath { name: String },
}

/// tiergate domain errors.
#[derive(Debug, thiserror::Error)]
pub enum TiergateError {
    #[error("invalid tier value: {0} (expected 1, 2 or 3)")]
    InvalidTier(u8),

    #[error("dimension '{0}' has no runnable command")]
    NoCommand(String),

    #[error("checker '{dimension}' timed out after {timeout_secs}s")]
    CheckerTimeout { dimension: String, timeout_secs: u64 },

    #[error("budget state checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("budget state at {path} is unreadable: {reason}")]
    CorruptState { path: String, reason: String },

    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("metric sink error: {0}")]
    Sink(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tiergate domain operations.
pub type Result<T> = std::result::Result<T, TiergateError>;
