//! Error types for the paint engine
//!
//! Nothing here is allowed to escape a pointer handler or the frame tick.
//! The sprite logs these at its boundary and degrades to "edit did not apply".

use thiserror::Error;

/// Failures while capturing, encoding or restoring a history snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The surface was disposed before it could be captured
    #[error("surface has no pixel storage")]
    DisposedSurface,

    /// The stored resource could not be turned back into pixels
    #[error("failed to decode snapshot: {0}")]
    Decode(String),

    /// PNG encode/decode failure
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    /// Data URL payload was not valid base64
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Raw header read/write failure
    #[error("raw snapshot i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The background encode/decode task panicked or was cancelled
    #[error("snapshot task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A position snapshot was restored onto a bitmap target or vice versa
    #[error("snapshot kind does not match restore target")]
    KindMismatch,
}

/// Failures while loading engine configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
