//! Error types for the avatar animation core.

/// Top-level error type for the talking-head crate.
#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    /// Configuration error (invalid values, missing credentials).
    #[error("config error: {0}")]
    Config(String),

    /// Speech synthesis failed or returned unusable data.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio decoding or playback error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Scene host error (unknown mesh or bone handle, bad manifest).
    #[error("scene error: {0}")]
    Scene(String),

    /// Viseme mapping table could not be loaded.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AvatarError>;
