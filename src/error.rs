//! Error types for Lumina live voice sessions

use thiserror::Error;

/// Result type alias for Lumina operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in a live voice session
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device missing, busy, or unopenable
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Microphone access denied by the OS
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// Audio stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Inbound payload that could not be decoded
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Transport failure (connect, send, or remote close)
    #[error("transport error: {0}")]
    Transport(String),

    /// Session used outside its lifecycle
    #[error("session error: {0}")]
    Session(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
