//! Error types for the voice display

use thiserror::Error;

/// Result type alias for voice display operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice display
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio source could not be opened or read
    #[error("audio error: {0}")]
    Audio(String),

    /// Malformed audio frame
    #[error("audio frame error: {0}")]
    AudioFrame(String),

    /// Speech recognizer unavailable (missing model or capability)
    #[error("recognizer unavailable: {0}")]
    Recognizer(String),

    /// Display hardware probe or write failure
    #[error("display error: {0}")]
    Display(String),

    /// External service manager failure
    #[error("service error: {0}")]
    Service(String),

    /// Command execution failure
    #[error("command error: {0}")]
    Command(String),

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
