use thiserror::Error;

/// Top-level error type for Sakhi.
///
/// Covers the cross-cutting failures (configuration, I/O, serialization).
/// The chat crate defines its own `ChatError` and converts from this type so
/// that `?` works across the crate boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SakhiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for SakhiError {
    fn from(err: toml::de::Error) -> Self {
        SakhiError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SakhiError {
    fn from(err: toml::ser::Error) -> Self {
        SakhiError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SakhiError {
    fn from(err: serde_json::Error) -> Self {
        SakhiError::Serialization(err.to_string())
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, SakhiError>;
