//! Error types for the TrinityChain light client

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// A caller-supplied field failed to parse; nothing was staged or sent.
    MalformedInput(String),
    NotFound(String),
    NetworkError { reason: String, retryable: bool },
    KeyGenerationDisabled,
    CryptoError(String),
    ConfigError(String),
    IoError(String),
}

impl ClientError {
    pub fn network(reason: impl Into<String>) -> Self {
        ClientError::NetworkError {
            reason: reason.into(),
            retryable: false,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClientError::MalformedInput(msg) => write!(f, "Malformed input: {}", msg),
            ClientError::NotFound(msg) => write!(f, "{}", msg),
            ClientError::NetworkError {
                reason,
                retryable: true,
            } => write!(f, "Network error (retryable): {}", reason),
            ClientError::NetworkError { reason, .. } => write!(f, "Network error: {}", reason),
            ClientError::KeyGenerationDisabled => {
                write!(f, "Server-side key generation is disabled")
            }
            ClientError::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),
            ClientError::ConfigError(msg) => write!(f, "Config error: {}", msg),
            ClientError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::IoError(err.to_string())
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        ClientError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ClientError>;
